use thiserror::Error;

use crate::audio::driver::{BufferId, VoiceId};

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Decode(err) => err.user_message(),
            EngineError::Pool(err) => err.user_message(),
            EngineError::Driver(err) => format!("Audio driver problem: {}", err),
            EngineError::Config(err) => err.user_message(),
            EngineError::Io(err) => format!("File system error: {}", err),
        }
    }

    /// Check if the engine can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Decode(err) => err.is_recoverable(),
            EngineError::Pool(_) => false,
            EngineError::Driver(err) => err.is_recoverable(),
            EngineError::Config(_) => true, // Defaults are always available
            EngineError::Io(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EngineError::Decode(DecodeError::UnsupportedExtension { .. }) => ErrorSeverity::Warning,
            EngineError::Decode(_) => ErrorSeverity::Error,
            EngineError::Pool(_) => ErrorSeverity::Critical,
            EngineError::Driver(DriverError::VoiceLimit { .. }) => ErrorSeverity::Info,
            EngineError::Driver(_) => ErrorSeverity::Error,
            EngineError::Config(_) => ErrorSeverity::Warning,
            EngineError::Io(_) => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Audio decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported audio file extension: {extension}")]
    UnsupportedExtension { extension: String },

    #[error("Invalid {codec} data: {reason}")]
    Format { codec: &'static str, reason: String },

    #[error("Unsupported layout: {channels} channel(s) at {bit_depth} bits")]
    UnsupportedLayout { channels: u16, bit_depth: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),
}

impl DecodeError {
    pub fn format(codec: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::Format {
            codec,
            reason: reason.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            DecodeError::UnsupportedExtension { extension } => {
                format!("Files with extension '{}' cannot be played", extension)
            }
            DecodeError::Format { codec, reason } => {
                format!("The {} file is malformed or not supported: {}", codec, reason)
            }
            DecodeError::UnsupportedLayout { channels, bit_depth } => format!(
                "Audio with {} channel(s) at {} bits per sample is not supported",
                channels, bit_depth
            ),
            DecodeError::Io(err) => format!("Cannot read audio data: {}", err),
            DecodeError::DecodeFailed(msg) => format!("Failed to decode audio data: {}", msg),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            DecodeError::UnsupportedExtension { .. } => false, // Requires different file
            DecodeError::Format { .. } => false,
            DecodeError::UnsupportedLayout { .. } => false,
            DecodeError::Io(_) => true, // The stream may be readable again after a rewind
            DecodeError::DecodeFailed(_) => false,
        }
    }
}

/// Voice pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Only {created} voices could be created, at least {required} are needed")]
    InsufficientVoices { created: usize, required: usize },

    #[error("Voice pool has been shut down")]
    ShutDown,
}

impl PoolError {
    pub fn user_message(&self) -> String {
        match self {
            PoolError::InsufficientVoices { created, required } => format!(
                "The audio device provides {} playback voices but {} are required",
                created, required
            ),
            PoolError::ShutDown => "The audio system is no longer running".to_string(),
        }
    }
}

/// Errors reported by a voice driver
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriverError {
    #[error("No more voices can be allocated")]
    OutOfVoices,

    #[error("Simultaneous voice limit of {limit} reached")]
    VoiceLimit { limit: usize },

    #[error("Unknown voice {0}")]
    InvalidVoice(VoiceId),

    #[error("Unknown buffer {0}")]
    InvalidBuffer(BufferId),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Device error: {0}")]
    Device(String),
}

impl DriverError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DriverError::Device(_))
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
            ConfigError::InvalidValue { field, reason } => {
                format!("Setting '{}' is not usable: {}", field, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_engine_error_from_decode_error() {
        let decode_error = DecodeError::UnsupportedExtension {
            extension: "xm".to_string(),
        };
        let engine_error: EngineError = decode_error.into();

        match engine_error {
            EngineError::Decode(DecodeError::UnsupportedExtension { extension }) => {
                assert_eq!(extension, "xm");
            }
            _ => panic!("Expected Decode error variant"),
        }
    }

    #[test]
    fn test_engine_error_from_pool_error() {
        let pool_error = PoolError::InsufficientVoices {
            created: 2,
            required: 4,
        };
        let engine_error: EngineError = pool_error.into();

        assert!(!engine_error.is_recoverable());
        assert_eq!(engine_error.severity(), ErrorSeverity::Critical);
        assert!(engine_error.user_message().contains("2 playback voices"));
    }

    #[test]
    fn test_decode_error_display() {
        let error = DecodeError::UnsupportedExtension {
            extension: "txt".to_string(),
        };
        assert_eq!(format!("{}", error), "Unsupported audio file extension: txt");

        let error = DecodeError::format("WAV", "missing fmt chunk");
        assert_eq!(format!("{}", error), "Invalid WAV data: missing fmt chunk");

        let error = DecodeError::UnsupportedLayout {
            channels: 6,
            bit_depth: 16,
        };
        assert_eq!(format!("{}", error), "Unsupported layout: 6 channel(s) at 16 bits");

        let error = DecodeError::DecodeFailed("bad packet".to_string());
        assert_eq!(format!("{}", error), "Decode failed: bad packet");
    }

    #[test]
    fn test_driver_error_display() {
        assert_eq!(
            format!("{}", DriverError::VoiceLimit { limit: 32 }),
            "Simultaneous voice limit of 32 reached"
        );
        assert_eq!(format!("{}", DriverError::InvalidVoice(VoiceId(7))), "Unknown voice 7");
        assert!(DriverError::OutOfVoices.is_recoverable());
        assert!(!DriverError::Device("gone".to_string()).is_recoverable());
    }

    #[test]
    fn test_severity_mapping() {
        let limit: EngineError = DriverError::VoiceLimit { limit: 1 }.into();
        assert_eq!(limit.severity(), ErrorSeverity::Info);
        assert_eq!(limit.severity().log_level(), log::Level::Info);

        let ext: EngineError = DecodeError::UnsupportedExtension {
            extension: "mid".to_string(),
        }
        .into();
        assert_eq!(ext.severity().as_str(), "WARNING");
    }

    #[test]
    fn test_config_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied");
        let config_error: ConfigError = io_error.into();

        match config_error {
            ConfigError::IoError(_) => {
                // Success
            }
            _ => panic!("Expected IoError variant"),
        }
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = io::Error::new(io::ErrorKind::UnexpectedEof, "truncated");
        let engine_error = EngineError::Decode(DecodeError::Io(io_error));

        let mut current_error: &dyn Error = &engine_error;
        let mut error_count = 0;

        while let Some(source) = current_error.source() {
            current_error = source;
            error_count += 1;
        }

        assert!(error_count >= 1);
    }
}
