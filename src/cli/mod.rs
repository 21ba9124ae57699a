use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::SourceKind;

/// Play audio files through the voice pool
#[derive(Debug, Parser)]
#[command(name = "voicepool-play")]
#[command(about = "Play audio files through a voice-pooled mixer")]
#[command(version = "0.1.0")]
pub struct PlayArgs {
    /// Files to play at the same time
    #[arg(required_unless_present = "list_devices")]
    pub files: Vec<String>,

    /// Stream from disk instead of decoding up front
    #[arg(long)]
    pub stream: bool,

    /// Loop every file until interrupted
    #[arg(long = "loop")]
    pub looping: bool,

    /// Volume level (0-100)
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub volume: u8,

    /// Playback rate multiplier
    #[arg(long, default_value_t = 1.0)]
    pub pitch: f32,

    /// Start offset (e.g., "1:30", "90", "90s")
    #[arg(long, value_parser = CliApp::parse_time)]
    pub start: Option<Duration>,

    /// Output device name
    #[arg(long)]
    pub device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Scheduler period in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,
}

impl PlayArgs {
    pub fn source_kind(&self) -> SourceKind {
        if self.stream {
            SourceKind::Stream
        } else {
            SourceKind::Static
        }
    }

    /// Volume as a gain in 0.0..=1.0
    pub fn gain(&self) -> f32 {
        self.volume as f32 / 100.0
    }
}

/// Helpers shared by the command-line front end
pub struct CliApp;

impl CliApp {
    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home_dir) => home_dir.join(rest),
                None => PathBuf::from(path),
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Parse "1:30", "90", "90s" or "1:30.5" into a duration
    pub fn parse_time(time_str: &str) -> Result<Duration, ParseError> {
        let trimmed = time_str.trim();
        let invalid = || ParseError::InvalidTimeFormat {
            input: time_str.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        let seconds = match trimmed.split_once(':') {
            Some((minutes, seconds)) => {
                let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
                let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
                if !(0.0..60.0).contains(&seconds) {
                    return Err(invalid());
                }
                minutes as f64 * 60.0 + seconds
            }
            None => {
                let seconds: f64 = trimmed
                    .trim_end_matches('s')
                    .parse()
                    .map_err(|_| invalid())?;
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(invalid());
                }
                seconds
            }
        };
        Ok(Duration::from_secs_f64(seconds))
    }

    /// Reject a start offset past the end of a file of known length
    pub fn validate_seek_time(position: Duration, duration: Option<Duration>) -> Result<Duration, ParseError> {
        if let Some(track_duration) = duration {
            if position > track_duration {
                return Err(ParseError::SeekBeyondDuration {
                    position: position.as_secs_f64(),
                    duration: track_duration.as_secs_f64(),
                });
            }
        }
        Ok(position)
    }

    /// Format duration for display
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        format!("{:02}:{:02}", minutes, seconds)
    }

    /// "position / duration", with "--:--" for an unknown length
    pub fn format_position(position: Duration, duration: Option<Duration>) -> String {
        let total = duration
            .map(Self::format_duration)
            .unwrap_or_else(|| "--:--".to_string());
        format!("{} / {}", Self::format_duration(position), total)
    }

    /// File name for status lines
    pub fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

/// Argument parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },

    #[error("Seek position {position:.2}s exceeds track duration {duration:.2}s")]
    SeekBeyondDuration { position: f64, duration: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(CliApp::parse_time("90").unwrap(), Duration::from_secs(90));
        assert_eq!(CliApp::parse_time("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(CliApp::parse_time(" 1:30 ").unwrap(), Duration::from_secs(90));
        assert_eq!(CliApp::parse_time("0:01.5").unwrap(), Duration::from_millis(1500));
        assert_eq!(CliApp::parse_time("2.25").unwrap(), Duration::from_millis(2250));
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        for input in ["", "abc", "1:60", "1:2:3", "-5", "1:-1", "inf"] {
            assert!(
                matches!(CliApp::parse_time(input), Err(ParseError::InvalidTimeFormat { .. })),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn test_validate_seek_time() {
        let length = Some(Duration::from_secs(10));
        assert!(CliApp::validate_seek_time(Duration::from_secs(5), length).is_ok());
        assert!(CliApp::validate_seek_time(Duration::from_secs(50), None).is_ok());
        assert!(matches!(
            CliApp::validate_seek_time(Duration::from_secs(11), length),
            Err(ParseError::SeekBeyondDuration { .. })
        ));
    }

    #[test]
    fn test_format_position() {
        assert_eq!(CliApp::format_duration(Duration::from_secs(185)), "03:05");
        assert_eq!(
            CliApp::format_position(Duration::from_secs(61), Some(Duration::from_secs(120))),
            "01:01 / 02:00"
        );
        assert_eq!(CliApp::format_position(Duration::ZERO, None), "00:00 / --:--");
    }

    #[test]
    fn test_expand_path() {
        assert_ne!(CliApp::expand_path("~").to_string_lossy(), "~");
        assert!(!CliApp::expand_path("~/Music/a.ogg").to_string_lossy().starts_with('~'));
        assert_eq!(CliApp::expand_path("/abs/a.wav"), PathBuf::from("/abs/a.wav"));
        assert_eq!(CliApp::expand_path("rel/a.wav"), PathBuf::from("rel/a.wav"));
    }

    #[test]
    fn test_play_args() {
        let args = PlayArgs::try_parse_from([
            "voicepool-play",
            "a.wav",
            "b.ogg",
            "--stream",
            "--loop",
            "--volume",
            "50",
            "--start",
            "0:10",
        ])
        .unwrap();
        assert_eq!(args.files, vec!["a.wav", "b.ogg"]);
        assert_eq!(args.source_kind(), SourceKind::Stream);
        assert!(args.looping);
        assert_eq!(args.gain(), 0.5);
        assert_eq!(args.start, Some(Duration::from_secs(10)));
        assert_eq!(args.pitch, 1.0);
    }

    #[test]
    fn test_play_args_validation() {
        assert!(PlayArgs::try_parse_from(["voicepool-play"]).is_err());
        assert!(PlayArgs::try_parse_from(["voicepool-play", "--list-devices"]).is_ok());
        assert!(PlayArgs::try_parse_from(["voicepool-play", "a.wav", "--volume", "101"]).is_err());
        assert!(PlayArgs::try_parse_from(["voicepool-play", "a.wav", "--start", "soon"]).is_err());
    }
}
