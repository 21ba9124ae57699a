use serde::{Deserialize, Serialize};
use std::path::Path;

/// PCM layout tag understood by the voice driver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PcmFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

impl PcmFormat {
    /// Map a channel count and bit depth onto a driver format, if one exists
    pub fn from_layout(channels: u16, bit_depth: u16) -> Option<Self> {
        match (channels, bit_depth) {
            (1, 8) => Some(PcmFormat::Mono8),
            (1, 16) => Some(PcmFormat::Mono16),
            (2, 8) => Some(PcmFormat::Stereo8),
            (2, 16) => Some(PcmFormat::Stereo16),
            _ => None,
        }
    }

    pub fn channels(&self) -> u16 {
        match self {
            PcmFormat::Mono8 | PcmFormat::Mono16 => 1,
            PcmFormat::Stereo8 | PcmFormat::Stereo16 => 2,
        }
    }

    pub fn bit_depth(&self) -> u16 {
        match self {
            PcmFormat::Mono8 | PcmFormat::Stereo8 => 8,
            PcmFormat::Mono16 | PcmFormat::Stereo16 => 16,
        }
    }

    /// Bytes occupied by one frame (one sample for every channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels() as usize * (self.bit_depth() as usize / 8)
    }
}

/// Fixed format of the PCM a decoder produces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PcmSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
}

impl PcmSpec {
    pub fn new(channels: u16, sample_rate: u32, bit_depth: u16) -> Self {
        Self {
            channels,
            sample_rate,
            bit_depth,
        }
    }

    /// The driver format for this layout
    pub fn format(&self) -> Option<PcmFormat> {
        PcmFormat::from_layout(self.channels, self.bit_depth)
    }

    pub fn bytes_per_frame(&self) -> u64 {
        self.channels as u64 * (self.bit_depth as u64 / 8)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_frame() * self.sample_rate as u64
    }

    /// Get a human-readable format description
    pub fn format_description(&self) -> String {
        format!(
            "{}-bit/{} Hz - {} channel{}",
            self.bit_depth,
            self.sample_rate,
            self.channels,
            if self.channels == 1 { "" } else { "s" }
        )
    }
}

/// Supported audio codecs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AudioCodec {
    Wav,
    OggVorbis,
    Flac,
    Mp3,
}

impl AudioCodec {
    /// Get the human-readable name of the codec
    pub fn name(&self) -> &'static str {
        match self {
            AudioCodec::Wav => "WAV",
            AudioCodec::OggVorbis => "OGG Vorbis",
            AudioCodec::Flac => "FLAC",
            AudioCodec::Mp3 => "MP3",
        }
    }

    /// Get file extensions associated with this codec
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            AudioCodec::Wav => &["wav", "wave"],
            AudioCodec::OggVorbis => &["ogg", "oga"],
            AudioCodec::Flac => &["flac"],
            AudioCodec::Mp3 => &["mp3"],
        }
    }

    /// Whether the decoder for this codec can reposition to arbitrary offsets
    pub fn is_seekable(&self) -> bool {
        !matches!(self, AudioCodec::Flac)
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        [
            AudioCodec::Wav,
            AudioCodec::OggVorbis,
            AudioCodec::Flac,
            AudioCodec::Mp3,
        ]
        .into_iter()
        .find(|codec| codec.extensions().contains(&extension.as_str()))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Whether a source keeps its whole asset resident or streams it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SourceKind {
    Static,
    #[default]
    Stream,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Static => "static",
            SourceKind::Stream => "stream",
        }
    }
}

/// Transport state of a source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

impl TransportState {
    /// Get a human-readable string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Initial => "Initial",
            TransportState::Playing => "Playing",
            TransportState::Paused => "Paused",
            TransportState::Stopped => "Stopped",
        }
    }

    /// A source in this state holds a voice
    pub fn holds_voice(&self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Paused)
    }
}
