pub mod flac;
pub mod mp3;
pub mod ogg;
mod packet;
pub mod wav;

pub use flac::FlacDecoder;
pub use mp3::Mp3Decoder;
pub use ogg::OggDecoder;
pub use wav::WavDecoder;

use std::path::Path;

use crate::audio::stream::{self, AudioStream, SharedStream};
use crate::audio::AudioDecoder;
use crate::error::DecodeError;
use crate::models::{AudioCodec, PcmSpec};

/// Decoder construction settings
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Upper bound on one chunk for decoders that read in chunks
    pub chunk_bytes: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            chunk_bytes: 128 * 1024,
        }
    }
}

/// A decoder for any supported format
pub enum Decoder {
    Wav(WavDecoder),
    Vorbis(OggDecoder),
    Flac(FlacDecoder),
    Mp3(Mp3Decoder),
}

impl Decoder {
    /// Open a file, picking the decoder by extension
    pub fn open(path: &Path, options: &DecodeOptions) -> Result<Self, DecodeError> {
        let codec = AudioCodec::from_path(path).ok_or_else(|| DecodeError::UnsupportedExtension {
            extension: path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })?;
        let stream = stream::open_file(path)?;
        Self::from_stream(stream, codec, options)
    }

    /// Decode an arbitrary byte stream as the given codec
    pub fn from_stream(
        stream: Box<dyn AudioStream>,
        codec: AudioCodec,
        options: &DecodeOptions,
    ) -> Result<Self, DecodeError> {
        let decoder = match codec {
            AudioCodec::Wav => {
                Decoder::Wav(WavDecoder::new(SharedStream::new(stream)?, options.chunk_bytes)?)
            }
            AudioCodec::OggVorbis => {
                Decoder::Vorbis(OggDecoder::new(SharedStream::new(stream)?, options.chunk_bytes)?)
            }
            AudioCodec::Flac => Decoder::Flac(FlacDecoder::new(SharedStream::new(stream)?)?),
            AudioCodec::Mp3 => Decoder::Mp3(Mp3Decoder::new(SharedStream::new(stream)?)?),
        };
        Ok(decoder)
    }

    fn inner(&self) -> &dyn AudioDecoder {
        match self {
            Decoder::Wav(d) => d,
            Decoder::Vorbis(d) => d,
            Decoder::Flac(d) => d,
            Decoder::Mp3(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AudioDecoder {
        match self {
            Decoder::Wav(d) => d,
            Decoder::Vorbis(d) => d,
            Decoder::Flac(d) => d,
            Decoder::Mp3(d) => d,
        }
    }
}

impl AudioDecoder for Decoder {
    fn decode(&mut self) -> Result<usize, DecodeError> {
        self.inner_mut().decode()
    }

    fn buffer(&self) -> &[u8] {
        self.inner().buffer()
    }

    fn seek(&mut self, byte_offset: u64) -> bool {
        self.inner_mut().seek(byte_offset)
    }

    fn rewind(&mut self) -> bool {
        self.inner_mut().rewind()
    }

    fn is_finished(&self) -> bool {
        self.inner().is_finished()
    }

    fn spec(&self) -> PcmSpec {
        self.inner().spec()
    }

    fn codec(&self) -> AudioCodec {
        self.inner().codec()
    }

    fn total_bytes(&self) -> Option<u64> {
        self.inner().total_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::{wav_bytes, write_wav};
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_open_selects_decoder_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "tone.WAV", 44100, 1, 16, 441);

        let decoder = Decoder::open(&path, &DecodeOptions::default()).unwrap();
        assert!(matches!(decoder, Decoder::Wav(_)));
        assert_eq!(decoder.codec(), AudioCodec::Wav);
        assert_eq!(decoder.spec(), PcmSpec::new(1, 44100, 16));
        assert_eq!(decoder.total_bytes(), Some(882));
    }

    #[test]
    fn test_unsupported_extension() {
        let result = Decoder::open(Path::new("/sfx/loop.xm"), &DecodeOptions::default());
        match result {
            Err(DecodeError::UnsupportedExtension { extension }) => assert_eq!(extension, "xm"),
            _ => panic!("Expected UnsupportedExtension error"),
        }

        let result = Decoder::open(Path::new("/sfx/noext"), &DecodeOptions::default());
        assert!(matches!(result, Err(DecodeError::UnsupportedExtension { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Decoder::open(Path::new("/nonexistent/file.ogg"), &DecodeOptions::default());
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }

    #[test]
    fn test_from_stream_dispatches() {
        let stream = Box::new(Cursor::new(wav_bytes(8000, 2, 8, 10)));
        let mut decoder = Decoder::from_stream(stream, AudioCodec::Wav, &DecodeOptions { chunk_bytes: 8 }).unwrap();

        assert_eq!(decoder.decode().unwrap(), 8);
        assert_eq!(decoder.buffer().len(), 8);
        assert!(decoder.seek(16));
        assert_eq!(decoder.decode().unwrap(), 4);
        assert_eq!(decoder.decode().unwrap(), 0);
        assert!(decoder.is_finished());
        assert!(decoder.rewind());
        assert_eq!(decoder.get_data().unwrap().len(), 20);
    }

    #[test]
    fn test_wrong_codec_for_stream_fails() {
        let stream = Box::new(Cursor::new(wav_bytes(8000, 1, 16, 10)));
        assert!(Decoder::from_stream(stream, AudioCodec::Flac, &DecodeOptions::default()).is_err());
    }
}
