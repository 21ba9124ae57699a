//! Shared fixtures for decoder, source and pool tests.

mod performance_tests;

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::driver::{MixerConfig, SoftwareDriver};
use crate::audio::pool::Pool;
use crate::config::EngineConfig;

/// Encode a PCM WAV whose samples count up with the frame index, so a
/// decoded byte can be traced back to its frame. Every channel carries the
/// same value. 8-bit files store the index modulo 256.
pub fn wav_bytes(sample_rate: u32, channels: u16, bits_per_sample: u16, frames: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format: SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for frame in 0..frames {
            for _ in 0..channels {
                match bits_per_sample {
                    8 => writer
                        .write_sample(((frame % 256) as i32 - 128) as i8)
                        .unwrap(),
                    _ => writer.write_sample((frame % 32768) as i16).unwrap(),
                }
            }
        }
        writer.finalize().unwrap();
    }
    bytes
}

/// Write a generated WAV fixture into `dir`
pub fn write_wav(
    dir: &Path,
    name: &str,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    frames: u32,
) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&wav_bytes(sample_rate, channels, bits_per_sample, frames))
        .unwrap();
    path
}

/// Assemble a RIFF/WAVE file from raw chunks, padding odd sizes
pub fn riff(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut body = b"WAVE".to_vec();
    for (id, data) in chunks {
        body.extend_from_slice(*id);
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(data);
        if data.len() % 2 == 1 {
            body.push(0);
        }
    }

    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&body);
    bytes
}

/// In-memory stream whose reads fail once the position reaches `fail_at`
pub struct FailingStream {
    inner: Cursor<Vec<u8>>,
    fail_at: u64,
}

impl FailingStream {
    pub fn new(bytes: Vec<u8>, fail_at: u64) -> Self {
        Self {
            inner: Cursor::new(bytes),
            fail_at,
        }
    }
}

impl Read for FailingStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let position = self.inner.position();
        if position >= self.fail_at {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
        }
        let allowed = ((self.fail_at - position) as usize).min(buf.len());
        self.inner.read(&mut buf[..allowed])
    }
}

impl Seek for FailingStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Stereo 8 kHz FLAC, 2500 frames in blocks of 1000, 1000 and 500.
/// Frame `i` holds `7 * i % 4000` on the left and `4000 - 5 * i % 4000` on the right.
pub const TONE_FLAC: &[u8] = include_bytes!("fixtures/tone.flac");

/// Mono 32 kHz MPEG layer III, 40 silent frames of 1152 samples
pub const SILENCE_MP3: &[u8] = include_bytes!("fixtures/silence.mp3");

/// Mono 8 kHz Ogg Vorbis, 8192 frames of silence
pub const SILENCE_OGG: &[u8] = include_bytes!("fixtures/silence.ogg");

/// Wrap in-memory bytes the way the packet decoders take them
pub fn shared_stream(bytes: &[u8]) -> crate::audio::stream::SharedStream {
    crate::audio::stream::SharedStream::new(Box::new(Cursor::new(bytes.to_vec()))).unwrap()
}

/// Mixer rate of `test_pool`. Fixtures at this rate advance exactly one
/// frame per rendered frame, which keeps positions free of rounding.
pub const TEST_RATE: u32 = 8000;

/// A pool over a mono software mixer with room for `voices` voices
pub fn test_pool(voices: usize) -> (Pool, SoftwareDriver) {
    let config = EngineConfig {
        max_voices: voices,
        min_voices: 1,
        ..EngineConfig::default()
    };
    test_pool_with(config, TEST_RATE)
}

pub fn test_pool_with(config: EngineConfig, sample_rate: u32) -> (Pool, SoftwareDriver) {
    let driver = SoftwareDriver::new(MixerConfig {
        sample_rate,
        channels: 1,
        max_voices: config.max_voices.max(1),
        max_playing: None,
    });
    let pool = Pool::init(Box::new(driver.clone()), &config).unwrap();
    (pool, driver)
}

#[cfg(test)]
mod fixture_tests {
    use super::*;

    #[test]
    fn test_wav_fixture_header() {
        let bytes = wav_bytes(8000, 1, 16, 10);
        assert_eq!(bytes.len(), 44 + 20);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[44..46], &0i16.to_le_bytes());
        assert_eq!(&bytes[62..64], &9i16.to_le_bytes());
    }

    #[test]
    fn test_eight_bit_fixture_counts_up() {
        let bytes = wav_bytes(8000, 1, 8, 300);
        assert_eq!(bytes[44], 0);
        assert_eq!(bytes[44 + 5], 5);
        assert_eq!(bytes[44 + 256], 0);
    }

    #[test]
    fn test_failing_stream_caps_reads() {
        let mut stream = FailingStream::new(vec![7u8; 64], 10);
        let mut buf = [0u8; 32];
        assert_eq!(stream.read(&mut buf).unwrap(), 10);
        assert!(stream.read(&mut buf).is_err());

        stream.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(stream.read(&mut buf[..4]).unwrap(), 4);
    }
}
