use log::debug;
use symphonia::core::audio::SampleBuffer;

use super::packet::PacketReader;
use crate::audio::stream::SharedStream;
use crate::audio::AudioDecoder;
use crate::error::DecodeError;
use crate::models::{AudioCodec, PcmSpec};

/// Clamp a float sample to [-1, 1] and scale it to signed 16-bit
pub(crate) fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// OGG Vorbis decoder.
///
/// Vorbis packets are small and irregular, so each `decode` pulls as many
/// packets as it takes to fill a whole chunk and carries the surplus over to
/// the next call.
pub struct OggDecoder {
    reader: PacketReader,
    samples: Option<SampleBuffer<f32>>,
    /// Decoded samples not yet handed out
    carry: Vec<f32>,
    chunk_samples: usize,
    buffer: Vec<u8>,
    exhausted: bool,
    finished: bool,
}

impl OggDecoder {
    pub fn new(stream: SharedStream, chunk_bytes: usize) -> Result<Self, DecodeError> {
        let reader = PacketReader::open(stream, AudioCodec::OggVorbis)?;
        let channels = reader.spec().channels as usize;
        let frames = (chunk_bytes / reader.spec().bytes_per_frame() as usize).max(1);

        Ok(Self {
            reader,
            samples: None,
            carry: Vec::new(),
            chunk_samples: frames * channels,
            buffer: Vec::new(),
            exhausted: false,
            finished: false,
        })
    }
}

impl AudioDecoder for OggDecoder {
    fn decode(&mut self) -> Result<usize, DecodeError> {
        self.buffer.clear();
        if self.finished {
            return Ok(0);
        }

        while !self.exhausted && self.carry.len() < self.chunk_samples {
            if !self.reader.next_samples(&mut self.samples, &mut self.carry)? {
                self.exhausted = true;
            }
        }

        let take = self.carry.len().min(self.chunk_samples);
        if take == 0 {
            self.finished = true;
            return Ok(0);
        }

        self.buffer.reserve(take * 2);
        for sample in self.carry.drain(..take) {
            self.buffer.extend_from_slice(&quantize(sample).to_le_bytes());
        }
        Ok(self.buffer.len())
    }

    fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn seek(&mut self, byte_offset: u64) -> bool {
        let frame = byte_offset / self.reader.spec().bytes_per_frame();
        match self.reader.seek_frame(frame) {
            Ok(()) => {
                self.carry.clear();
                self.exhausted = false;
                self.finished = false;
                true
            }
            Err(e) => {
                debug!("Vorbis seek to byte {} failed: {}", byte_offset, e);
                false
            }
        }
    }

    fn rewind(&mut self) -> bool {
        self.seek(0)
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn spec(&self) -> PcmSpec {
        self.reader.spec()
    }

    fn codec(&self) -> AudioCodec {
        AudioCodec::OggVorbis
    }

    fn total_bytes(&self) -> Option<u64> {
        self.reader
            .total_frames()
            .map(|frames| frames * self.reader.spec().bytes_per_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::{shared_stream, SILENCE_OGG};
    use std::io::Cursor;

    fn remaining(decoder: &mut OggDecoder) -> usize {
        let mut total = 0;
        loop {
            let read = decoder.decode().unwrap();
            if read == 0 {
                return total;
            }
            assert!(decoder.buffer().iter().all(|&b| b == 0));
            total += read;
        }
    }

    #[test]
    fn test_ogg_fixture_decodes_every_frame() {
        let mut decoder = OggDecoder::new(shared_stream(SILENCE_OGG), 1000).unwrap();
        assert_eq!(decoder.spec(), PcmSpec::new(1, 8000, 16));
        assert_eq!(decoder.total_bytes(), Some(8192 * 2));

        assert_eq!(decoder.decode().unwrap(), 1000);
        assert_eq!(decoder.buffer().len() + remaining(&mut decoder), 16_384);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_ogg_seek_lands_on_requested_frame() {
        let mut decoder = OggDecoder::new(shared_stream(SILENCE_OGG), 4096).unwrap();
        decoder.decode().unwrap();

        assert!(decoder.seek(12_000));
        assert_eq!(remaining(&mut decoder), (8192 - 6000) * 2);

        assert!(!decoder.seek(16_386));
        assert!(decoder.rewind());
        assert_eq!(remaining(&mut decoder), 16_384);
    }

    #[test]
    fn test_quantize_clamps_and_scales() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(1.0), 32767);
        assert_eq!(quantize(-1.0), -32767);
        assert_eq!(quantize(0.5), 16383);
        assert_eq!(quantize(3.7), 32767);
        assert_eq!(quantize(-12.0), -32767);
    }

    #[test]
    fn test_ogg_decoder_rejects_non_ogg_data() {
        let stream = SharedStream::new(Box::new(Cursor::new(b"OggS".repeat(8)))).unwrap();
        assert!(OggDecoder::new(stream, 4096).is_err());
    }
}
