use symphonia::core::audio::SampleBuffer;

use super::packet::PacketReader;
use crate::audio::stream::SharedStream;
use crate::audio::AudioDecoder;
use crate::error::DecodeError;
use crate::models::{AudioCodec, PcmSpec};

/// MPEG layer III decoder producing one native frame per `decode`
pub struct Mp3Decoder {
    reader: PacketReader,
    samples: Option<SampleBuffer<i16>>,
    pcm: Vec<i16>,
    buffer: Vec<u8>,
    finished: bool,
}

impl Mp3Decoder {
    pub fn new(stream: SharedStream) -> Result<Self, DecodeError> {
        Ok(Self {
            reader: PacketReader::open(stream, AudioCodec::Mp3)?,
            samples: None,
            pcm: Vec::new(),
            buffer: Vec::new(),
            finished: false,
        })
    }
}

impl AudioDecoder for Mp3Decoder {
    fn decode(&mut self) -> Result<usize, DecodeError> {
        self.buffer.clear();
        if self.finished {
            return Ok(0);
        }

        self.pcm.clear();
        if !self.reader.next_samples(&mut self.samples, &mut self.pcm)? {
            self.finished = true;
            return Ok(0);
        }

        self.buffer.extend(self.pcm.iter().flat_map(|s| s.to_le_bytes()));
        Ok(self.buffer.len())
    }

    fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn seek(&mut self, byte_offset: u64) -> bool {
        let frame = byte_offset / self.reader.spec().bytes_per_frame();
        match self.reader.seek_frame(frame) {
            Ok(()) => {
                self.finished = false;
                true
            }
            Err(e) => {
                log::debug!("MP3 seek to byte {} failed: {}", byte_offset, e);
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
        AudioCodec::Mp3
    }

    fn total_bytes(&self) -> Option<u64> {
        self.reader
            .total_frames()
            .map(|frames| frames * self.reader.spec().bytes_per_frame())
    }
}
