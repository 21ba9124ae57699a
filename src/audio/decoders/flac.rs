use log::debug;
use symphonia::core::audio::SampleBuffer;

use super::packet::PacketReader;
use crate::audio::stream::SharedStream;
use crate::audio::AudioDecoder;
use crate::error::DecodeError;
use crate::models::{AudioCodec, PcmSpec};

/// FLAC decoder producing one native frame per `decode`.
///
/// Forward-only: `seek` always fails. `rewind` re-opens the container, which
/// is what looping and `stop` rely on.
pub struct FlacDecoder {
    reader: PacketReader,
    samples: Option<SampleBuffer<i16>>,
    pcm: Vec<i16>,
    buffer: Vec<u8>,
    finished: bool,
}

impl FlacDecoder {
    pub fn new(stream: SharedStream) -> Result<Self, DecodeError> {
        Ok(Self {
            reader: PacketReader::open(stream, AudioCodec::Flac)?,
            samples: None,
            pcm: Vec::new(),
            buffer: Vec::new(),
            finished: false,
        })
    }
}

impl AudioDecoder for FlacDecoder {
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

    fn seek(&mut self, _byte_offset: u64) -> bool {
        false
    }

    fn rewind(&mut self) -> bool {
        match self.reader.reopen() {
            Ok(()) => {
                self.finished = false;
                true
            }
            Err(e) => {
                debug!("FLAC rewind failed: {}", e);
                false
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn spec(&self) -> PcmSpec {
        self.reader.spec()
    }

    fn codec(&self) -> AudioCodec {
        AudioCodec::Flac
    }

    fn total_bytes(&self) -> Option<u64> {
        self.reader
            .total_frames()
            .map(|frames| frames * self.reader.spec().bytes_per_frame())
    }
}
