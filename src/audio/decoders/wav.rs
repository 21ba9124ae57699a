use log::debug;
use symphonia::core::audio::SampleBuffer;

use super::packet::PacketReader;
use crate::audio::stream::SharedStream;
use crate::audio::AudioDecoder;
use crate::error::DecodeError;
use crate::models::{AudioCodec, PcmSpec};

/// Decoded samples not yet handed out, kept at the file's own depth
enum Pending {
    U8 {
        samples: Option<SampleBuffer<u8>>,
        carry: Vec<u8>,
    },
    S16 {
        samples: Option<SampleBuffer<i16>>,
        carry: Vec<i16>,
    },
}

impl Pending {
    fn for_depth(bit_depth: u16) -> Self {
        match bit_depth {
            8 => Pending::U8 {
                samples: None,
                carry: Vec::new(),
            },
            _ => Pending::S16 {
                samples: None,
                carry: Vec::new(),
            },
        }
    }

    fn len(&self) -> usize {
        match self {
            Pending::U8 { carry, .. } => carry.len(),
            Pending::S16 { carry, .. } => carry.len(),
        }
    }

    /// Append the next packet; false at the end of the data chunk
    fn pull(&mut self, reader: &mut PacketReader) -> Result<bool, DecodeError> {
        match self {
            Pending::U8 { samples, carry } => reader.next_samples(samples, carry),
            Pending::S16 { samples, carry } => reader.next_samples(samples, carry),
        }
    }

    /// Move `take` samples into `out` as little-endian PCM
    fn drain_into(&mut self, take: usize, out: &mut Vec<u8>) {
        match self {
            Pending::U8 { carry, .. } => out.extend(carry.drain(..take)),
            Pending::S16 { carry, .. } => {
                out.extend(carry.drain(..take).flat_map(|s| s.to_le_bytes()));
            }
        }
    }

    fn clear(&mut self) {
        match self {
            Pending::U8 { carry, .. } => carry.clear(),
            Pending::S16 { carry, .. } => carry.clear(),
        }
    }
}

/// Uncompressed RIFF/WAVE decoder.
///
/// Hands out whole frames at the file's native depth, unsigned 8-bit or
/// signed 16-bit little-endian, in chunks of at most `chunk_bytes`.
pub struct WavDecoder {
    reader: PacketReader,
    pending: Pending,
    chunk_samples: usize,
    buffer: Vec<u8>,
    exhausted: bool,
    finished: bool,
}

impl WavDecoder {
    pub fn new(stream: SharedStream, chunk_bytes: usize) -> Result<Self, DecodeError> {
        let reader = PacketReader::open(stream, AudioCodec::Wav)?;
        let spec = reader.spec();
        let frames = (chunk_bytes / spec.bytes_per_frame() as usize).max(1);

        Ok(Self {
            pending: Pending::for_depth(spec.bit_depth),
            chunk_samples: frames * spec.channels as usize,
            reader,
            buffer: Vec::new(),
            exhausted: false,
            finished: false,
        })
    }
}

impl AudioDecoder for WavDecoder {
    fn decode(&mut self) -> Result<usize, DecodeError> {
        self.buffer.clear();
        if self.finished {
            return Ok(0);
        }

        while !self.exhausted && self.pending.len() < self.chunk_samples {
            if !self.pending.pull(&mut self.reader)? {
                self.exhausted = true;
            }
        }

        let take = self.pending.len().min(self.chunk_samples);
        if take == 0 {
            self.finished = true;
            return Ok(0);
        }

        self.pending.drain_into(take, &mut self.buffer);
        Ok(self.buffer.len())
    }

    fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn seek(&mut self, byte_offset: u64) -> bool {
        let frame = byte_offset / self.reader.spec().bytes_per_frame();
        match self.reader.seek_frame(frame) {
            Ok(()) => {
                self.pending.clear();
                self.exhausted = false;
                self.finished = false;
                true
            }
            Err(e) => {
                debug!("WAV seek to byte {} failed: {}", byte_offset, e);
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
        AudioCodec::Wav
    }

    fn total_bytes(&self) -> Option<u64> {
        self.reader
            .total_frames()
            .map(|frames| frames * self.reader.spec().bytes_per_frame())
    }
}
