pub mod buffer;
pub mod decoders;
pub mod device;
pub mod driver;
pub mod engine;
pub mod offset;
pub mod output;
pub mod pool;
pub mod scheduler;
pub mod source;
pub mod stream;

#[cfg(test)]
pub mod tests;

use std::time::Duration;

use crate::error::DecodeError;
use crate::models::{AudioCodec, PcmSpec};

pub use decoders::{DecodeOptions, Decoder, FlacDecoder, Mp3Decoder, OggDecoder, WavDecoder};
pub use device::DeviceManager;
pub use driver::{BufferId, MixerConfig, SoftwareDriver, VoiceDriver, VoiceId, VoiceState};
pub use engine::AudioEngine;
pub use offset::{byte_offset_to_duration, duration_to_byte_offset};
pub use output::OutputStream;
pub use pool::Pool;
pub use scheduler::Scheduler;
pub use source::Source;
pub use stream::AudioStream;

const MAX_PREALLOC_BYTES: u64 = 16 * 1024 * 1024;

/// Core trait for audio decoding functionality
pub trait AudioDecoder: Send {
    /// Decode the next chunk into the internal buffer, returning its length in bytes
    fn decode(&mut self) -> Result<usize, DecodeError>;

    /// Bytes produced by the last `decode`
    fn buffer(&self) -> &[u8];

    /// Reposition to a byte offset in decoded-PCM space
    fn seek(&mut self, byte_offset: u64) -> bool;

    /// Return to the start of the stream
    fn rewind(&mut self) -> bool;

    /// True once a read has hit the end of the stream
    fn is_finished(&self) -> bool;

    /// Format of the produced PCM
    fn spec(&self) -> PcmSpec;

    fn codec(&self) -> AudioCodec;

    /// Total decoded size, when the container reports it
    fn total_bytes(&self) -> Option<u64>;

    fn is_seekable(&self) -> bool {
        self.codec().is_seekable()
    }

    fn duration(&self) -> Option<Duration> {
        let spec = self.spec();
        self.total_bytes()
            .map(|bytes| byte_offset_to_duration(bytes, &spec))
    }

    /// Decode the whole stream from the start into one buffer
    fn get_data(&mut self) -> Result<Vec<u8>, DecodeError> {
        if !self.rewind() {
            return Err(DecodeError::DecodeFailed(format!(
                "{} stream cannot be rewound",
                self.codec().name()
            )));
        }

        // Header lengths are untrusted, so they only hint the allocation
        let capacity = self.total_bytes().unwrap_or(0).min(MAX_PREALLOC_BYTES) as usize;
        let mut data = Vec::with_capacity(capacity);
        loop {
            let read = self.decode()?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(self.buffer());
        }
        Ok(data)
    }
}
