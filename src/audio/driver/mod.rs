//! Voice driver boundary.
//!
//! A driver owns a fixed set of hardware or software playback voices and the
//! PCM buffers that feed them. The pool is the only caller; it keeps the
//! driver behind its own mutex, so implementations need no internal locking
//! for correctness with respect to the engine.

pub mod software;

use std::fmt;

use crate::error::DriverError;
use crate::models::PcmFormat;

pub use software::{MixerConfig, SoftwareDriver};

/// Handle of one playback voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u32);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of one driver-side PCM buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state of a voice as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Operations the engine needs from a mixing backend.
///
/// Apart from the allocation calls, methods do not return errors. A failing
/// call records its error in a sticky slot that `take_error` reads and clears,
/// mirroring how hardware mixing APIs report failures.
pub trait VoiceDriver: Send {
    /// Allocate a new voice, failing once the backend has none left
    fn create_voice(&mut self) -> Result<VoiceId, DriverError>;
    fn delete_voice(&mut self, voice: VoiceId);

    fn create_buffer(&mut self) -> Result<BufferId, DriverError>;
    fn delete_buffer(&mut self, buffer: BufferId);
    /// Replace the contents of a buffer
    fn buffer_data(&mut self, buffer: BufferId, format: PcmFormat, data: &[u8], sample_rate: u32);

    /// Bind a single buffer for static playback, or detach with `None`
    fn set_static_buffer(&mut self, voice: VoiceId, buffer: Option<BufferId>);
    /// Append buffers to a voice's streaming queue
    fn queue_buffers(&mut self, voice: VoiceId, buffers: &[BufferId]);
    /// Remove up to `count` buffers from the front of the queue
    fn unqueue_buffers(&mut self, voice: VoiceId, count: usize) -> Vec<BufferId>;
    /// Queued buffers the voice has finished playing
    fn buffers_processed(&self, voice: VoiceId) -> usize;
    fn buffers_queued(&self, voice: VoiceId) -> usize;

    fn play(&mut self, voice: VoiceId);
    fn pause(&mut self, voice: VoiceId);
    fn stop(&mut self, voice: VoiceId);
    fn state(&self, voice: VoiceId) -> VoiceState;

    fn set_gain(&mut self, voice: VoiceId, gain: f32);
    fn gain(&self, voice: VoiceId) -> f32;
    fn set_pitch(&mut self, voice: VoiceId, pitch: f32);
    fn pitch(&self, voice: VoiceId) -> f32;
    fn set_looping(&mut self, voice: VoiceId, looping: bool);
    fn is_looping(&self, voice: VoiceId) -> bool;

    /// Playback position in bytes, relative to the start of the bound buffer
    /// (static) or of the oldest buffer still queued (streaming)
    fn byte_offset(&self, voice: VoiceId) -> u64;
    fn set_byte_offset(&mut self, voice: VoiceId, offset: u64);

    /// Read and clear the last recorded error
    fn take_error(&mut self) -> Option<DriverError>;

    fn set_listener_gain(&mut self, gain: f32);
    fn listener_gain(&self) -> f32;
}
