//! Conversions between playback time and decoded-PCM byte offsets.
//!
//! Offsets are always whole frames. Converting a duration truncates to the
//! frame at or before it. Converting back yields the first nanosecond of that
//! frame, so repeated round trips land on the same frame.

use std::time::Duration;

use crate::models::PcmSpec;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Byte offset of the frame playing at `position`
pub fn duration_to_byte_offset(position: Duration, spec: &PcmSpec) -> u64 {
    if spec.sample_rate == 0 {
        return 0;
    }
    let frames = position.as_nanos() * spec.sample_rate as u128 / NANOS_PER_SEC;
    (frames as u64).saturating_mul(spec.bytes_per_frame())
}

/// Playback time of the frame containing `offset`
pub fn byte_offset_to_duration(offset: u64, spec: &PcmSpec) -> Duration {
    let bytes_per_frame = spec.bytes_per_frame();
    if bytes_per_frame == 0 || spec.sample_rate == 0 {
        return Duration::ZERO;
    }
    let frames = (offset / bytes_per_frame) as u128;
    let rate = spec.sample_rate as u128;
    let nanos = (frames * NANOS_PER_SEC + rate - 1) / rate;
    Duration::from_nanos(nanos as u64)
}

/// Round a byte offset down to a frame boundary
pub fn align_to_frame(offset: u64, spec: &PcmSpec) -> u64 {
    let bytes_per_frame = spec.bytes_per_frame();
    if bytes_per_frame == 0 {
        return offset;
    }
    offset - offset % bytes_per_frame
}
