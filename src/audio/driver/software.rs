use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, trace};

use super::{BufferId, VoiceDriver, VoiceId, VoiceState};
use crate::error::DriverError;
use crate::models::PcmFormat;

/// Output layout and capacity of the software mixer
#[derive(Debug, Clone)]
pub struct MixerConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Voices that can be created in total
    pub max_voices: usize,
    /// Voices that may be playing or paused at once, if limited
    pub max_playing: Option<usize>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            max_voices: 256,
            max_playing: None,
        }
    }
}

struct PcmBuffer {
    format: PcmFormat,
    sample_rate: u32,
    data: Vec<u8>,
}

impl PcmBuffer {
    fn frames(&self) -> usize {
        self.data.len() / self.format.bytes_per_frame()
    }

    fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.format.channels() as usize;
        let index = frame * channels + channel.min(channels - 1);
        match self.format.bit_depth() {
            8 => (self.data[index] as f32 - 128.0) / 128.0,
            _ => {
                let at = index * 2;
                i16::from_le_bytes([self.data[at], self.data[at + 1]]) as f32 / 32768.0
            }
        }
    }
}

struct Voice {
    state: VoiceState,
    gain: f32,
    pitch: f32,
    looping: bool,
    static_buffer: Option<BufferId>,
    queue: VecDeque<BufferId>,
    /// Leading queue entries that have finished playing
    processed: usize,
    /// Fractional frame position inside the current buffer
    cursor: f64,
}

impl Voice {
    fn new() -> Self {
        Self {
            state: VoiceState::Initial,
            gain: 1.0,
            pitch: 1.0,
            looping: false,
            static_buffer: None,
            queue: VecDeque::new(),
            processed: 0,
            cursor: 0.0,
        }
    }

    fn current_buffer(&self) -> Option<BufferId> {
        match self.static_buffer {
            Some(buffer) => Some(buffer),
            None => self.queue.get(self.processed).copied(),
        }
    }

    /// Move past the current buffer. Returns false when playback has ended.
    fn advance_buffer(&mut self, frames: usize) -> bool {
        if self.static_buffer.is_some() {
            if !self.looping || frames == 0 {
                return false;
            }
            self.cursor %= frames as f64;
            return true;
        }

        self.processed += 1;
        self.cursor = (self.cursor - frames as f64).max(0.0);
        if self.processed < self.queue.len() {
            return true;
        }
        if self.looping && !self.queue.is_empty() {
            self.processed = 0;
            return true;
        }
        false
    }

    /// Ran out of data: stopped with every queued buffer processed
    fn finish(&mut self) {
        self.state = VoiceState::Stopped;
        self.cursor = 0.0;
        self.processed = self.queue.len();
    }

    fn holds_slot(&self) -> bool {
        matches!(self.state, VoiceState::Playing | VoiceState::Paused)
    }
}

struct Mixer {
    config: MixerConfig,
    voices: HashMap<VoiceId, Voice>,
    buffers: HashMap<BufferId, PcmBuffer>,
    next_voice: u32,
    next_buffer: u32,
    error: Option<DriverError>,
    listener_gain: f32,
    scratch: Vec<f32>,
}

impl Mixer {
    fn fail(&mut self, error: DriverError) {
        trace!("software driver error: {}", error);
        self.error = Some(error);
    }

    fn voice_mut(&mut self, voice: VoiceId) -> Option<&mut Voice> {
        if !self.voices.contains_key(&voice) {
            self.fail(DriverError::InvalidVoice(voice));
        }
        self.voices.get_mut(&voice)
    }

    fn buffer_in_use(&self, buffer: BufferId) -> bool {
        self.voices
            .values()
            .any(|v| v.static_buffer == Some(buffer) || v.queue.contains(&buffer))
    }

    fn byte_offset(&self, voice: &Voice) -> u64 {
        let bytes_per_frame = |id: &BufferId| {
            self.buffers
                .get(id)
                .map(|b| b.format.bytes_per_frame() as u64)
                .unwrap_or(0)
        };

        if let Some(id) = voice.static_buffer {
            return voice.cursor as u64 * bytes_per_frame(&id);
        }

        let played: u64 = voice
            .queue
            .iter()
            .take(voice.processed)
            .filter_map(|id| self.buffers.get(id))
            .map(|b| b.data.len() as u64)
            .sum();
        let current = voice
            .queue
            .get(voice.processed)
            .map(|id| voice.cursor as u64 * bytes_per_frame(id))
            .unwrap_or(0);
        played + current
    }

    fn render(&mut self, out: &mut [f32]) {
        out.iter_mut().for_each(|s| *s = 0.0);

        let out_channels = self.config.channels.max(1) as usize;
        let out_rate = self.config.sample_rate.max(1) as f64;
        let listener_gain = self.listener_gain;
        let Mixer { voices, buffers, .. } = self;

        for voice in voices.values_mut() {
            if voice.state == VoiceState::Playing {
                mix_voice(voice, buffers, out, out_channels, out_rate, listener_gain);
            }
        }

        out.iter_mut().for_each(|s| *s = s.clamp(-1.0, 1.0));
    }
}

fn mix_voice(
    voice: &mut Voice,
    buffers: &HashMap<BufferId, PcmBuffer>,
    out: &mut [f32],
    out_channels: usize,
    out_rate: f64,
    listener_gain: f32,
) {
    let amplitude = voice.gain * listener_gain;

    'frames: for frame in out.chunks_mut(out_channels) {
        let mut hops = 0;
        let buffer = loop {
            let Some(buffer) = voice.current_buffer().and_then(|id| buffers.get(&id)) else {
                voice.finish();
                break 'frames;
            };
            let frames = buffer.frames();
            if voice.cursor < frames as f64 {
                break buffer;
            }
            hops += 1;
            if hops > voice.queue.len() + 1 || !voice.advance_buffer(frames) {
                voice.finish();
                break 'frames;
            }
        };

        let frames = buffer.frames();
        let index = voice.cursor as usize;
        let fraction = (voice.cursor - index as f64) as f32;
        let next = (index + 1).min(frames - 1);
        let source_channels = buffer.format.channels() as usize;

        for (channel, slot) in frame.iter_mut().enumerate() {
            let value = if out_channels == 1 && source_channels == 2 {
                let left = lerp(buffer.sample(index, 0), buffer.sample(next, 0), fraction);
                let right = lerp(buffer.sample(index, 1), buffer.sample(next, 1), fraction);
                (left + right) * 0.5
            } else {
                lerp(buffer.sample(index, channel), buffer.sample(next, channel), fraction)
            };
            *slot += value * amplitude;
        }

        voice.cursor += voice.pitch as f64 * buffer.sample_rate as f64 / out_rate;
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// In-process mixing backend.
///
/// Clones share one mixer. The pool drives it through `VoiceDriver` while an
/// output stream (or a test) pulls mixed audio with `render`.
#[derive(Clone)]
pub struct SoftwareDriver {
    mixer: Arc<Mutex<Mixer>>,
}

impl SoftwareDriver {
    pub fn new(config: MixerConfig) -> Self {
        debug!(
            "Software mixer: {} Hz, {} channel(s), {} voices",
            config.sample_rate, config.channels, config.max_voices
        );
        Self {
            mixer: Arc::new(Mutex::new(Mixer {
                config,
                voices: HashMap::new(),
                buffers: HashMap::new(),
                next_voice: 1,
                next_buffer: 1,
                error: None,
                listener_gain: 1.0,
                scratch: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> MixerConfig {
        self.lock().config.clone()
    }

    /// Mix every playing voice into `out` (interleaved, output channel count)
    pub fn render(&self, out: &mut [f32]) {
        self.lock().render(out);
    }

    /// Render and discard `duration` worth of output
    pub fn advance(&self, duration: Duration) {
        let mut mixer = self.lock();
        let frames = (duration.as_secs_f64() * mixer.config.sample_rate as f64).round() as usize;
        let len = frames * mixer.config.channels.max(1) as usize;

        let mut scratch = std::mem::take(&mut mixer.scratch);
        scratch.resize(len, 0.0);
        mixer.render(&mut scratch);
        mixer.scratch = scratch;
    }

    pub fn voice_count(&self) -> usize {
        self.lock().voices.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Voices currently in the playing state
    pub fn playing_voices(&self) -> usize {
        self.lock()
            .voices
            .values()
            .filter(|v| v.state == VoiceState::Playing)
            .count()
    }
}

impl VoiceDriver for SoftwareDriver {
    fn create_voice(&mut self) -> Result<VoiceId, DriverError> {
        let mut mixer = self.lock();
        if mixer.voices.len() >= mixer.config.max_voices {
            return Err(DriverError::OutOfVoices);
        }
        let id = VoiceId(mixer.next_voice);
        mixer.next_voice += 1;
        mixer.voices.insert(id, Voice::new());
        Ok(id)
    }

    fn delete_voice(&mut self, voice: VoiceId) {
        let mut mixer = self.lock();
        if mixer.voices.remove(&voice).is_none() {
            mixer.fail(DriverError::InvalidVoice(voice));
        }
    }

    fn create_buffer(&mut self) -> Result<BufferId, DriverError> {
        let mut mixer = self.lock();
        let id = BufferId(mixer.next_buffer);
        let sample_rate = mixer.config.sample_rate;
        mixer.next_buffer += 1;
        mixer.buffers.insert(
            id,
            PcmBuffer {
                format: PcmFormat::Mono16,
                sample_rate,
                data: Vec::new(),
            },
        );
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        let mut mixer = self.lock();
        if mixer.buffer_in_use(buffer) {
            mixer.fail(DriverError::InvalidOperation(format!("buffer {} is in use", buffer)));
            return;
        }
        if mixer.buffers.remove(&buffer).is_none() {
            mixer.fail(DriverError::InvalidBuffer(buffer));
        }
    }

    fn buffer_data(&mut self, buffer: BufferId, format: PcmFormat, data: &[u8], sample_rate: u32) {
        let mut mixer = self.lock();
        if sample_rate == 0 {
            mixer.fail(DriverError::InvalidValue("sample rate must be positive".to_string()));
            return;
        }
        if mixer.buffer_in_use(buffer) {
            mixer.fail(DriverError::InvalidOperation(format!("buffer {} is in use", buffer)));
            return;
        }
        match mixer.buffers.get_mut(&buffer) {
            Some(slot) => {
                slot.format = format;
                slot.sample_rate = sample_rate;
                slot.data.clear();
                slot.data.extend_from_slice(data);
            }
            None => mixer.fail(DriverError::InvalidBuffer(buffer)),
        }
    }

    fn set_static_buffer(&mut self, voice: VoiceId, buffer: Option<BufferId>) {
        let mut mixer = self.lock();
        if let Some(id) = buffer {
            if !mixer.buffers.contains_key(&id) {
                mixer.fail(DriverError::InvalidBuffer(id));
                return;
            }
        }
        let Some(v) = mixer.voice_mut(voice) else { return };
        if v.holds_slot() {
            mixer.fail(DriverError::InvalidOperation(
                "cannot change the buffer of an active voice".to_string(),
            ));
            return;
        }
        v.static_buffer = buffer;
        v.queue.clear();
        v.processed = 0;
        v.cursor = 0.0;
    }

    fn queue_buffers(&mut self, voice: VoiceId, buffers: &[BufferId]) {
        let mut mixer = self.lock();
        if let Some(missing) = buffers.iter().copied().find(|id| !mixer.buffers.contains_key(id)) {
            mixer.fail(DriverError::InvalidBuffer(missing));
            return;
        }
        let Some(v) = mixer.voice_mut(voice) else { return };
        if v.static_buffer.is_some() {
            mixer.fail(DriverError::InvalidOperation(
                "cannot queue on a voice with a static buffer".to_string(),
            ));
            return;
        }
        v.queue.extend(buffers.iter().copied());
    }

    fn unqueue_buffers(&mut self, voice: VoiceId, count: usize) -> Vec<BufferId> {
        let mut mixer = self.lock();
        let Some(v) = mixer.voice_mut(voice) else { return Vec::new() };
        let available = if v.holds_slot() { v.processed } else { v.queue.len() };
        if count > available {
            mixer.fail(DriverError::InvalidValue(format!(
                "cannot unqueue {} buffer(s), {} available",
                count, available
            )));
            return Vec::new();
        }
        let removed: Vec<BufferId> = v.queue.drain(..count).collect();
        if count > v.processed {
            v.cursor = 0.0;
        }
        v.processed = v.processed.saturating_sub(count);
        removed
    }

    fn buffers_processed(&self, voice: VoiceId) -> usize {
        let mut mixer = self.lock();
        match mixer.voice_mut(voice) {
            Some(v) => v.processed,
            None => 0,
        }
    }

    fn buffers_queued(&self, voice: VoiceId) -> usize {
        let mut mixer = self.lock();
        match mixer.voice_mut(voice) {
            Some(v) => v.queue.len(),
            None => 0,
        }
    }

    fn play(&mut self, voice: VoiceId) {
        let mut guard = self.lock();
        let mixer = &mut *guard;
        let limit = mixer.config.max_playing;
        let active = mixer
            .voices
            .iter()
            .filter(|(id, v)| **id != voice && v.holds_slot())
            .count();
        if !mixer.voices.contains_key(&voice) {
            mixer.fail(DriverError::InvalidVoice(voice));
            return;
        }
        let Some(v) = mixer.voices.get_mut(&voice) else { return };

        match v.state {
            VoiceState::Playing => {}
            VoiceState::Paused => v.state = VoiceState::Playing,
            VoiceState::Initial | VoiceState::Stopped => {
                if let Some(limit) = limit {
                    if active >= limit {
                        mixer.fail(DriverError::VoiceLimit { limit });
                        return;
                    }
                }
                v.processed = 0;
                v.state = VoiceState::Playing;

                // Nothing audible to play ends immediately
                let buffers = &mixer.buffers;
                let has_frames = |id: &BufferId| buffers.get(id).map_or(false, |b| b.frames() > 0);
                let has_data = match v.static_buffer {
                    Some(id) => has_frames(&id),
                    None => v.queue.iter().any(has_frames),
                };
                if !has_data {
                    v.finish();
                }
            }
        }
    }

    fn pause(&mut self, voice: VoiceId) {
        let mut mixer = self.lock();
        if let Some(v) = mixer.voice_mut(voice) {
            if v.state == VoiceState::Playing {
                v.state = VoiceState::Paused;
            }
        }
    }

    fn stop(&mut self, voice: VoiceId) {
        let mut mixer = self.lock();
        if let Some(v) = mixer.voice_mut(voice) {
            if v.state != VoiceState::Initial {
                v.finish();
            }
        }
    }

    fn state(&self, voice: VoiceId) -> VoiceState {
        let mut mixer = self.lock();
        match mixer.voice_mut(voice) {
            Some(v) => v.state,
            None => VoiceState::Initial,
        }
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) {
        let mut mixer = self.lock();
        if !gain.is_finite() || gain < 0.0 {
            mixer.fail(DriverError::InvalidValue(format!("gain {}", gain)));
            return;
        }
        if let Some(v) = mixer.voice_mut(voice) {
            v.gain = gain;
        }
    }

    fn gain(&self, voice: VoiceId) -> f32 {
        let mut mixer = self.lock();
        mixer.voice_mut(voice).map(|v| v.gain).unwrap_or(0.0)
    }

    fn set_pitch(&mut self, voice: VoiceId, pitch: f32) {
        let mut mixer = self.lock();
        if !pitch.is_finite() || pitch <= 0.0 {
            mixer.fail(DriverError::InvalidValue(format!("pitch {}", pitch)));
            return;
        }
        if let Some(v) = mixer.voice_mut(voice) {
            v.pitch = pitch;
        }
    }

    fn pitch(&self, voice: VoiceId) -> f32 {
        let mut mixer = self.lock();
        mixer.voice_mut(voice).map(|v| v.pitch).unwrap_or(1.0)
    }

    fn set_looping(&mut self, voice: VoiceId, looping: bool) {
        let mut mixer = self.lock();
        if let Some(v) = mixer.voice_mut(voice) {
            v.looping = looping;
        }
    }

    fn is_looping(&self, voice: VoiceId) -> bool {
        let mut mixer = self.lock();
        mixer.voice_mut(voice).map(|v| v.looping).unwrap_or(false)
    }

    fn byte_offset(&self, voice: VoiceId) -> u64 {
        let mut mixer = self.lock();
        if mixer.voice_mut(voice).is_none() {
            return 0;
        }
        let mixer = &*mixer;
        mixer.voices.get(&voice).map(|v| mixer.byte_offset(v)).unwrap_or(0)
    }

    fn set_byte_offset(&mut self, voice: VoiceId, offset: u64) {
        let mut guard = self.lock();
        let mixer = &mut *guard;
        if !mixer.voices.contains_key(&voice) {
            mixer.fail(DriverError::InvalidVoice(voice));
            return;
        }
        let Some(v) = mixer.voices.get_mut(&voice) else { return };

        let buffers = &mixer.buffers;
        let layout = |id: &BufferId| {
            buffers
                .get(id)
                .map(|b| (b.data.len() as u64, b.format.bytes_per_frame() as u64))
        };

        let target = match v.static_buffer {
            Some(id) => match layout(&id) {
                Some((len, bpf)) if offset < len || offset == 0 => Some((0, offset / bpf)),
                _ => None,
            },
            None => {
                let mut remaining = offset;
                let mut found = None;
                for (index, id) in v.queue.iter().enumerate() {
                    let Some((len, bpf)) = layout(id) else { break };
                    if remaining < len {
                        found = Some((index, remaining / bpf));
                        break;
                    }
                    remaining -= len;
                }
                found
            }
        };

        match target {
            Some((processed, frame)) => {
                v.processed = processed;
                v.cursor = frame as f64;
            }
            None => mixer.fail(DriverError::InvalidValue(format!(
                "byte offset {} out of range",
                offset
            ))),
        }
    }

    fn take_error(&mut self) -> Option<DriverError> {
        self.lock().error.take()
    }

    fn set_listener_gain(&mut self, gain: f32) {
        let mut mixer = self.lock();
        if !gain.is_finite() || gain < 0.0 {
            mixer.fail(DriverError::InvalidValue(format!("listener gain {}", gain)));
            return;
        }
        mixer.listener_gain = gain;
    }

    fn listener_gain(&self) -> f32 {
        self.lock().listener_gain
    }
}
