use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::audio::buffer::BufferSet;
use crate::audio::decoders::Decoder;
use crate::audio::driver::{BufferId, VoiceDriver, VoiceId, VoiceState};
use crate::audio::offset::{align_to_frame, byte_offset_to_duration, duration_to_byte_offset};
use crate::audio::pool::{Pool, PoolState};
use crate::audio::stream::AudioStream;
use crate::audio::AudioDecoder;
use crate::error::{DecodeError, DriverError, EngineError, PoolError};
use crate::logging::EngineLog;
use crate::models::{AudioCodec, PcmFormat, PcmSpec, SourceKind, TransportState};
use crate::time_operation_with_threshold;

const STATIC_DECODE_WARN: Duration = Duration::from_millis(250);

/// One logical sound. Clones are handles to the same source.
///
/// A source holds a pool voice exactly while it is playing or paused.
/// Static sources decode their whole asset into a single driver buffer up
/// front; streaming sources keep the decoder open and feed a small ring of
/// buffers that the pool tops up on every tick.
#[derive(Clone)]
pub struct Source {
    shared: Arc<SourceShared>,
}

struct SourceShared {
    id: u64,
    pool: Pool,
    inner: Mutex<SourceInner>,
}

impl Drop for SourceShared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(buffer) = inner.static_buffer.take() {
            self.pool.orphan(buffer);
        }
    }
}

struct SourceInner {
    label: String,
    kind: SourceKind,
    codec: AudioCodec,
    spec: PcmSpec,
    format: PcmFormat,
    /// Kept open for streaming sources only
    decoder: Option<Decoder>,
    static_buffer: Option<BufferId>,
    static_len: u64,
    /// Static start position applied when a voice is next bound
    pending_offset: u64,
    buffers: BufferSet,
    voice: Option<VoiceId>,
    state: TransportState,
    gain: f32,
    pitch: f32,
    looping: bool,
    /// Bytes played by buffers already unqueued, counted from the seek origin
    cumulative: u64,
    /// Decoder position in bytes
    decoded: u64,
    /// Decoded length of the asset, exact once the decoder has hit the end
    loop_len: Option<u64>,
    exhausted: bool,
    faulted: bool,
}

impl Source {
    /// Open `path` with the decoder matching its extension
    pub fn new(pool: &Pool, path: impl AsRef<Path>, kind: SourceKind) -> Result<Self, EngineError> {
        let path = path.as_ref();
        if !pool.is_alive() {
            return Err(PoolError::ShutDown.into());
        }
        let decoder = Decoder::open(path, &pool.decode_options())?;
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::with_decoder(pool, decoder, kind, label)
    }

    /// Decode an application-provided stream as `codec`
    pub fn from_stream(
        pool: &Pool,
        stream: Box<dyn AudioStream>,
        codec: AudioCodec,
        kind: SourceKind,
    ) -> Result<Self, EngineError> {
        if !pool.is_alive() {
            return Err(PoolError::ShutDown.into());
        }
        let decoder = Decoder::from_stream(stream, codec, &pool.decode_options())?;
        Self::with_decoder(pool, decoder, kind, format!("{} stream", codec.name()))
    }

    fn with_decoder(
        pool: &Pool,
        mut decoder: Decoder,
        kind: SourceKind,
        label: String,
    ) -> Result<Self, EngineError> {
        let spec = decoder.spec();
        let format = spec.format().ok_or(DecodeError::UnsupportedLayout {
            channels: spec.channels,
            bit_depth: spec.bit_depth,
        })?;

        let mut inner = SourceInner {
            label,
            kind,
            codec: decoder.codec(),
            spec,
            format,
            decoder: None,
            static_buffer: None,
            static_len: 0,
            pending_offset: 0,
            buffers: BufferSet::new(),
            voice: None,
            state: TransportState::Initial,
            gain: 1.0,
            pitch: 1.0,
            looping: false,
            cumulative: 0,
            decoded: 0,
            loop_len: decoder.total_bytes(),
            exhausted: false,
            faulted: false,
        };

        match kind {
            SourceKind::Static => {
                let data = time_operation_with_threshold!(
                    format!("static decode of {}", inner.label),
                    STATIC_DECODE_WARN,
                    { decoder.get_data() }
                )?;

                let mut state = pool.lock();
                if !state.is_alive() {
                    return Err(PoolError::ShutDown.into());
                }
                let buffer = state.driver.create_buffer()?;
                state.driver.buffer_data(buffer, format, &data, spec.sample_rate);
                if let Some(err) = state.driver.take_error() {
                    state.driver.delete_buffer(buffer);
                    return Err(err.into());
                }
                state.register_static(buffer);

                debug!(
                    "Loaded {} into buffer {} ({} bytes, {})",
                    inner.label,
                    buffer,
                    data.len(),
                    spec.format_description()
                );
                inner.static_buffer = Some(buffer);
                inner.static_len = data.len() as u64;
                inner.loop_len = Some(data.len() as u64);
            }
            SourceKind::Stream => {
                debug!(
                    "Streaming {} ({}, {})",
                    inner.label,
                    inner.codec.name(),
                    spec.format_description()
                );
                inner.decoder = Some(decoder);
            }
        }

        Ok(Self {
            shared: Arc::new(SourceShared {
                id: pool.next_source_id(),
                pool: pool.clone(),
                inner: Mutex::new(inner),
            }),
        })
    }

    fn lock_inner(&self) -> MutexGuard<'_, SourceInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn events(&self) -> &EngineLog {
        self.shared.pool.events()
    }

    /// Run `f` with the pool lock held, unless the pool has shut down
    fn with_pool<T>(&self, f: impl FnOnce(&mut PoolState) -> T) -> Option<T> {
        let mut state = self.shared.pool.lock();
        if !state.is_alive() {
            return None;
        }
        Some(f(&mut *state))
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn label(&self) -> String {
        self.lock_inner().label.clone()
    }

    pub fn kind(&self) -> SourceKind {
        self.lock_inner().kind
    }

    pub fn codec(&self) -> AudioCodec {
        self.lock_inner().codec
    }

    pub fn spec(&self) -> PcmSpec {
        self.lock_inner().spec
    }

    /// Start or resume playback. Returns false when no voice could be
    /// obtained; the source is then left as it was.
    pub fn play(&self) -> bool {
        self.with_pool(|state| self.play_with(state)).unwrap_or(false)
    }

    pub fn pause(&self) {
        self.with_pool(|state| self.pause_with(state));
    }

    pub fn resume(&self) {
        self.with_pool(|state| self.resume_with(state));
    }

    /// Stop playback, rewind, and give the voice back to the pool
    pub fn stop(&self) {
        self.with_pool(|state| self.stop_with(state, "stopped"));
    }

    pub fn rewind(&self) -> bool {
        self.seek(Duration::ZERO)
    }

    /// Move the playback position. Returns false if the decoder cannot
    /// reach `position`, in which case playback is untouched.
    pub fn seek(&self, position: Duration) -> bool {
        let started = Instant::now();
        let offset = duration_to_byte_offset(position, &self.spec());
        let done = self
            .with_pool(|state| self.seek_bytes_with(state, offset))
            .unwrap_or(false);
        if done {
            self.events()
                .log_seek_operation(&self.label(), position, started.elapsed());
        }
        done
    }

    /// Current playback position
    pub fn tell(&self) -> Duration {
        let state = self.shared.pool.lock();
        let inner = self.lock_inner();
        let bytes = inner.position(state.driver.as_ref());
        byte_offset_to_duration(bytes, &inner.spec)
    }

    /// Length of the asset, if known
    pub fn duration(&self) -> Option<Duration> {
        let inner = self.lock_inner();
        inner
            .loop_len
            .map(|bytes| byte_offset_to_duration(bytes, &inner.spec))
    }

    pub fn volume(&self) -> f32 {
        self.lock_inner().gain
    }

    /// Set the gain, clamped to 0.0..=1.0
    pub fn set_volume(&self, volume: f32) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        let applied = self.with_pool(|state| {
            let mut inner = self.lock_inner();
            inner.gain = volume;
            if let Some(voice) = inner.voice {
                state.driver.set_gain(voice, volume);
            }
        });
        if applied.is_none() {
            self.lock_inner().gain = volume;
        }
    }

    pub fn pitch(&self) -> f32 {
        self.lock_inner().pitch
    }

    /// Set the playback rate multiplier. Non-positive values are ignored.
    pub fn set_pitch(&self, pitch: f32) {
        if !(pitch.is_finite() && pitch > 0.0) {
            debug!("Ignoring pitch {}", pitch);
            return;
        }
        let applied = self.with_pool(|state| {
            let mut inner = self.lock_inner();
            inner.pitch = pitch;
            if let Some(voice) = inner.voice {
                state.driver.set_pitch(voice, pitch);
            }
        });
        if applied.is_none() {
            self.lock_inner().pitch = pitch;
        }
    }

    pub fn is_looping(&self) -> bool {
        self.lock_inner().looping
    }

    pub fn set_looping(&self, looping: bool) {
        let applied = self.with_pool(|state| {
            let mut inner = self.lock_inner();
            inner.set_looping(looping);
            if let (SourceKind::Static, Some(voice)) = (inner.kind, inner.voice) {
                state.driver.set_looping(voice, looping);
            }
        });
        if applied.is_none() {
            self.lock_inner().set_looping(looping);
        }
    }

    pub fn state(&self) -> TransportState {
        self.lock_inner().state
    }

    /// A static voice that ran off its end counts as stopped, even before
    /// the next tick reaps it
    pub fn is_playing(&self) -> bool {
        self.with_pool(|state| {
            let inner = self.lock_inner();
            inner.state == TransportState::Playing && !inner.ran_out(state.driver.as_ref())
        })
        .unwrap_or_else(|| self.state() == TransportState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        self.state() == TransportState::Paused
    }

    /// Initial sources count as stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self.state(), TransportState::Initial | TransportState::Stopped)
    }

    pub fn has_voice(&self) -> bool {
        self.lock_inner().voice.is_some()
    }

    /// Times a streaming voice ran dry and was restarted
    pub fn underruns(&self) -> u64 {
        self.lock_inner().buffers.underruns()
    }

    pub(crate) fn play_with(&self, state: &mut PoolState) -> bool {
        let events = self.events();
        let mut inner = self.lock_inner();
        if inner.state == TransportState::Playing && inner.ran_out(state.driver.as_ref()) {
            drop(inner);
            self.stop_with(state, "finished");
            inner = self.lock_inner();
        }
        match inner.state {
            TransportState::Playing => return true,
            TransportState::Paused => {
                inner.resume(state.driver.as_mut(), events);
                return true;
            }
            TransportState::Initial | TransportState::Stopped => {}
        }

        let Some(voice) = state.claim(self) else {
            events.log_pool_exhausted(self.id(), state.total());
            return false;
        };
        events.log_voice_claimed(voice, self.id());
        inner.voice = Some(voice);

        let stream_buffers = self.shared.pool.config().stream_buffers;
        match inner.start(state.driver.as_mut(), voice, stream_buffers, events) {
            Ok(()) => {
                inner.state = TransportState::Playing;
                let description = inner.spec.format_description();
                events.log_playback_started(&inner.label, &description);
                true
            }
            Err(err) => {
                match err {
                    DriverError::VoiceLimit { limit } => {
                        debug!("{} hit the driver limit of {} playing voices", inner.label, limit);
                    }
                    other => events.log_driver_fault(&inner.label, &other.to_string()),
                }
                inner.detach(state.driver.as_mut(), voice);
                inner.voice = None;
                let _released = state.release(voice);
                events.log_voice_released(voice, self.id());
                false
            }
        }
    }

    pub(crate) fn pause_with(&self, state: &mut PoolState) {
        let events = self.events();
        let mut inner = self.lock_inner();
        if inner.state != TransportState::Playing {
            return;
        }
        if let Some(voice) = inner.voice {
            state.driver.pause(voice);
        }
        inner.state = TransportState::Paused;
        let position = byte_offset_to_duration(inner.position(state.driver.as_ref()), &inner.spec);
        events.log_playback_paused(&inner.label, position);
    }

    pub(crate) fn resume_with(&self, state: &mut PoolState) {
        let events = self.events();
        self.lock_inner().resume(state.driver.as_mut(), events);
    }

    pub(crate) fn stop_with(&self, state: &mut PoolState, reason: &str) {
        let events = self.events();
        let mut inner = self.lock_inner();
        let Some(voice) = inner.voice.take() else {
            return;
        };

        inner.detach(state.driver.as_mut(), voice);
        let _released = state.release(voice);
        events.log_voice_released(voice, self.id());

        inner.reset_position();
        inner.state = TransportState::Stopped;
        events.log_playback_stopped(&inner.label, reason);
    }

    pub(crate) fn seek_bytes_with(&self, state: &mut PoolState, offset: u64) -> bool {
        let events = self.events();
        self.lock_inner().seek(state.driver.as_mut(), offset, events)
    }

    /// Top up the voice; false once playback has ended
    pub(crate) fn update_with(&self, state: &mut PoolState) -> bool {
        let events = self.events();
        self.lock_inner().update(state.driver.as_mut(), events)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("Source")
            .field("id", &self.shared.id)
            .field("label", &inner.label)
            .field("kind", &inner.kind)
            .field("state", &inner.state)
            .field("voice", &inner.voice)
            .finish()
    }
}

impl SourceInner {
    /// Configure a freshly claimed voice and start it
    fn start(
        &mut self,
        driver: &mut dyn VoiceDriver,
        voice: VoiceId,
        stream_buffers: usize,
        events: &EngineLog,
    ) -> Result<(), DriverError> {
        let _ = driver.take_error();

        // A voice keeps the settings of its previous owner
        driver.set_gain(voice, self.gain);
        driver.set_pitch(voice, self.pitch);
        driver.set_looping(voice, self.kind == SourceKind::Static && self.looping);

        match self.kind {
            SourceKind::Static => {
                driver.set_static_buffer(voice, self.static_buffer);
                if self.pending_offset > 0 {
                    driver.set_byte_offset(voice, self.pending_offset);
                }
                self.pending_offset = 0;
            }
            SourceKind::Stream => {
                self.buffers.allocate(driver, stream_buffers)?;
                self.fill_spares(driver, voice, events);
            }
        }

        if let Some(err) = driver.take_error() {
            return Err(err);
        }
        driver.play(voice);
        match driver.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stop the voice and take this source's buffers off it
    fn detach(&mut self, driver: &mut dyn VoiceDriver, voice: VoiceId) {
        driver.stop(voice);
        match self.kind {
            SourceKind::Static => driver.set_static_buffer(voice, None),
            SourceKind::Stream => {
                let queued = driver.buffers_queued(voice);
                if queued > 0 {
                    driver.unqueue_buffers(voice, queued);
                }
                self.buffers.release_all(driver);
            }
        }
        if let Some(err) = driver.take_error() {
            debug!("Driver error while detaching {}: {}", self.label, err);
        }
    }

    fn resume(&mut self, driver: &mut dyn VoiceDriver, events: &EngineLog) {
        if self.state != TransportState::Paused {
            return;
        }
        let Some(voice) = self.voice else { return };
        driver.play(voice);
        if let Some(err) = driver.take_error() {
            events.log_driver_fault(&self.label, &err.to_string());
        }
        self.state = TransportState::Playing;
    }

    /// The driver finished a static voice the scheduler has not reaped yet
    fn ran_out(&self, driver: &dyn VoiceDriver) -> bool {
        match (self.kind, self.voice) {
            (SourceKind::Static, Some(voice)) => driver.state(voice) == VoiceState::Stopped,
            _ => false,
        }
    }

    fn reset_position(&mut self) {
        self.cumulative = 0;
        self.pending_offset = 0;
        if let Some(decoder) = self.decoder.as_mut() {
            let rewound = decoder.rewind();
            if !rewound {
                warn!("{} could not be rewound", self.label);
            }
            self.decoded = 0;
            self.exhausted = !rewound;
            self.faulted = false;
        }
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        if looping && !self.faulted {
            self.exhausted = false;
        }
    }

    fn seek(&mut self, driver: &mut dyn VoiceDriver, offset: u64, events: &EngineLog) -> bool {
        let offset = align_to_frame(offset, &self.spec);
        match self.kind {
            SourceKind::Static => {
                if offset > 0 && offset >= self.static_len {
                    return false;
                }
                match self.voice {
                    Some(voice) => {
                        let _ = driver.take_error();
                        driver.set_byte_offset(voice, offset);
                        if let Some(err) = driver.take_error() {
                            debug!("Seek of {} rejected: {}", self.label, err);
                            return false;
                        }
                    }
                    None => self.pending_offset = offset,
                }
                true
            }
            SourceKind::Stream => {
                let Some(decoder) = self.decoder.as_mut() else {
                    return false;
                };
                // Forward-only decoders can still go back to the start
                let moved = if offset == 0 {
                    decoder.rewind()
                } else {
                    decoder.seek(offset)
                };
                if !moved {
                    return false;
                }
                self.decoded = offset;
                self.cumulative = offset;
                self.exhausted = false;
                self.faulted = false;

                if let Some(voice) = self.voice {
                    driver.stop(voice);
                    let queued = driver.buffers_queued(voice);
                    for buffer in driver.unqueue_buffers(voice, queued) {
                        self.buffers.park(buffer);
                    }
                    self.fill_spares(driver, voice, events);
                    if self.state == TransportState::Playing {
                        driver.play(voice);
                    }
                    if let Some(err) = driver.take_error() {
                        events.log_driver_fault(&self.label, &err.to_string());
                    }
                }
                true
            }
        }
    }

    fn update(&mut self, driver: &mut dyn VoiceDriver, events: &EngineLog) -> bool {
        let Some(voice) = self.voice else {
            return false;
        };
        if self.state == TransportState::Paused {
            return true;
        }

        match self.kind {
            SourceKind::Static => matches!(
                driver.state(voice),
                VoiceState::Playing | VoiceState::Paused
            ),
            SourceKind::Stream => {
                let processed = driver.buffers_processed(voice);
                for _ in 0..processed {
                    // Unqueueing rebases the voice offset; what it lost was played
                    let before = driver.byte_offset(voice);
                    let unqueued = driver.unqueue_buffers(voice, 1);
                    let after = driver.byte_offset(voice);
                    self.cumulative += before.saturating_sub(after);

                    let Some(&buffer) = unqueued.first() else { break };
                    if !self.exhausted && self.refill(driver, buffer, events) > 0 {
                        driver.queue_buffers(voice, &[buffer]);
                    } else {
                        self.buffers.park(buffer);
                    }
                }
                self.fill_spares(driver, voice, events);
                if self.faulted {
                    return false;
                }

                if driver.state(voice) == VoiceState::Stopped {
                    let queued = driver.buffers_queued(voice);
                    if queued == 0 {
                        return false;
                    }
                    self.buffers.record_underrun();
                    events.log_buffer_underrun(&self.label, queued);
                    driver.play(voice);
                }
                true
            }
        }
    }

    /// Queue as many spare buffers as the decoder can fill
    fn fill_spares(&mut self, driver: &mut dyn VoiceDriver, voice: VoiceId, events: &EngineLog) {
        while !self.exhausted {
            let Some(buffer) = self.buffers.take_spare() else { break };
            if self.refill(driver, buffer, events) > 0 {
                driver.queue_buffers(voice, &[buffer]);
            } else {
                self.buffers.park(buffer);
                break;
            }
        }
    }

    /// Decode the next chunk into `buffer`, rewinding once at the end of
    /// the stream when looping. Returns the bytes uploaded.
    fn refill(&mut self, driver: &mut dyn VoiceDriver, buffer: BufferId, events: &EngineLog) -> usize {
        let Some(decoder) = self.decoder.as_mut() else {
            return 0;
        };

        let mut rewound = false;
        loop {
            match decoder.decode() {
                Ok(0) => {
                    if self.decoded > 0 {
                        self.loop_len = Some(self.decoded);
                    }
                    if self.looping && !rewound {
                        if decoder.rewind() {
                            self.decoded = 0;
                            rewound = true;
                            continue;
                        }
                        warn!("{} cannot be rewound, ending loop", self.label);
                    }
                    self.exhausted = true;
                    return 0;
                }
                Ok(len) => {
                    driver.buffer_data(buffer, self.format, decoder.buffer(), self.spec.sample_rate);
                    self.decoded += len as u64;
                    return len;
                }
                Err(err) => {
                    events.log_decode_fault(&self.label, &err.to_string());
                    self.faulted = true;
                    self.exhausted = true;
                    self.looping = false;
                    return 0;
                }
            }
        }
    }

    /// Playback position in decoded bytes
    fn position(&self, driver: &dyn VoiceDriver) -> u64 {
        match self.kind {
            SourceKind::Static => match self.voice {
                Some(voice) => driver.byte_offset(voice),
                None => self.pending_offset,
            },
            SourceKind::Stream => {
                let played = self.cumulative + self.voice.map_or(0, |voice| driver.byte_offset(voice));
                match self.loop_len {
                    Some(len) if len > 0 && (self.looping || played > len) => played % len,
                    _ => played,
                }
            }
        }
    }
}
