use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::audio::decoders::DecodeOptions;
use crate::audio::driver::{BufferId, VoiceDriver, VoiceId};
use crate::audio::source::Source;
use crate::config::EngineConfig;
use crate::error::PoolError;
use crate::logging::EngineLog;
use crate::time_operation_with_threshold;

const TICK_WARN_THRESHOLD: Duration = Duration::from_millis(50);

/// Everything guarded by the pool mutex. The driver lives here so it can
/// only be reached with the lock held.
pub(crate) struct PoolState {
    pub(crate) driver: Box<dyn VoiceDriver>,
    free: Vec<VoiceId>,
    claimed: HashMap<VoiceId, Source>,
    /// Buffers of live static sources, deleted on shutdown
    static_buffers: HashSet<BufferId>,
    total: usize,
    alive: bool,
}

impl PoolState {
    pub(crate) fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn claim(&mut self, source: &Source) -> Option<VoiceId> {
        let voice = self.free.pop()?;
        self.claimed.insert(voice, source.clone());
        Some(voice)
    }

    /// Return a voice to the free set. The claiming source, if still mapped,
    /// is handed back so the caller controls when it drops.
    pub(crate) fn release(&mut self, voice: VoiceId) -> Option<Source> {
        let source = self.claimed.remove(&voice);
        self.free.push(voice);
        source
    }

    pub(crate) fn register_static(&mut self, buffer: BufferId) {
        self.static_buffers.insert(buffer);
    }

    fn delete_static(&mut self, buffer: BufferId) {
        if self.static_buffers.remove(&buffer) {
            self.driver.delete_buffer(buffer);
        }
    }
}

struct PoolShared {
    state: Mutex<PoolState>,
    /// Buffers of dropped static sources, deleted on the next tick
    orphans: Mutex<Vec<BufferId>>,
    events: EngineLog,
    config: EngineConfig,
    next_source_id: AtomicU64,
}

/// Fixed-capacity allocator of driver voices.
///
/// Cloning yields another handle to the same pool. Sources claim a voice on
/// `play` and give it back when they stop; `tick` services every source that
/// currently holds one.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Ask the driver for up to `max_voices` voices
    pub fn init(mut driver: Box<dyn VoiceDriver>, config: &EngineConfig) -> Result<Self, PoolError> {
        let mut free = Vec::with_capacity(config.max_voices);
        while free.len() < config.max_voices {
            match driver.create_voice() {
                Ok(voice) => free.push(voice),
                Err(e) => {
                    debug!("Voice allocation stopped after {} voices: {}", free.len(), e);
                    break;
                }
            }
        }

        if free.len() < config.min_voices {
            let created = free.len();
            for voice in free {
                driver.delete_voice(voice);
            }
            return Err(PoolError::InsufficientVoices {
                created,
                required: config.min_voices,
            });
        }
        if free.len() < config.max_voices {
            warn!(
                "Running with {} of {} requested voices",
                free.len(),
                config.max_voices
            );
        }

        // Hand out the lowest ids first
        free.reverse();
        let total = free.len();
        info!("Voice pool ready with {} voices", total);

        Ok(Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    driver,
                    free,
                    claimed: HashMap::with_capacity(total),
                    static_buffers: HashSet::new(),
                    total,
                    alive: true,
                }),
                orphans: Mutex::new(Vec::new()),
                events: EngineLog::new(),
                config: config.clone(),
                next_source_id: AtomicU64::new(1),
            }),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a static buffer for deletion. Safe to call while the pool
    /// lock is held.
    pub(crate) fn orphan(&self, buffer: BufferId) {
        self.shared
            .orphans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(buffer);
    }

    pub(crate) fn next_source_id(&self) -> u64 {
        self.shared.next_source_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            chunk_bytes: self.shared.config.decode_chunk_bytes,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Event history of this pool and its sources
    pub fn events(&self) -> &EngineLog {
        &self.shared.events
    }

    pub fn is_alive(&self) -> bool {
        self.lock().alive
    }

    pub fn total_voices(&self) -> usize {
        self.lock().total
    }

    pub fn free_voices(&self) -> usize {
        self.lock().free.len()
    }

    pub fn claimed_voices(&self) -> usize {
        self.lock().claimed.len()
    }

    /// Service every claimed source and reap orphaned buffers
    pub fn tick(&self) {
        let mut state = self.lock();
        if !state.alive {
            return;
        }

        time_operation_with_threshold!("pool tick", TICK_WARN_THRESHOLD, {
            let orphans = std::mem::take(
                &mut *self
                    .shared
                    .orphans
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            );
            for buffer in orphans {
                state.delete_static(buffer);
            }

            let sources: Vec<Source> = state.claimed.values().cloned().collect();
            for source in &sources {
                if !source.update_with(&mut state) {
                    source.stop_with(&mut state, "finished");
                }
            }

            if let Some(err) = state.driver.take_error() {
                self.shared.events.log_driver_fault("tick", &err.to_string());
            }
        })
    }

    /// Resume every paused source
    pub fn play_all(&self) {
        let mut state = self.lock();
        let sources: Vec<Source> = state.claimed.values().cloned().collect();
        for source in &sources {
            source.resume_with(&mut state);
        }
    }

    pub fn pause_all(&self) {
        let mut state = self.lock();
        let sources: Vec<Source> = state.claimed.values().cloned().collect();
        for source in &sources {
            source.pause_with(&mut state);
        }
    }

    pub fn rewind_all(&self) {
        let mut state = self.lock();
        let sources: Vec<Source> = state.claimed.values().cloned().collect();
        for source in &sources {
            source.seek_bytes_with(&mut state, 0);
        }
    }

    /// Stop every playing or paused source, releasing all voices
    pub fn stop_all(&self) {
        let mut state = self.lock();
        Self::stop_claimed(&mut state);
    }

    fn stop_claimed(state: &mut PoolState) {
        let claimed = std::mem::take(&mut state.claimed);
        for source in claimed.values() {
            source.stop_with(state, "stop_all");
        }
    }

    pub fn listener_gain(&self) -> f32 {
        self.lock().driver.listener_gain()
    }

    /// Set the master volume, clamped to 0.0..=1.0
    pub fn set_listener_gain(&self, gain: f32) {
        if !gain.is_finite() {
            return;
        }
        self.lock().driver.set_listener_gain(gain.clamp(0.0, 1.0));
    }

    /// Stop everything and free every driver resource. Later calls on the
    /// pool or its sources are no-ops.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if !state.alive {
            return;
        }

        Self::stop_claimed(&mut state);

        let voices: Vec<VoiceId> = state.free.drain(..).collect();
        for voice in voices {
            state.driver.delete_voice(voice);
        }
        let buffers: Vec<BufferId> = state.static_buffers.drain().collect();
        for buffer in buffers {
            state.driver.delete_buffer(buffer);
        }
        self.shared
            .orphans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();

        if let Some(err) = state.driver.take_error() {
            warn!("Driver reported an error during shutdown: {}", err);
        }
        state.total = 0;
        state.alive = false;
        info!("Voice pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::driver::{MixerConfig, SoftwareDriver};
    use crate::audio::tests::{test_pool, write_wav};
    use crate::models::{SourceKind, TransportState};
    use tempfile::TempDir;

    fn assert_partition(pool: &Pool) {
        assert_eq!(pool.free_voices() + pool.claimed_voices(), pool.total_voices());
    }

    #[test]
    fn test_init_caps_at_max_voices() {
        let (pool, driver) = test_pool(16);
        assert_eq!(pool.total_voices(), 16);
        assert_eq!(pool.free_voices(), 16);
        assert_eq!(driver.voice_count(), 16);
        assert!(pool.is_alive());
    }

    #[test]
    fn test_init_stops_at_driver_limit() {
        let driver = SoftwareDriver::new(MixerConfig {
            max_voices: 10,
            ..MixerConfig::default()
        });
        let pool = Pool::init(Box::new(driver.clone()), &EngineConfig::default()).unwrap();
        assert_eq!(pool.total_voices(), 10);
    }

    #[test]
    fn test_init_fails_below_minimum() {
        let driver = SoftwareDriver::new(MixerConfig {
            max_voices: 3,
            ..MixerConfig::default()
        });
        let result = Pool::init(Box::new(driver.clone()), &EngineConfig::default());
        assert!(matches!(
            result,
            Err(PoolError::InsufficientVoices {
                created: 3,
                required: 4
            })
        ));
        assert_eq!(driver.voice_count(), 0);
    }

    #[test]
    fn test_claim_and_release_keep_partition() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "tone.wav", 8000, 1, 16, 8000);
        let (pool, _driver) = test_pool(2);

        let a = Source::new(&pool, &path, SourceKind::Static).unwrap();
        let b = Source::new(&pool, &path, SourceKind::Static).unwrap();
        let c = Source::new(&pool, &path, SourceKind::Static).unwrap();

        assert!(a.play());
        assert_partition(&pool);
        assert!(b.play());
        assert_partition(&pool);
        assert!(!c.play());
        assert_eq!(c.state(), TransportState::Initial);
        assert!(!c.has_voice());
        assert_eq!(pool.events().statistics().pool_exhaustions, 1);

        a.stop();
        assert_partition(&pool);
        assert_eq!(pool.free_voices(), 1);
        assert!(c.play());
        assert_partition(&pool);
    }

    #[test]
    fn test_broadcasts() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "tone.wav", 8000, 1, 16, 8000);
        let (pool, _driver) = test_pool(4);

        let sources: Vec<Source> = (0..3)
            .map(|_| Source::new(&pool, &path, SourceKind::Stream).unwrap())
            .collect();
        for source in &sources {
            assert!(source.play());
        }

        pool.pause_all();
        assert!(sources.iter().all(|s| s.is_paused()));
        pool.play_all();
        assert!(sources.iter().all(|s| s.is_playing()));
        pool.rewind_all();
        assert!(sources.iter().all(|s| s.tell() == Duration::ZERO));

        pool.stop_all();
        assert!(sources.iter().all(|s| s.is_stopped() && !s.has_voice()));
        assert_eq!(pool.claimed_voices(), 0);
        assert_eq!(pool.free_voices(), 4);
    }

    #[test]
    fn test_listener_gain_is_clamped() {
        let (pool, driver) = test_pool(4);
        pool.set_listener_gain(0.25);
        assert_eq!(pool.listener_gain(), 0.25);
        assert_eq!(driver.listener_gain(), 0.25);

        pool.set_listener_gain(4.0);
        assert_eq!(pool.listener_gain(), 1.0);
        pool.set_listener_gain(f32::NAN);
        assert_eq!(pool.listener_gain(), 1.0);
    }

    #[test]
    fn test_dropped_static_buffer_is_reaped_on_tick() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "tone.wav", 8000, 1, 16, 800);
        let (pool, driver) = test_pool(4);

        let source = Source::new(&pool, &path, SourceKind::Static).unwrap();
        assert_eq!(driver.buffer_count(), 1);
        drop(source);
        assert_eq!(driver.buffer_count(), 1);

        pool.tick();
        assert_eq!(driver.buffer_count(), 0);
    }

    #[test]
    fn test_shutdown_frees_everything() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "tone.wav", 8000, 1, 16, 8000);
        let (pool, driver) = test_pool(4);

        let fixed = Source::new(&pool, &path, SourceKind::Static).unwrap();
        let streamed = Source::new(&pool, &path, SourceKind::Stream).unwrap();
        assert!(fixed.play());
        assert!(streamed.play());

        pool.shutdown();
        assert!(!pool.is_alive());
        assert!(fixed.is_stopped());
        assert!(streamed.is_stopped());
        assert_eq!(driver.voice_count(), 0);
        assert_eq!(driver.buffer_count(), 0);

        // Everything after shutdown is inert
        pool.tick();
        pool.shutdown();
        assert!(!fixed.play());
        assert!(matches!(
            Source::new(&pool, &path, SourceKind::Stream),
            Err(crate::error::EngineError::Pool(PoolError::ShutDown))
        ));
    }
}
