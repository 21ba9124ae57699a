use std::path::Path;

use log::info;

use crate::audio::driver::VoiceDriver;
use crate::audio::pool::Pool;
use crate::audio::scheduler::Scheduler;
use crate::audio::source::Source;
use crate::audio::stream::AudioStream;
use crate::config::EngineConfig;
use crate::error::{EngineError, PoolError};
use crate::models::{AudioCodec, SourceKind};

/// A voice pool plus the scheduler that services it.
///
/// Create one per output driver and pass it to whatever needs to load
/// sounds. `shutdown` (or dropping the engine) stops all playback and
/// frees every driver resource.
pub struct AudioEngine {
    pool: Pool,
    scheduler: Scheduler,
}

impl AudioEngine {
    pub fn new(driver: Box<dyn VoiceDriver>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let pool = Pool::init(driver, &config)?;
        pool.set_listener_gain(config.listener_gain);

        let scheduler = match Scheduler::spawn(pool.clone(), config.tick_interval()) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                pool.shutdown();
                return Err(e.into());
            }
        };

        info!(
            "Audio engine ready: {} voices, {} ms tick",
            pool.total_voices(),
            config.tick_interval_ms
        );
        Ok(Self { pool, scheduler })
    }

    /// Load a file as a static or streaming source
    pub fn load(&self, path: impl AsRef<Path>, kind: SourceKind) -> Result<Source, EngineError> {
        Source::new(&self.pool, path, kind)
    }

    pub fn load_stream(
        &self,
        stream: Box<dyn AudioStream>,
        codec: AudioCodec,
        kind: SourceKind,
    ) -> Result<Source, EngineError> {
        Source::from_stream(&self.pool, stream, codec, kind)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_alive()
    }

    /// Stop the scheduler, then the pool. Idempotent.
    pub fn shutdown(&mut self) {
        if !self.pool.is_alive() && !self.scheduler.is_running() {
            return;
        }
        self.scheduler.shutdown();
        self.pool.shutdown();
        info!("Audio engine shut down");
    }

    /// Fail with `ShutDown` once the engine has been shut down
    pub fn ensure_running(&self) -> Result<(), EngineError> {
        if self.pool.is_alive() {
            Ok(())
        } else {
            Err(PoolError::ShutDown.into())
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
