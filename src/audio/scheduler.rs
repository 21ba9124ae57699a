use std::io;
use std::thread;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use crate::audio::pool::Pool;

/// Background task that ticks the pool at a fixed period.
///
/// Runs on its own thread with a current-thread tokio runtime. `shutdown`
/// signals the task and joins the thread, so no tick can start after it
/// returns.
pub struct Scheduler {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
    period: Duration,
}

impl Scheduler {
    pub fn spawn(pool: Pool, period: Duration) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = thread::Builder::new()
            .name("audio-scheduler".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut interval = tokio::time::interval(period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    // The first tick completes immediately
                    interval.tick().await;

                    loop {
                        tokio::select! {
                            _ = &mut shutdown_rx => break,
                            _ = interval.tick() => pool.tick(),
                        }
                    }
                });
                debug!("Scheduler thread exiting");
            })?;

        info!("Scheduler started with a {} ms period", period.as_millis());
        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Stop ticking and wait for the thread to exit. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::{test_pool, write_wav};
    use crate::audio::Source;
    use crate::models::SourceKind;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn test_shutdown_joins_thread() {
        let (pool, _driver) = test_pool(4);
        let mut scheduler = Scheduler::spawn(pool, Duration::from_millis(5)).unwrap();
        assert!(scheduler.is_running());
        assert_eq!(scheduler.period(), Duration::from_millis(5));

        scheduler.shutdown();
        assert!(!scheduler.is_running());
        scheduler.shutdown();
    }

    #[test]
    fn test_ticks_release_finished_sources() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "empty.wav", 8000, 1, 16, 0);
        let (pool, _driver) = test_pool(4);

        let source = Source::new(&pool, &path, SourceKind::Static).unwrap();
        assert!(source.play());
        assert_eq!(pool.claimed_voices(), 1);

        let mut scheduler = Scheduler::spawn(pool.clone(), Duration::from_millis(5)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.claimed_voices() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        scheduler.shutdown();

        assert_eq!(pool.claimed_voices(), 0);
        assert!(source.is_stopped());
    }

    #[test]
    fn test_no_tick_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "empty.wav", 8000, 1, 16, 0);
        let (pool, _driver) = test_pool(4);

        let mut scheduler = Scheduler::spawn(pool.clone(), Duration::from_millis(5)).unwrap();
        scheduler.shutdown();

        let source = Source::new(&pool, &path, SourceKind::Static).unwrap();
        assert!(source.play());
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(pool.claimed_voices(), 1);
    }
}
