use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::audio::driver::VoiceId;

/// Environment variable that selects the log level
pub const LOG_LEVEL_ENV: &str = "VOICEPOOL_LOG_LEVEL";

const DEFAULT_MAX_EVENTS: usize = 1000;

/// Engine event kept in the history for debugging
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EngineEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventType {
    VoiceClaimed,
    VoiceReleased,
    PoolExhausted,
    PlaybackStarted,
    PlaybackPaused,
    PlaybackStopped,
    SeekOperation,
    BufferUnderrun,
    DecodeFault,
    DriverFault,
}

impl EngineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineEventType::VoiceClaimed => "VOICE_CLAIMED",
            EngineEventType::VoiceReleased => "VOICE_RELEASED",
            EngineEventType::PoolExhausted => "POOL_EXHAUSTED",
            EngineEventType::PlaybackStarted => "PLAYBACK_STARTED",
            EngineEventType::PlaybackPaused => "PLAYBACK_PAUSED",
            EngineEventType::PlaybackStopped => "PLAYBACK_STOPPED",
            EngineEventType::SeekOperation => "SEEK_OPERATION",
            EngineEventType::BufferUnderrun => "BUFFER_UNDERRUN",
            EngineEventType::DecodeFault => "DECODE_FAULT",
            EngineEventType::DriverFault => "DRIVER_FAULT",
        }
    }
}

/// Bounded history of engine events, shared by the pool and its sources
#[derive(Clone)]
pub struct EngineLog {
    events: Arc<Mutex<VecDeque<EngineEvent>>>,
    max_events: usize,
}

impl Default for EngineLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(64)))),
            max_events: max_events.max(1),
        }
    }

    /// Initialize the global logger, reading the level from `VOICEPOOL_LOG_LEVEL`
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        builder.filter_level(parse_level(&log_level));
        builder.try_init()?;

        info!("voicepool logging initialized with level: {}", log_level);
        Ok(())
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<EngineEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an event and forward it to the `log` facade
    pub fn log_event(&self, event_type: EngineEventType, details: String, duration: Option<Duration>) {
        match event_type {
            EngineEventType::VoiceClaimed | EngineEventType::VoiceReleased => {
                trace!("[{}] {}", event_type.as_str(), details);
            }
            EngineEventType::PlaybackStarted
            | EngineEventType::PlaybackPaused
            | EngineEventType::PlaybackStopped => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
            EngineEventType::SeekOperation => {
                debug!("[{}] {} (took: {:?})", event_type.as_str(), details, duration);
            }
            EngineEventType::PoolExhausted | EngineEventType::BufferUnderrun => {
                warn!("[{}] {}", event_type.as_str(), details);
            }
            EngineEventType::DecodeFault | EngineEventType::DriverFault => {
                error!("[{}] {}", event_type.as_str(), details);
            }
        }

        let mut events = self.history();
        events.push_back(EngineEvent {
            timestamp: Utc::now(),
            event_type,
            duration,
            details,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn log_voice_claimed(&self, voice: VoiceId, source_id: u64) {
        self.log_event(
            EngineEventType::VoiceClaimed,
            format!("Voice {} claimed by source #{}", voice, source_id),
            None,
        );
    }

    pub fn log_voice_released(&self, voice: VoiceId, source_id: u64) {
        self.log_event(
            EngineEventType::VoiceReleased,
            format!("Voice {} released by source #{}", voice, source_id),
            None,
        );
    }

    pub fn log_pool_exhausted(&self, source_id: u64, total: usize) {
        self.log_event(
            EngineEventType::PoolExhausted,
            format!("No free voice for source #{} (all {} voices claimed)", source_id, total),
            None,
        );
    }

    pub fn log_playback_started(&self, label: &str, format_info: &str) {
        self.log_event(
            EngineEventType::PlaybackStarted,
            format!("Started playing: {} ({})", label, format_info),
            None,
        );
    }

    pub fn log_playback_paused(&self, label: &str, position: Duration) {
        self.log_event(
            EngineEventType::PlaybackPaused,
            format!("{} paused at {:.3}s", label, position.as_secs_f64()),
            None,
        );
    }

    pub fn log_playback_stopped(&self, label: &str, reason: &str) {
        self.log_event(
            EngineEventType::PlaybackStopped,
            format!("{} stopped: {}", label, reason),
            None,
        );
    }

    pub fn log_seek_operation(&self, label: &str, target: Duration, seek_time: Duration) {
        self.log_event(
            EngineEventType::SeekOperation,
            format!("{} seek to {:.3}s", label, target.as_secs_f64()),
            Some(seek_time),
        );
    }

    pub fn log_buffer_underrun(&self, label: &str, queued: usize) {
        self.log_event(
            EngineEventType::BufferUnderrun,
            format!("{} starved, restarting with {} buffer(s) queued", label, queued),
            None,
        );
    }

    pub fn log_decode_fault(&self, label: &str, error: &str) {
        self.log_event(
            EngineEventType::DecodeFault,
            format!("Decode fault in {}: {}", label, error),
            None,
        );
    }

    pub fn log_driver_fault(&self, context: &str, error: &str) {
        self.log_event(
            EngineEventType::DriverFault,
            format!("Driver fault during {}: {}", context, error),
            None,
        );
    }

    /// Most recent events, oldest first
    pub fn recent_events(&self, count: usize) -> Vec<EngineEvent> {
        let events = self.history();
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn clear_events(&self) {
        self.history().clear();
    }

    pub fn statistics(&self) -> EventStatistics {
        let events = self.history();
        let mut stats = EventStatistics::default();

        for event in events.iter() {
            match event.event_type {
                EngineEventType::VoiceClaimed => stats.voices_claimed += 1,
                EngineEventType::PoolExhausted => stats.pool_exhaustions += 1,
                EngineEventType::BufferUnderrun => stats.buffer_underruns += 1,
                EngineEventType::DecodeFault => stats.decode_faults += 1,
                EngineEventType::DriverFault => stats.driver_faults += 1,
                EngineEventType::SeekOperation => stats.seek_operations += 1,
                _ => {}
            }
        }

        stats.total_events = events.len();
        stats
    }
}

fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Counts of notable events in the current history window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStatistics {
    pub total_events: usize,
    pub voices_claimed: usize,
    pub pool_exhaustions: usize,
    pub buffer_underruns: usize,
    pub decode_faults: usize,
    pub driver_faults: usize,
    pub seek_operations: usize,
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: String) -> Self {
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        trace!(
            "Completed operation '{}' in {}ms",
            self.operation_name,
            duration.as_millis()
        );
        duration
    }

    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let duration = self.elapsed();
        if duration > threshold {
            warn!(
                "Operation '{}' took {}ms (threshold: {}ms)",
                self.operation_name,
                duration.as_millis(),
                threshold.as_millis()
            );
        } else {
            trace!(
                "Completed operation '{}' in {}ms",
                self.operation_name,
                duration.as_millis()
            );
        }
        duration
    }
}

/// Macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($name:expr, $code:block) => {{
        let timer = $crate::logging::OperationTimer::new($name.to_string());
        let result = $code;
        let _duration = timer.finish();
        result
    }};
}

/// Macro for timing operations with threshold warnings
#[macro_export]
macro_rules! time_operation_with_threshold {
    ($name:expr, $threshold:expr, $code:block) => {{
        let timer = $crate::logging::OperationTimer::new($name.to_string());
        let result = $code;
        let _duration = timer.finish_with_threshold($threshold);
        result
    }};
}
