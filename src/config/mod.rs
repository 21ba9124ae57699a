use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Engine configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on voices created at pool init
    pub max_voices: usize,
    /// Pool init fails when the driver yields fewer voices than this
    pub min_voices: usize,
    /// Driver buffers rotated by each streaming source
    pub stream_buffers: usize,
    /// Target size of one decoded chunk
    pub decode_chunk_bytes: usize,
    pub tick_interval_ms: u64,
    pub listener_gain: f32,
    pub output_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_voices: 64,
            min_voices: 4,
            stream_buffers: 8,
            decode_chunk_bytes: 128 * 1024,
            tick_interval_ms: 1000,
            listener_gain: 1.0,
            output_device: None,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_voices == 0 {
            return Err(invalid("max_voices", "must be at least 1"));
        }
        if self.min_voices > self.max_voices {
            return Err(invalid(
                "min_voices",
                format!("{} exceeds max_voices ({})", self.min_voices, self.max_voices),
            ));
        }
        if self.stream_buffers < 2 {
            return Err(invalid("stream_buffers", "at least 2 buffers are needed to stream"));
        }
        if self.decode_chunk_bytes < 4 {
            return Err(invalid("decode_chunk_bytes", "must hold at least one stereo frame"));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms", "must be greater than zero"));
        }
        if !self.listener_gain.is_finite() || self.listener_gain < 0.0 {
            return Err(invalid("listener_gain", "must be a non-negative number"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: EngineConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        let config = Self::load_config(&config_path).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable config {}: {}", config_path.display(), e);
            EngineConfig::default()
        });

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load from an explicit file instead of the per-user location
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self::load_config(&config_path)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut EngineConfig),
    {
        let mut candidate = self.config.clone();
        updater(&mut candidate);
        candidate.validate()?;
        self.config = candidate;
        self.save_config()
    }

    pub fn set_listener_gain(&mut self, gain: f32) -> Result<(), ConfigError> {
        self.update_config(|config| config.listener_gain = gain.clamp(0.0, 1.0))
    }

    pub fn set_output_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.update_config(|config| config.output_device = device)
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = EngineConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("voicepool");

        std::fs::create_dir_all(&config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
        if !path.exists() {
            return Ok(EngineConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&config_content)?;
        config.validate()?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config_manager = ConfigManager {
            config: EngineConfig::default(),
            config_path,
        };

        (config_manager, temp_dir)
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();

        assert_eq!(config.max_voices, 64);
        assert_eq!(config.min_voices, 4);
        assert_eq!(config.stream_buffers, 8);
        assert_eq!(config.decode_chunk_bytes, 131_072);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.listener_gain, 1.0);
        assert_eq!(config.output_device, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: Vec<(&str, Box<dyn Fn(&mut EngineConfig)>)> = vec![
            ("max_voices", Box::new(|c| c.max_voices = 0)),
            ("min_voices", Box::new(|c| c.min_voices = 65)),
            ("stream_buffers", Box::new(|c| c.stream_buffers = 1)),
            ("decode_chunk_bytes", Box::new(|c| c.decode_chunk_bytes = 2)),
            ("tick_interval_ms", Box::new(|c| c.tick_interval_ms = 0)),
            ("listener_gain", Box::new(|c| c.listener_gain = f32::NAN)),
        ];

        for (expected, mutate) in cases {
            let mut config = EngineConfig::default();
            mutate(&mut config);
            match config.validate() {
                Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("Expected InvalidValue for {}, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("max_voices = 16\nstream_buffers = 4\n").unwrap();

        assert_eq!(config.max_voices, 16);
        assert_eq!(config.stream_buffers, 4);
        assert_eq!(config.min_voices, 4);
        assert_eq!(config.tick_interval_ms, 1000);
    }

    #[test]
    fn test_save_and_load_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.max_voices = 32;
        config_manager.config.output_device = Some("Test Device".to_string());
        config_manager.save_config().unwrap();

        let loaded_config = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert_eq!(loaded_config.max_voices, 32);
        assert_eq!(loaded_config.output_device, Some("Test Device".to_string()));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().unwrap();
        let nonexistent_path = temp_dir.path().join("nonexistent.toml");

        let config = ConfigManager::load_config(&nonexistent_path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        fs::write(&config_path, "invalid toml content [[[").unwrap();

        match ConfigManager::load_config(&config_path) {
            Err(ConfigError::DeserializationError(_)) => {}
            other => panic!("Expected DeserializationError, got {:?}", other.map(|_| ())),
        }

        fs::write(&config_path, "min_voices = 100\n").unwrap();
        assert!(matches!(
            ConfigManager::load_config(&config_path),
            Err(ConfigError::InvalidValue { field: "min_voices", .. })
        ));
    }

    #[test]
    fn test_update_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager
            .update_config(|config| {
                config.tick_interval_ms = 20;
                config.decode_chunk_bytes = 4096;
            })
            .unwrap();

        let loaded_config = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert_eq!(loaded_config.tick_interval_ms, 20);
        assert_eq!(loaded_config.decode_chunk_bytes, 4096);
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        let result = config_manager.update_config(|config| config.stream_buffers = 0);
        assert!(result.is_err());
        assert_eq!(config_manager.config.stream_buffers, 8);
        assert!(!config_manager.config_path.exists());
    }

    #[test]
    fn test_set_listener_gain_clamps() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_listener_gain(0.7).unwrap();
        assert_eq!(config_manager.config.listener_gain, 0.7);

        config_manager.set_listener_gain(1.5).unwrap();
        assert_eq!(config_manager.config.listener_gain, 1.0);

        config_manager.set_listener_gain(-0.5).unwrap();
        assert_eq!(config_manager.config.listener_gain, 0.0);
    }

    #[test]
    fn test_set_output_device_and_reset() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_output_device(Some("My DAC".to_string())).unwrap();
        assert_eq!(config_manager.get_config().output_device, Some("My DAC".to_string()));

        config_manager.reset_to_defaults().unwrap();
        assert_eq!(config_manager.get_config(), &EngineConfig::default());
    }

    #[test]
    fn test_with_path_and_nested_save() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("config.toml");

        let mut config_manager = ConfigManager::with_path(nested_path.clone()).unwrap();
        config_manager.set_output_device(None).unwrap();

        assert!(nested_path.exists());
        assert_eq!(config_manager.config_path(), nested_path.as_path());
    }

    #[test]
    fn test_config_manager_new() {
        match ConfigManager::new() {
            Ok(config_manager) => {
                assert!(config_manager.config_path.to_string_lossy().contains("voicepool"));
                assert!(config_manager.config_path.to_string_lossy().ends_with("config.toml"));
            }
            Err(ConfigError::ConfigDirNotFound) | Err(ConfigError::IoError(_)) => {
                // No usable home directory in this environment
            }
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }
}
