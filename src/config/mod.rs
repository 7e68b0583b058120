use std::fs;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

/// Firmware defaults: 32 KiB ring, 2 KiB reads, 44 byte WAV header.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 2048;
pub const DEFAULT_HEADER_SIZE: u64 = 44;
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    pub chunk_size: usize,
    pub header_size: u64,
    pub write_timeout_ms: u64,
    pub backoff_ms: u64,
    /// Consecutive short writes before the consumer is reported as stalled.
    pub stall_warn_after: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicyKind {
    Drop,
    Block,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CommandConfig {
    pub queue_depth: usize,
    pub send_policy: SendPolicyKind,
    pub send_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Upper bound on one blocking receive, so shutdown is noticed.
    pub poll_ms: u64,
    /// How long a Play from Paused waits for the previous worker to finish.
    pub restart_grace_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub current_track: String,
    pub buffer: BufferConfig,
    pub reader: ReaderConfig,
    pub commands: CommandConfig,
    pub coordinator: CoordinatorConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("reading config '{}'", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("parsing config")?;
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("writing config '{}'", path))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.current_track.trim().is_empty() {
            return Err(ConfigError::message("current_track must not be empty"));
        }
        if self.buffer.capacity == 0 {
            return Err(ConfigError::message("buffer.capacity must be > 0"));
        }
        if self.reader.chunk_size == 0 {
            return Err(ConfigError::message("reader.chunk_size must be > 0"));
        }
        if self.reader.write_timeout_ms == 0 {
            return Err(ConfigError::message("reader.write_timeout_ms must be > 0"));
        }
        if self.reader.stall_warn_after == 0 {
            return Err(ConfigError::message("reader.stall_warn_after must be > 0"));
        }
        if self.commands.queue_depth == 0 {
            return Err(ConfigError::message("commands.queue_depth must be > 0"));
        }
        if self.coordinator.poll_ms == 0 {
            return Err(ConfigError::message("coordinator.poll_ms must be > 0"));
        }
        if self.output.sample_rate == 0 || self.output.channels == 0 {
            return Err(ConfigError::message(
                "output.sample_rate and output.channels must be > 0",
            ));
        }
        if self.output.bits_per_sample % 8 != 0 || self.output.bits_per_sample == 0 {
            return Err(ConfigError::message(format!(
                "output.bits_per_sample must be a non-zero multiple of 8 (got {})",
                self.output.bits_per_sample
            )));
        }
        Ok(())
    }
}

impl ReaderConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl CommandConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl CoordinatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }
}

impl OutputConfig {
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            current_track: "/sdcard/TEST_00.WAV".to_string(),
            buffer: BufferConfig::default(),
            reader: ReaderConfig::default(),
            commands: CommandConfig::default(),
            coordinator: CoordinatorConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            header_size: DEFAULT_HEADER_SIZE,
            write_timeout_ms: 100,
            backoff_ms: 10,
            stall_warn_after: 20,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            send_policy: SendPolicyKind::Drop,
            send_timeout_ms: 20,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_ms: 10,
            restart_grace_ms: 500,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer.capacity, 32 * 1024);
        assert_eq!(config.reader.chunk_size, 2048);
        assert_eq!(config.reader.header_size, 44);
        assert_eq!(config.reader.write_timeout(), Duration::from_millis(100));
        assert_eq!(config.commands.queue_depth, 8);
        assert_eq!(config.output.bytes_per_second(), 176_400);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            current_track = "/sdcard/SONG.WAV"

            [buffer]
            capacity = 4096

            [commands]
            send_policy = "block"
            "#,
        )
        .unwrap();

        assert_eq!(config.current_track, "/sdcard/SONG.WAV");
        assert_eq!(config.buffer.capacity, 4096);
        assert_eq!(config.commands.send_policy, SendPolicyKind::Block);
        assert_eq!(config.reader, ReaderConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.buffer.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.bits_per_sample = 12;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bits_per_sample"));

        assert!(Config::from_toml("current_track = \"\"").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.toml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.reader.chunk_size = 4096;
        config.save(path).unwrap();

        assert_eq!(Config::load(path).unwrap(), config);
        assert!(Config::load("/nonexistent/player.toml").is_err());
    }
}
