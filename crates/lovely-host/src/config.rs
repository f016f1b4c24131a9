//! Host configuration.

use crate::{HostError, Result};
use serde::Deserialize;

/// Largest base velocity the raw MIDI path accepts.
pub const MAX_BASE_VELOCITY: u8 = 127;

/// Configuration shared by every plugin instance the host creates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub sample_rate: f64,
    /// Initial audio buffer length in frames. Buffers grow past this on demand.
    pub block_size: usize,
    /// Body capacity of each event port buffer in bytes.
    pub sequence_capacity: usize,
    /// Velocity scale for plugins that only understand MIDI.
    pub base_velocity: u8,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            block_size: 256,
            sequence_capacity: 4096,
            base_velocity: 63,
        }
    }
}

impl HostConfig {
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_block_size(mut self, frames: usize) -> Self {
        self.block_size = frames;
        self
    }

    pub fn with_sequence_capacity(mut self, bytes: usize) -> Self {
        self.sequence_capacity = bytes;
        self
    }

    pub fn with_base_velocity(mut self, velocity: u8) -> Self {
        self.base_velocity = velocity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000.0 || self.sample_rate > 384000.0 {
            return Err(HostError::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.block_size == 0 || self.block_size > 8192 {
            return Err(HostError::InvalidConfig(format!(
                "block_size {} out of range (1-8192 frames)",
                self.block_size
            )));
        }
        if self.sequence_capacity < 64 {
            return Err(HostError::InvalidConfig(format!(
                "sequence_capacity {} too small (at least 64 bytes)",
                self.sequence_capacity
            )));
        }
        if self.base_velocity > MAX_BASE_VELOCITY {
            return Err(HostError::InvalidConfig(format!(
                "base_velocity {} out of range (0-127)",
                self.base_velocity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.block_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(HostConfig::default()
            .with_sample_rate(1000.0)
            .validate()
            .is_err());
        assert!(HostConfig::default().with_block_size(0).validate().is_err());
        assert!(HostConfig::default()
            .with_sequence_capacity(16)
            .validate()
            .is_err());
        assert!(HostConfig::default()
            .with_base_velocity(200)
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: HostConfig = serde_json::from_str(r#"{"sample_rate":48000.0}"#).unwrap();
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.sequence_capacity, 4096);
        assert_eq!(config.base_velocity, 63);
    }
}
