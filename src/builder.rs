//! Builder for configuring and constructing a `LovelyInstrument`.

use crate::{LovelyInstrument, Result};
use lovely_host::{HostConfig, Registry};
use std::sync::Arc;

/// Builder for a [`LovelyInstrument`].
///
/// # Example
///
/// ```ignore
/// use lovely::prelude::*;
///
/// let instrument = LovelyInstrument::builder()
///     .sample_rate(48000.0)
///     .block_size(512)
///     .build()?;
/// instrument.load_plugin("http://example.org/synth")?;
/// ```
#[derive(Default)]
pub struct LovelyInstrumentBuilder {
    registry: Option<Arc<Registry>>,
    config: HostConfig,
}

impl LovelyInstrumentBuilder {
    /// Default: the process-wide registry.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 44100
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config = self.config.with_sample_rate(sample_rate);
        self
    }

    /// Default: 256
    pub fn block_size(mut self, frames: usize) -> Self {
        self.config = self.config.with_block_size(frames);
        self
    }

    /// Default: 4096
    pub fn sequence_capacity(mut self, bytes: usize) -> Self {
        self.config = self.config.with_sequence_capacity(bytes);
        self
    }

    /// Default: 63
    pub fn base_velocity(mut self, velocity: u8) -> Self {
        self.config = self.config.with_base_velocity(velocity);
        self
    }

    pub fn build(self) -> Result<LovelyInstrument> {
        self.config.validate()?;
        let registry = self.registry.unwrap_or_else(lovely_host::registry);
        Ok(LovelyInstrument::new(registry, self.config))
    }
}
