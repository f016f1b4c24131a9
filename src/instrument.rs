//! The host-facing instrument: one LV2 plugin behind a note and audio API.

use crate::{Error, LovelyInstrumentBuilder, Result};
use lovely_host::{
    HostConfig, HostError, InstanceSlot, PluginDescriptor, Preset, Registry, VoiceId, VoiceParams,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Saved form of an instrument, as stored in a project file.
///
/// Older projects keep the state blob in a CDATA child instead of an
/// attribute; both are accepted on load, and saving always writes the
/// attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_cdata: Option<String>,
}

impl InstrumentSettings {
    /// The state blob, preferring the attribute form.
    pub fn state(&self) -> Option<&str> {
        self.state
            .as_deref()
            .or(self.state_cdata.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// An instrument slot hosting one LV2 plugin at a time.
///
/// `play` is called from the audio thread; everything else from the control
/// thread. Both may run concurrently: a block that overlaps a plugin swap
/// renders silence.
pub struct LovelyInstrument {
    registry: Arc<Registry>,
    config: HostConfig,
    base_velocity: AtomicU8,
    slot: InstanceSlot,
}

impl std::fmt::Debug for LovelyInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LovelyInstrument")
            .field("plugin", &self.plugin_uri())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LovelyInstrument {
    pub fn builder() -> LovelyInstrumentBuilder {
        LovelyInstrumentBuilder::default()
    }

    /// `config` is used as given; [`LovelyInstrumentBuilder::build`]
    /// validates it first.
    pub fn new(registry: Arc<Registry>, config: HostConfig) -> Self {
        Self {
            base_velocity: AtomicU8::new(config.base_velocity),
            registry,
            config,
            slot: InstanceSlot::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Swaps in the plugin at `uri`.
    ///
    /// A plugin that fails to instantiate still replaces the previous one;
    /// it renders silence and [`is_ready`](Self::is_ready) reports `false`.
    pub fn load_plugin(&self, uri: &str) -> Result<()> {
        let descriptor = self
            .registry
            .descriptor(uri)
            .ok_or_else(|| HostError::PluginNotFound(uri.to_string()))?;
        let config = self
            .config
            .clone()
            .with_base_velocity(self.base_velocity.load(Ordering::Relaxed));
        if self.slot.load(descriptor, &config, self.registry.urid_map()) {
            info!("Instrument now playing <{}>", uri);
        }
        Ok(())
    }

    pub fn unload(&self) {
        self.slot.unload();
    }

    pub fn plugin_uri(&self) -> Option<String> {
        self.slot.plugin_uri()
    }

    pub fn descriptor(&self) -> Option<Arc<PluginDescriptor>> {
        self.slot.descriptor()
    }

    /// Whether a plugin is loaded and its instance is usable.
    pub fn is_ready(&self) -> bool {
        self.slot.with_instance(|i| i.is_valid()).unwrap_or(false)
    }

    /// Renders one period into an interleaved stereo buffer.
    pub fn play(&self, buffer: &mut [[f32; 2]]) {
        self.slot.process(buffer);
    }

    pub fn play_note(&self, frame: u32, frequency: f32, velocity: f32, pan: f32) -> Option<VoiceId> {
        self.slot
            .note_start(frame, VoiceParams::new(frequency, velocity, pan))
    }

    /// Returns `false` for a voice that is not playing.
    pub fn update_note(&self, id: VoiceId, frame: u32, frequency: f32, velocity: f32, pan: f32) -> bool {
        self.slot
            .note_update(id, frame, VoiceParams::new(frequency, velocity, pan))
    }

    pub fn release_note(&self, id: VoiceId, frame: u32) {
        self.slot.note_release(id, frame);
    }

    pub fn delete_note(&self, id: VoiceId, frame: u32) {
        self.slot.note_dispose(id, frame);
    }

    pub fn handle_midi_event(&self, frame: u32, bytes: [u8; 3]) {
        self.slot.midi_event(frame, bytes);
    }

    /// Scale for note velocities sent as raw MIDI. Kept across plugin swaps.
    pub fn set_base_velocity(&self, velocity: u8) {
        self.base_velocity.store(velocity, Ordering::Relaxed);
        self.slot.set_base_velocity(velocity);
    }

    pub fn base_velocity(&self) -> u8 {
        self.base_velocity.load(Ordering::Relaxed)
    }

    pub fn presets(&self) -> Vec<Preset> {
        self.slot
            .descriptor()
            .map(|d| d.find_presets().to_vec())
            .unwrap_or_default()
    }

    pub fn load_preset(&self, index: usize) -> Result<()> {
        if !self.slot.is_loaded() {
            return Err(Error::PluginNotLoaded);
        }
        Ok(self.slot.load_preset(index)?)
    }

    pub fn save_settings(&self) -> Result<InstrumentSettings> {
        let Some(uri) = self.plugin_uri() else {
            return Ok(InstrumentSettings::default());
        };
        let state = match self.slot.save_state() {
            Ok(blob) => Some(blob),
            Err(HostError::InvalidInstance) => {
                warn!("Saving <{}> without state: instance is not valid", uri);
                None
            }
            Err(e) => return Err(e.into()),
        };
        Ok(InstrumentSettings {
            uri: Some(uri),
            state,
            state_cdata: None,
        })
    }

    /// Loads the saved plugin and restores its state. Settings without a URI
    /// leave the instrument empty.
    pub fn load_settings(&self, settings: &InstrumentSettings) -> Result<()> {
        let Some(uri) = settings.uri.as_deref() else {
            self.unload();
            return Ok(());
        };
        self.load_plugin(uri)?;

        if let Some(blob) = settings.state() {
            match self.slot.load_state(blob) {
                Ok(()) => {}
                Err(HostError::InvalidInstance) => {
                    warn!("State for <{}> not restored: instance is not valid", uri);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
