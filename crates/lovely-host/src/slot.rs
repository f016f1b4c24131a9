//! The hot-swappable home of one live instance.
//!
//! The audio context and the control context share one [`InstanceSlot`].
//! Every operation holds the slot lock for its own body only. The audio
//! context uses `try_lock` and renders silence if the control context
//! is mid-operation, so it never waits on a plugin load.

use crate::config::HostConfig;
use crate::descriptor::{Designation, PluginDescriptor};
use crate::forge::{EventPayload, TimedEvent};
use crate::instance::PluginInstance;
use crate::urid::UridMap;
use crate::voice::{VoiceId, VoiceParams, VoiceTracker};
use crate::{HostError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Default)]
struct SlotState {
    instance: Option<PluginInstance>,
    voices: VoiceTracker,
}

impl SlotState {
    fn valid_instance(&mut self) -> Option<&mut PluginInstance> {
        self.instance.as_mut().filter(|i| i.is_valid())
    }
}

#[derive(Default)]
pub struct InstanceSlot {
    state: Mutex<SlotState>,
}

impl InstanceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the live instance.
    ///
    /// The old instance is deactivated and freed before the new one is
    /// created, all under the lock, so the audio context sees one or the
    /// other and never a half-built instance. Returns whether the new
    /// instance is valid.
    pub fn load(
        &self,
        descriptor: Arc<PluginDescriptor>,
        config: &HostConfig,
        urid_map: &Arc<UridMap>,
    ) -> bool {
        let mut state = self.state.lock();
        if let Some(old) = state.instance.take() {
            debug!("Unloading <{}>", old.descriptor().uri());
        }
        state.voices.clear();

        let instance = PluginInstance::create(descriptor, config, urid_map);
        let valid = instance.is_valid();
        state.instance = Some(instance);
        valid
    }

    pub fn unload(&self) {
        let mut state = self.state.lock();
        state.instance = None;
        state.voices.clear();
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().instance.is_some()
    }

    pub fn plugin_uri(&self) -> Option<String> {
        let state = self.state.lock();
        state.instance.as_ref().map(|i| i.descriptor().uri().to_string())
    }

    pub fn descriptor(&self) -> Option<Arc<PluginDescriptor>> {
        let state = self.state.lock();
        state.instance.as_ref().map(|i| Arc::clone(i.descriptor()))
    }

    /// Renders one block of `out.len()` frames into `out`.
    ///
    /// Returns `false`, with `out` silenced, if the slot is busy, empty or
    /// holds an invalid instance.
    pub fn process(&self, out: &mut [[f32; 2]]) -> bool {
        let Some(mut state) = self.state.try_lock() else {
            trace!("Instance slot busy, rendering silence");
            silence(out);
            return false;
        };
        let Some(instance) = state.valid_instance() else {
            silence(out);
            return false;
        };

        instance.run(out.len() as u32);

        let left = instance.audio(Designation::LeftOut);
        let right = instance.audio(Designation::RightOut).or(left);
        match (left, right) {
            (Some(left), Some(right)) => {
                for (i, frame) in out.iter_mut().enumerate() {
                    frame[0] = left.get(i).copied().unwrap_or(0.0);
                    frame[1] = right.get(i).copied().unwrap_or(0.0);
                }
            }
            _ => silence(out),
        }
        true
    }

    /// Starts a voice. `None` if there is no valid instance.
    pub fn note_start(&self, frame: u32, params: VoiceParams) -> Option<VoiceId> {
        let mut state = self.state.lock();
        let SlotState { instance, voices } = &mut *state;
        let instance = instance.as_mut().filter(|i| i.is_valid())?;
        Some(voices.start(frame, params, instance))
    }

    pub fn note_update(&self, id: VoiceId, frame: u32, params: VoiceParams) -> bool {
        let mut state = self.state.lock();
        let SlotState { instance, voices } = &mut *state;
        match instance.as_mut().filter(|i| i.is_valid()) {
            Some(instance) => voices.update(id, frame, params, instance),
            None => false,
        }
    }

    pub fn note_release(&self, id: VoiceId, frame: u32) {
        let mut state = self.state.lock();
        let SlotState { instance, voices } = &mut *state;
        if let Some(instance) = instance.as_mut().filter(|i| i.is_valid()) {
            voices.release(id, frame, instance);
        }
    }

    pub fn note_dispose(&self, id: VoiceId, frame: u32) {
        let mut state = self.state.lock();
        let SlotState { instance, voices } = &mut *state;
        match instance.as_mut().filter(|i| i.is_valid()) {
            Some(instance) => voices.dispose(id, frame, instance),
            None => voices.dispose(id, frame, &mut Vec::<TimedEvent>::new()),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Queues a raw MIDI message for the next block.
    pub fn midi_event(&self, frame: u32, bytes: [u8; 3]) {
        if let Some(instance) = self.state.lock().valid_instance() {
            instance.write_event(frame, EventPayload::Midi(bytes));
        }
    }

    pub fn set_base_velocity(&self, velocity: u8) {
        if let Some(instance) = self.state.lock().instance.as_mut() {
            instance.set_base_velocity(velocity);
        }
    }

    pub fn save_state(&self) -> Result<String> {
        match self.state.lock().instance.as_mut() {
            Some(instance) => instance.save_state(),
            None => Err(HostError::InvalidInstance),
        }
    }

    pub fn load_state(&self, blob: &str) -> Result<()> {
        match self.state.lock().instance.as_mut() {
            Some(instance) => instance.load_state(blob),
            None => Err(HostError::InvalidInstance),
        }
    }

    pub fn load_preset(&self, index: usize) -> Result<()> {
        match self.state.lock().instance.as_mut() {
            Some(instance) => instance.load_preset(index),
            None => Err(HostError::InvalidInstance),
        }
    }

    /// Runs `f` on the live instance under the lock.
    pub fn with_instance<R>(&self, f: impl FnOnce(&mut PluginInstance) -> R) -> Option<R> {
        self.state.lock().instance.as_mut().map(f)
    }
}

fn silence(out: &mut [[f32; 2]]) {
    out.fill([0.0; 2]);
}
