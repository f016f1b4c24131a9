//! A live plugin instance and its per-block run cycle.
//!
//! ```text
//! create ─► instantiate ─► activate ─► run* ─► deactivate ─► free
//! ```
//!
//! [`NativeHandle`] is the only code that calls into the native instance and
//! enforces that order, including on drop. A [`PluginInstance`] whose
//! descriptor is incompatible or whose instantiation failed has no handle:
//! it is invalid for its whole life and every per-block call is a no-op.

use crate::backend::{InstantiateContext, NativeInstance};
use crate::config::{HostConfig, MAX_BASE_VELOCITY};
use crate::descriptor::{Designation, EventShape, PluginDescriptor};
use crate::forge::{EventForge, EventPayload, EventSink, TimedEvent};
use crate::port::PortBuffer;
use crate::state::{PluginState, PortValue, Property, StateValue};
use crate::urid::UridMap;
use crate::uris::Urids;
use crate::{HostError, Result};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Events queued between two `run` calls before spilling to the heap.
const PENDING_EVENTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Instantiated,
    Active,
    Deactivated,
}

/// Owner of a native instance.
pub(crate) struct NativeHandle {
    inner: Box<dyn NativeInstance>,
    state: LifecycleState,
}

impl NativeHandle {
    fn new(inner: Box<dyn NativeInstance>) -> Self {
        Self {
            inner,
            state: LifecycleState::Instantiated,
        }
    }

    fn activate(&mut self) {
        if self.state != LifecycleState::Active {
            self.inner.activate();
            self.state = LifecycleState::Active;
        }
    }

    fn deactivate(&mut self) {
        if self.state == LifecycleState::Active {
            self.inner.deactivate();
            self.state = LifecycleState::Deactivated;
        }
    }

    /// # Safety
    /// See [`NativeInstance::connect_port`].
    unsafe fn connect_port(&mut self, index: u32, data: *mut std::ffi::c_void) {
        self.inner.connect_port(index, data);
    }

    fn run(&mut self, nframes: u32) {
        if self.state == LifecycleState::Active {
            self.inner.run(nframes);
        }
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.deactivate();
        // `inner` is dropped next, which frees the native instance.
    }
}

pub struct PluginInstance {
    // Declared first so the native instance is deactivated and freed before
    // the buffers it may still point into.
    handle: Option<NativeHandle>,
    descriptor: Arc<PluginDescriptor>,
    urids: Urids,
    ports: Vec<PortBuffer>,
    block_size: usize,
    pending: SmallVec<[TimedEvent; PENDING_EVENTS]>,
    forge: EventForge,
    events_in: Option<(u32, EventShape)>,
    base_velocity: u8,
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("uri", &self.descriptor.uri())
            .field("state", &self.lifecycle())
            .field("block_size", &self.block_size)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl PluginInstance {
    /// Allocates buffers and instantiates and activates the plugin.
    ///
    /// Never fails: on error the instance is returned invalid and the error
    /// is logged once.
    pub fn create(
        descriptor: Arc<PluginDescriptor>,
        config: &HostConfig,
        urid_map: &Arc<UridMap>,
    ) -> Self {
        let urids = Urids::new(urid_map);
        let ports = descriptor
            .ports()
            .iter()
            .map(|p| PortBuffer::for_port(p, config.block_size, config.sequence_capacity, &urids))
            .collect();

        let events_in = descriptor
            .designation(Designation::EventsIn)
            .and_then(|i| descriptor.port(i))
            .and_then(|p| p.event_shape().map(|shape| (p.index, shape)));

        let handle = if descriptor.is_compatible() {
            let ctx = InstantiateContext {
                sample_rate: config.sample_rate,
                block_size: config.block_size,
                sequence_capacity: config.sequence_capacity,
                urid_map: Arc::clone(urid_map),
                urids,
            };
            match descriptor.native().instantiate(&ctx) {
                Ok(inner) => {
                    let mut handle = NativeHandle::new(inner);
                    handle.activate();
                    info!("Loaded plugin <{}> ({})", descriptor.uri(), descriptor.name());
                    Some(handle)
                }
                Err(e) => {
                    error!("{}", e);
                    None
                }
            }
        } else {
            error!(
                "{}",
                HostError::Incompatible {
                    uri: descriptor.uri().to_string(),
                    reasons: descriptor.incompatibilities().to_vec(),
                }
            );
            None
        };

        Self {
            handle,
            descriptor,
            urids,
            ports,
            block_size: config.block_size,
            pending: SmallVec::new(),
            forge: EventForge::new(urids),
            events_in,
            base_velocity: config.base_velocity.min(MAX_BASE_VELOCITY),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn lifecycle(&self) -> Option<LifecycleState> {
        self.handle.as_ref().map(|h| h.state)
    }

    pub fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Grows every audio buffer to at least `frames` samples.
    ///
    /// May allocate. Call from the same context as [`run`](Self::run), never
    /// concurrently with it.
    pub fn resize_buffers(&mut self, frames: usize) {
        if frames <= self.block_size {
            return;
        }
        debug!("Growing audio buffers {} -> {} frames", self.block_size, frames);
        for buffer in &mut self.ports {
            buffer.grow(frames);
        }
        self.block_size = frames;
    }

    /// Processes one block of `nframes`.
    pub fn run(&mut self, nframes: u32) {
        if self.handle.is_none() {
            self.pending.clear();
            return;
        }
        self.resize_buffers(nframes as usize);

        let Self {
            handle,
            descriptor,
            urids,
            ports,
            pending,
            forge,
            events_in,
            base_velocity,
            ..
        } = self;
        let Some(handle) = handle.as_mut() else {
            return;
        };

        for (port, buffer) in descriptor.ports().iter().zip(ports.iter_mut()) {
            if let Some((index, shape)) = *events_in {
                if port.index == index {
                    if let Some(seq) = buffer.sequence_mut() {
                        forge.encode(pending, nframes, shape, *base_velocity, seq);
                    }
                }
            }
            // SAFETY: every buffer lives in `self.ports`, is not resized
            // until the next `run`, and outlives `handle` (field order).
            unsafe { handle.connect_port(port.index, buffer.as_mut_ptr()) };
        }

        handle.run(nframes);
        pending.clear();

        for (port, buffer) in descriptor.ports().iter().zip(ports.iter_mut()) {
            buffer.reset(port.flow, urids);
        }
    }

    /// Queues an event for the next block. Ignored if the instance is invalid
    /// or has no event input.
    pub fn write_event(&mut self, frame: u32, payload: EventPayload) {
        if self.handle.is_none() {
            return;
        }
        if self.events_in.is_none() {
            trace!("No event input on <{}>, dropping event", self.descriptor.uri());
            return;
        }
        self.pending.push(TimedEvent { frame, payload });
    }

    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    pub fn buffer(&self, index: u32) -> Option<&PortBuffer> {
        self.ports.get(index as usize)
    }

    /// Samples of the port with the given role.
    pub fn audio(&self, designation: Designation) -> Option<&[f32]> {
        let index = self.descriptor.designation(designation)?;
        self.ports.get(index as usize)?.samples()
    }

    pub fn audio_mut(&mut self, designation: Designation) -> Option<&mut [f32]> {
        let index = self.descriptor.designation(designation)?;
        self.ports.get_mut(index as usize)?.samples_mut()
    }

    pub fn control(&self, symbol: &str) -> Option<f32> {
        let port = self.descriptor.port_by_symbol(symbol)?;
        self.ports.get(port.index as usize)?.value()
    }

    /// Sets a control input by symbol. Returns `false` if there is none.
    pub fn set_control(&mut self, symbol: &str, value: f32) -> bool {
        match self.descriptor.port_by_symbol(symbol) {
            Some(port) if port.is_control_input() => self
                .ports
                .get_mut(port.index as usize)
                .is_some_and(|b| b.set_value(value)),
            _ => false,
        }
    }

    pub fn base_velocity(&self) -> u8 {
        self.base_velocity
    }

    pub fn set_base_velocity(&mut self, velocity: u8) {
        self.base_velocity = velocity.min(MAX_BASE_VELOCITY);
    }

    /// Every control input value plus the plugin's custom properties.
    pub fn save_state(&mut self) -> Result<String> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(HostError::InvalidInstance);
        };

        let mut state = PluginState::new(self.descriptor.uri());
        for port in self.descriptor.ports() {
            if !port.is_control_input() {
                continue;
            }
            if let Some(value) = self.ports[port.index as usize].value() {
                state
                    .values
                    .push(PortValue::new(port.symbol.as_str(), StateValue::Float(value)));
            }
        }
        state.properties = handle.inner.save_properties();
        state.to_blob()
    }

    pub fn load_state(&mut self, blob: &str) -> Result<()> {
        let state = PluginState::from_blob(blob)?;
        if !self.is_valid() {
            return Err(HostError::InvalidInstance);
        }
        self.apply_state(&state);
        Ok(())
    }

    /// Applies preset `index` of [`PluginDescriptor::presets`].
    pub fn load_preset(&mut self, index: usize) -> Result<()> {
        if !self.is_valid() {
            return Err(HostError::InvalidInstance);
        }
        let state = self.descriptor.preset_state(index)?;
        self.apply_state(&state);
        Ok(())
    }

    /// Restores values by port symbol. Returns how many were applied.
    fn apply_state(&mut self, state: &PluginState) -> usize {
        if !state.plugin.is_empty() && state.plugin != self.descriptor.uri() {
            warn!(
                "Restoring state saved by <{}> into <{}>",
                state.plugin,
                self.descriptor.uri()
            );
        }

        let mut applied = 0;
        for PortValue { symbol, value } in &state.values {
            let Some(port) = self
                .descriptor
                .port_by_symbol(symbol)
                .filter(|p| p.is_control_input())
            else {
                warn!("Skipping unknown port symbol '{}'", symbol);
                continue;
            };
            let Some(value) = value.as_f32() else {
                warn!(
                    "Skipping '{}': unsupported {} value",
                    symbol,
                    value.type_name()
                );
                continue;
            };
            if self.ports[port.index as usize].set_value(value) {
                applied += 1;
            }
        }

        if !state.properties.is_empty() {
            self.restore_properties(&state.properties);
        }
        applied
    }

    fn restore_properties(&mut self, properties: &[Property]) {
        if let Some(handle) = self.handle.as_mut() {
            handle.inner.restore_properties(properties);
        }
    }
}

impl EventSink for PluginInstance {
    fn write_event(&mut self, frame: u32, payload: EventPayload) {
        PluginInstance::write_event(self, frame, payload);
    }
}
