//! Seams between the engine and a native plugin implementation.
//!
//! The engine never talks to a plugin library directly. A [`PluginSource`]
//! enumerates what is installed, a [`NativePlugin`] instantiates, and a
//! [`NativeInstance`] is driven block by block. The `lilv` backend
//! implements these over the real LV2 ABI; [`crate::mock`] implements them in
//! memory.

use crate::descriptor::Preset;
use crate::state::{PluginState, Property};
use crate::urid::UridMap;
use crate::uris::{self, Urids};
use crate::Result;
use std::ffi::c_void;
use std::sync::Arc;

/// Enumerates installed plugins.
pub trait PluginSource: Send + Sync {
    fn scan(&self) -> Vec<PluginInfo>;
}

/// Raw metadata for one discovered plugin, before classification.
#[derive(Clone)]
pub struct PluginInfo {
    pub uri: String,
    pub name: String,
    pub class_uri: Option<String>,
    pub required_features: Vec<String>,
    pub ports: Vec<PortInfo>,
    pub plugin: Arc<dyn NativePlugin>,
}

impl std::fmt::Debug for PluginInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInfo")
            .field("uri", &self.uri)
            .field("name", &self.name)
            .field("class_uri", &self.class_uri)
            .field("required_features", &self.required_features)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

/// Raw metadata for one port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortInfo {
    pub index: u32,
    pub symbol: String,
    pub name: String,
    /// `rdf:type` URIs, e.g. `lv2:InputPort` and `lv2:AudioPort`.
    pub classes: Vec<String>,
    /// `atom:supports` URIs of an atom port.
    pub events: Vec<String>,
    /// `lv2:designation`, if declared.
    pub designation: Option<String>,
    /// `(default, minimum, maximum)`
    pub range: Option<(f32, f32, f32)>,
}

impl PortInfo {
    fn new(index: u32, symbol: &str, classes: &[&str]) -> Self {
        Self {
            index,
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            events: Vec::new(),
            designation: None,
            range: None,
        }
    }

    pub fn control_input(index: u32, symbol: &str, default: f32, min: f32, max: f32) -> Self {
        let mut port = Self::new(index, symbol, &[uris::LV2_INPUT_PORT, uris::LV2_CONTROL_PORT]);
        port.range = Some((default, min, max));
        port
    }

    pub fn control_output(index: u32, symbol: &str) -> Self {
        Self::new(index, symbol, &[uris::LV2_OUTPUT_PORT, uris::LV2_CONTROL_PORT])
    }

    pub fn audio_input(index: u32, symbol: &str) -> Self {
        Self::new(index, symbol, &[uris::LV2_INPUT_PORT, uris::LV2_AUDIO_PORT])
    }

    pub fn audio_output(index: u32, symbol: &str) -> Self {
        Self::new(index, symbol, &[uris::LV2_OUTPUT_PORT, uris::LV2_AUDIO_PORT])
    }

    /// Atom input port supporting the given event types.
    pub fn event_input(index: u32, symbol: &str, events: &[&str]) -> Self {
        let mut port = Self::new(index, symbol, &[uris::LV2_INPUT_PORT, uris::ATOM_ATOM_PORT]);
        port.events = events.iter().map(|e| e.to_string()).collect();
        port
    }

    pub fn event_output(index: u32, symbol: &str, events: &[&str]) -> Self {
        let mut port = Self::new(index, symbol, &[uris::LV2_OUTPUT_PORT, uris::ATOM_ATOM_PORT]);
        port.events = events.iter().map(|e| e.to_string()).collect();
        port
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_designation(mut self, uri: &str) -> Self {
        self.designation = Some(uri.to_string());
        self
    }

    pub fn is_a(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn supports_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

/// Everything a native instance needs at creation.
#[derive(Clone)]
pub struct InstantiateContext {
    pub sample_rate: f64,
    pub block_size: usize,
    pub sequence_capacity: usize,
    pub urid_map: Arc<UridMap>,
    pub urids: Urids,
}

/// A discovered plugin that can be instantiated.
pub trait NativePlugin: Send + Sync {
    fn instantiate(&self, ctx: &InstantiateContext) -> Result<Box<dyn NativeInstance>>;

    /// Presets in whatever order the backend finds them.
    fn presets(&self) -> Vec<Preset>;

    fn preset_state(&self, preset: &Preset) -> Result<PluginState>;
}

/// One live native instantiation.
///
/// Only [`crate::instance::NativeHandle`] calls these, and it guarantees the
/// LV2 ordering: `activate` before the first `run`, `deactivate` before drop.
pub trait NativeInstance: Send {
    /// # Safety
    /// `data` must stay valid and correctly typed for the port until the
    /// next `connect_port` on the same index or until the instance is dropped.
    unsafe fn connect_port(&mut self, index: u32, data: *mut c_void);

    fn activate(&mut self);

    fn run(&mut self, nframes: u32);

    fn deactivate(&mut self);

    /// Custom properties beyond control port values.
    fn save_properties(&mut self) -> Vec<Property> {
        Vec::new()
    }

    fn restore_properties(&mut self, _properties: &[Property]) {}
}

/// Discovers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySource;

impl PluginSource for EmptySource {
    fn scan(&self) -> Vec<PluginInfo> {
        Vec::new()
    }
}
