//! Per-plugin metadata, classified once at discovery.

use crate::backend::{NativePlugin, PluginInfo, PortInfo};
use crate::error::Incompatibility;
use crate::features::feature_is_supported;
use crate::state::PluginState;
use crate::uris;
use crate::{HostError, Result};
use std::sync::{Arc, OnceLock};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortFlow {
    Input,
    Output,
}

/// What an event port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventShape {
    /// `midi:MidiEvent`
    RawMidi,
    /// `note:NoteEvent` objects with id, gate, frequency, velocity and pan.
    StructuredNote,
    Unknown,
}

impl EventShape {
    fn from_port(port: &PortInfo) -> Self {
        if port.supports_event(uris::NOTE_NOTE_EVENT) {
            EventShape::StructuredNote
        } else if port.supports_event(uris::MIDI_MIDI_EVENT) {
            EventShape::RawMidi
        } else {
            EventShape::Unknown
        }
    }

    /// Whether the host can drive a port of this shape.
    pub fn is_usable(self) -> bool {
        self != EventShape::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortKind {
    Control { min: f32, max: f32, default: f32 },
    Audio,
    Event { shape: EventShape },
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortDescriptor {
    /// Dense `0..num_ports`; the only key used to wire the plugin.
    pub index: u32,
    pub symbol: String,
    pub name: String,
    pub flow: PortFlow,
    pub kind: PortKind,
    /// Explicit `lv2:designation`, if any.
    pub designation: Option<String>,
}

impl PortDescriptor {
    fn classify(info: &PortInfo) -> Self {
        let flow = if info.is_a(uris::LV2_INPUT_PORT) {
            Some(PortFlow::Input)
        } else if info.is_a(uris::LV2_OUTPUT_PORT) {
            Some(PortFlow::Output)
        } else {
            None
        };

        let kind = if flow.is_none() {
            PortKind::Unsupported
        } else if info.is_a(uris::LV2_CONTROL_PORT) {
            let (default, min, max) = info.range.unwrap_or((0.0, 0.0, 1.0));
            PortKind::Control { min, max, default }
        } else if info.is_a(uris::LV2_AUDIO_PORT) {
            PortKind::Audio
        } else if info.is_a(uris::ATOM_ATOM_PORT) {
            PortKind::Event {
                shape: EventShape::from_port(info),
            }
        } else {
            PortKind::Unsupported
        };

        Self {
            index: info.index,
            symbol: info.symbol.clone(),
            name: info.name.clone(),
            flow: flow.unwrap_or(PortFlow::Input),
            kind,
            designation: info.designation.clone(),
        }
    }

    pub fn is_control_input(&self) -> bool {
        self.flow == PortFlow::Input && matches!(self.kind, PortKind::Control { .. })
    }

    pub fn is_audio(&self, flow: PortFlow) -> bool {
        self.flow == flow && self.kind == PortKind::Audio
    }

    pub fn is_event(&self, flow: PortFlow) -> bool {
        self.flow == flow && matches!(self.kind, PortKind::Event { .. })
    }

    pub fn event_shape(&self) -> Option<EventShape> {
        match self.kind {
            PortKind::Event { shape } => Some(shape),
            _ => None,
        }
    }
}

/// Well-known port roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Designation {
    LeftIn,
    RightIn,
    LeftOut,
    RightOut,
    EventsIn,
    EventsOut,
}

impl Designation {
    pub const ALL: [Designation; 6] = [
        Designation::LeftIn,
        Designation::RightIn,
        Designation::LeftOut,
        Designation::RightOut,
        Designation::EventsIn,
        Designation::EventsOut,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Port index for each [`Designation`], or `None` if absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DesignationTable([Option<u32>; 6]);

impl DesignationTable {
    pub fn get(&self, designation: Designation) -> Option<u32> {
        self.0[designation.slot()]
    }

    fn set(&mut self, designation: Designation, index: u32) {
        self.0[designation.slot()] = Some(index);
    }

    fn fill(&mut self, designation: Designation, index: u32) {
        if self.get(designation).is_none() {
            self.set(designation, index);
        }
    }
}

/// Resolves the well-known port roles of a port list.
///
/// 1. Explicit metadata: `pg:left` / `pg:right` on audio ports, `lv2:control`
///    on event ports.
/// 2. Positional: the first and second untagged audio ports of each flow,
///    the first event port of each flow (for inputs, the first one the host
///    can drive if there is one).
/// 3. Mono: a lone channel fills both sides.
pub fn resolve_designations(ports: &[PortDescriptor]) -> DesignationTable {
    let mut table = DesignationTable::default();

    for port in ports {
        let tag = port.designation.as_deref();
        match (port.flow, port.kind, tag) {
            (PortFlow::Input, PortKind::Audio, Some(uris::PG_LEFT)) => {
                table.fill(Designation::LeftIn, port.index)
            }
            (PortFlow::Input, PortKind::Audio, Some(uris::PG_RIGHT)) => {
                table.fill(Designation::RightIn, port.index)
            }
            (PortFlow::Output, PortKind::Audio, Some(uris::PG_LEFT)) => {
                table.fill(Designation::LeftOut, port.index)
            }
            (PortFlow::Output, PortKind::Audio, Some(uris::PG_RIGHT)) => {
                table.fill(Designation::RightOut, port.index)
            }
            (PortFlow::Input, PortKind::Event { .. }, Some(uris::LV2_CONTROL)) => {
                table.fill(Designation::EventsIn, port.index)
            }
            (PortFlow::Output, PortKind::Event { .. }, Some(uris::LV2_CONTROL)) => {
                table.fill(Designation::EventsOut, port.index)
            }
            _ => {}
        }
    }

    for (flow, left, right) in [
        (PortFlow::Input, Designation::LeftIn, Designation::RightIn),
        (PortFlow::Output, Designation::LeftOut, Designation::RightOut),
    ] {
        let untagged = ports.iter().filter(|p| {
            p.is_audio(flow)
                && !matches!(p.designation.as_deref(), Some(uris::PG_LEFT | uris::PG_RIGHT))
        });
        for port in untagged {
            if table.get(left).is_none() {
                table.set(left, port.index);
            } else if table.get(right).is_none() {
                table.set(right, port.index);
            } else {
                break;
            }
        }

        match (table.get(left), table.get(right)) {
            (Some(l), None) => table.set(right, l),
            (None, Some(r)) => table.set(left, r),
            _ => {}
        }
    }

    if table.get(Designation::EventsIn).is_none() {
        let usable = ports
            .iter()
            .find(|p| p.is_event(PortFlow::Input) && p.event_shape().is_some_and(|s| s.is_usable()));
        let any = || ports.iter().find(|p| p.is_event(PortFlow::Input));
        if let Some(port) = usable.or_else(any) {
            table.set(Designation::EventsIn, port.index);
        }
    }
    if let Some(port) = ports.iter().find(|p| p.is_event(PortFlow::Output)) {
        table.fill(Designation::EventsOut, port.index);
    }

    table
}

/// A named preset, resolved lazily per descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    /// Backend reference to the stored preset.
    pub uri: String,
}

impl Preset {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }
}

/// Immutable metadata for one discovered plugin.
pub struct PluginDescriptor {
    uri: String,
    name: String,
    is_instrument: bool,
    ports: Vec<PortDescriptor>,
    designations: DesignationTable,
    incompatibilities: Vec<Incompatibility>,
    presets: OnceLock<Vec<Preset>>,
    native: Arc<dyn NativePlugin>,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("uri", &self.uri)
            .field("name", &self.name)
            .field("is_instrument", &self.is_instrument)
            .field("ports", &self.ports.len())
            .field("designations", &self.designations)
            .field("incompatibilities", &self.incompatibilities)
            .finish_non_exhaustive()
    }
}

impl PluginDescriptor {
    pub fn from_info(info: PluginInfo) -> Self {
        let mut incompatibilities = Vec::new();

        for feature in &info.required_features {
            if !feature_is_supported(feature) {
                incompatibilities.push(Incompatibility::UnsupportedFeature(feature.clone()));
            }
        }

        let mut port_infos = info.ports;
        port_infos.sort_by_key(|p| p.index);
        let ports: Vec<PortDescriptor> = port_infos.iter().map(PortDescriptor::classify).collect();

        for (position, port) in ports.iter().enumerate() {
            if port.kind == PortKind::Unsupported || port.index as usize != position {
                incompatibilities.push(Incompatibility::UnsupportedPort { index: port.index });
            }
        }

        let designations = resolve_designations(&ports);
        if designations.get(Designation::LeftOut).is_none() {
            incompatibilities.push(Incompatibility::NoAudioOutput);
        }

        let is_instrument = info.class_uri.as_deref() == Some(uris::LV2_INSTRUMENT_PLUGIN);
        if is_instrument {
            let shape = designations
                .get(Designation::EventsIn)
                .and_then(|i| ports.get(i as usize))
                .and_then(|p| p.event_shape());
            if !shape.is_some_and(|s| s.is_usable()) {
                incompatibilities.push(Incompatibility::NoUsableEventInput);
            }
        }

        Self {
            uri: info.uri,
            name: info.name,
            is_instrument,
            ports,
            designations,
            incompatibilities,
            presets: OnceLock::new(),
            native: info.plugin,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_instrument(&self) -> bool {
        self.is_instrument
    }

    pub fn is_compatible(&self) -> bool {
        self.incompatibilities.is_empty()
    }

    pub fn incompatibilities(&self) -> &[Incompatibility] {
        &self.incompatibilities
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn num_ports(&self) -> usize {
        self.ports.len()
    }

    pub fn port(&self, index: u32) -> Option<&PortDescriptor> {
        self.ports.get(index as usize)
    }

    pub fn port_by_symbol(&self, symbol: &str) -> Option<&PortDescriptor> {
        self.ports.iter().find(|p| p.symbol == symbol)
    }

    pub fn designation(&self, designation: Designation) -> Option<u32> {
        self.designations.get(designation)
    }

    pub fn designations(&self) -> &DesignationTable {
        &self.designations
    }

    /// Shape of the designated event input, if any.
    pub fn event_input_shape(&self) -> Option<EventShape> {
        self.designation(Designation::EventsIn)
            .and_then(|i| self.port(i))
            .and_then(|p| p.event_shape())
    }

    /// Populates the preset list on first call; later calls are free.
    pub fn find_presets(&self) -> &[Preset] {
        self.presets.get_or_init(|| {
            let mut presets = self.native.presets();
            presets.sort_by(|a, b| a.name.cmp(&b.name));
            debug!("Found {} presets for <{}>", presets.len(), self.uri);
            presets
        })
    }

    pub fn presets(&self) -> &[Preset] {
        self.find_presets()
    }

    pub fn num_presets(&self) -> usize {
        self.find_presets().len()
    }

    pub fn preset(&self, index: usize) -> Result<&Preset> {
        let presets = self.find_presets();
        presets.get(index).ok_or(HostError::PresetOutOfRange {
            index,
            count: presets.len(),
        })
    }

    pub(crate) fn preset_state(&self, index: usize) -> Result<PluginState> {
        let preset = self.preset(index)?;
        self.native.preset_state(preset)
    }

    pub(crate) fn native(&self) -> &Arc<dyn NativePlugin> {
        &self.native
    }
}
