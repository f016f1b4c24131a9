//! In-memory plugin backend for tests and headless use.
//!
//! A [`MockPluginSpec`] describes a plugin's ports, presets and quirks. The
//! instance it produces behaves like a trivial synth:
//!
//! - every audio output = sum of audio inputs × the first control input,
//! - or, with no audio inputs, that control value as DC.
//!
//! Every call the host makes and every event the plugin decodes from its
//! event inputs is recorded in a shared [`MockLog`].

use crate::atom::{AtomEvent, AtomEvents};
use crate::backend::{InstantiateContext, NativeInstance, NativePlugin, PluginInfo, PluginSource, PortInfo};
use crate::descriptor::Preset;
use crate::error::LoadStage;
use crate::state::{PluginState, Property, StateValue};
use crate::uris::{self, Urids};
use crate::{HostError, Result};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// Orders calls across logs, so tests can compare two plugins' timelines.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    Instantiate,
    /// Instantiation was attempted and refused. No instance exists.
    InstantiateFailed,
    Activate,
    Connect(u32),
    Run(u32),
    Deactivate,
    Free,
}

/// An event as decoded by a mock instance.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Note {
        frame: i64,
        id: Option<i32>,
        gate: Option<bool>,
        frequency: Option<f32>,
        velocity: Option<f32>,
        pan: Option<f32>,
    },
    Midi {
        frame: i64,
        bytes: Vec<u8>,
    },
}

impl MockEvent {
    pub fn frame(&self) -> i64 {
        match self {
            MockEvent::Note { frame, .. } | MockEvent::Midi { frame, .. } => *frame,
        }
    }

    pub fn gate(&self) -> Option<bool> {
        match self {
            MockEvent::Note { gate, .. } => *gate,
            MockEvent::Midi { .. } => None,
        }
    }

    fn decode(event: AtomEvent<'_>, urids: &Urids) -> Option<Self> {
        if event.type_ == urids.midi_event {
            return Some(MockEvent::Midi {
                frame: event.frames,
                bytes: event.body.to_vec(),
            });
        }
        let object = event.object()?;
        if event.type_ != urids.atom_object || object.otype != urids.note_event {
            return None;
        }
        Some(MockEvent::Note {
            frame: event.frames,
            id: object.get(urids.note_id).and_then(|p| p.as_i32()),
            gate: object.get(urids.note_gate).and_then(|p| p.as_bool()),
            frequency: object.get(urids.note_frequency).and_then(|p| p.as_f32()),
            velocity: object.get(urids.note_velocity).and_then(|p| p.as_f32()),
            pan: object.get(urids.note_stereo_panning).and_then(|p| p.as_f32()),
        })
    }
}

#[derive(Default)]
struct LogInner {
    calls: Vec<(u64, MockCall)>,
    events: Vec<MockEvent>,
    preset_scans: usize,
    restored: Vec<Property>,
}

/// Shared record of what a mock plugin saw.
#[derive(Clone, Default)]
pub struct MockLog(Arc<Mutex<LogInner>>);

impl MockLog {
    fn record(&self, call: MockCall) {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        self.0.lock().calls.push((seq, call));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.0.lock().calls.iter().map(|(_, c)| *c).collect()
    }

    /// Calls other than port connections.
    pub fn lifecycle(&self) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, MockCall::Connect(_)))
            .collect()
    }

    /// Port indices connected before each `run`, one list per run.
    pub fn connect_order(&self) -> Vec<Vec<u32>> {
        let mut runs = Vec::new();
        let mut current = Vec::new();
        for call in self.calls() {
            match call {
                MockCall::Connect(index) => current.push(index),
                MockCall::Run(_) => runs.push(std::mem::take(&mut current)),
                _ => {}
            }
        }
        runs
    }

    /// Whether this plugin's last instance was freed before `other` was
    /// first instantiated.
    pub fn freed_before(&self, other: &MockLog) -> bool {
        let freed = self
            .0
            .lock()
            .calls
            .iter()
            .rev()
            .find(|(_, c)| *c == MockCall::Free)
            .map(|(seq, _)| *seq);
        let created = other
            .0
            .lock()
            .calls
            .iter()
            .find(|(_, c)| *c == MockCall::Instantiate)
            .map(|(seq, _)| *seq);
        matches!((freed, created), (Some(f), Some(c)) if f < c)
    }

    /// Instances created and not yet freed.
    pub fn live_instances(&self) -> usize {
        let calls = self.calls();
        let created = calls.iter().filter(|c| **c == MockCall::Instantiate).count();
        let freed = calls.iter().filter(|c| **c == MockCall::Free).count();
        created.saturating_sub(freed)
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.0.lock().events.clone()
    }

    pub fn preset_scans(&self) -> usize {
        self.0.lock().preset_scans
    }

    pub fn restored_properties(&self) -> Vec<Property> {
        self.0.lock().restored.clone()
    }
}

/// Builder for a mock plugin.
#[derive(Clone)]
pub struct MockPluginSpec {
    uri: String,
    name: String,
    class_uri: Option<String>,
    required_features: Vec<String>,
    ports: Vec<PortInfo>,
    presets: Vec<(Preset, PluginState)>,
    properties: Vec<Property>,
    fail: bool,
    log: MockLog,
}

impl MockPluginSpec {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            name: uri.to_string(),
            class_uri: None,
            required_features: Vec::new(),
            ports: Vec::new(),
            presets: Vec::new(),
            properties: Vec::new(),
            fail: false,
            log: MockLog::default(),
        }
    }

    /// Instrument with a note event input, stereo output and a `gain`
    /// control (default 1.0).
    pub fn stereo_synth(uri: &str) -> Self {
        Self::new(uri)
            .instrument()
            .port(PortInfo::event_input(0, "events", &[uris::NOTE_NOTE_EVENT]))
            .port(PortInfo::audio_output(1, "out_l"))
            .port(PortInfo::audio_output(2, "out_r"))
            .port(PortInfo::control_input(3, "gain", 1.0, 0.0, 2.0))
    }

    /// Like [`stereo_synth`](Self::stereo_synth) but only understands MIDI.
    pub fn midi_synth(uri: &str) -> Self {
        Self::new(uri)
            .instrument()
            .port(PortInfo::event_input(0, "midi_in", &[uris::MIDI_MIDI_EVENT]))
            .port(PortInfo::audio_output(1, "out_l"))
            .port(PortInfo::audio_output(2, "out_r"))
            .port(PortInfo::control_input(3, "gain", 1.0, 0.0, 2.0))
    }

    /// Instrument with a single untagged audio output.
    pub fn mono_synth(uri: &str) -> Self {
        Self::new(uri)
            .instrument()
            .port(PortInfo::event_input(0, "events", &[uris::NOTE_NOTE_EVENT]))
            .port(PortInfo::audio_output(1, "out"))
            .port(PortInfo::control_input(2, "gain", 1.0, 0.0, 2.0))
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn instrument(mut self) -> Self {
        self.class_uri = Some(uris::LV2_INSTRUMENT_PLUGIN.to_string());
        self
    }

    pub fn port(mut self, port: PortInfo) -> Self {
        self.ports.push(port);
        self
    }

    pub fn require_feature(mut self, uri: &str) -> Self {
        self.required_features.push(uri.to_string());
        self
    }

    pub fn preset(mut self, name: &str, state: PluginState) -> Self {
        let uri = format!("{}#preset{}", self.uri, self.presets.len());
        self.presets.push((Preset::new(name, uri), state));
        self
    }

    /// Custom property the instance reports on save.
    pub fn property(mut self, key: &str, value: StateValue) -> Self {
        self.properties.push(Property::new(key, value));
        self
    }

    /// Makes instantiation fail.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn log(&self) -> MockLog {
        self.log.clone()
    }

    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            uri: self.uri.clone(),
            name: self.name.clone(),
            class_uri: self.class_uri.clone(),
            required_features: self.required_features.clone(),
            ports: self.ports.clone(),
            plugin: Arc::new(MockPlugin { spec: self.clone() }),
        }
    }
}

/// Number of times a [`MockSource`] was scanned.
#[derive(Clone, Default)]
pub struct ScanCounter(Arc<AtomicUsize>);

impl ScanCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct MockSource {
    plugins: Vec<MockPluginSpec>,
    scans: ScanCounter,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(mut self, spec: MockPluginSpec) -> Self {
        self.plugins.push(spec);
        self
    }

    pub fn scan_counter(&self) -> ScanCounter {
        self.scans.clone()
    }
}

impl PluginSource for MockSource {
    fn scan(&self) -> Vec<PluginInfo> {
        self.scans.0.fetch_add(1, Ordering::Relaxed);
        self.plugins.iter().map(MockPluginSpec::info).collect()
    }
}

struct MockPlugin {
    spec: MockPluginSpec,
}

impl NativePlugin for MockPlugin {
    fn instantiate(&self, ctx: &InstantiateContext) -> Result<Box<dyn NativeInstance>> {
        let log = &self.spec.log;
        if self.spec.fail {
            log.record(MockCall::InstantiateFailed);
            return Err(HostError::InstantiationFailed {
                uri: self.spec.uri.clone(),
                stage: LoadStage::Instantiation,
                reason: "mock instantiation failure".to_string(),
            });
        }

        log.record(MockCall::Instantiate);
        let mut ports: Vec<_> = self.spec.ports.iter().map(MockPort::from_info).collect();
        ports.sort_by_key(|p| p.index);
        Ok(Box::new(MockInstance {
            ports,
            urids: ctx.urids,
            properties: self.spec.properties.clone(),
            log: log.clone(),
        }))
    }

    fn presets(&self) -> Vec<Preset> {
        self.spec.log.0.lock().preset_scans += 1;
        self.spec.presets.iter().map(|(p, _)| p.clone()).collect()
    }

    fn preset_state(&self, preset: &Preset) -> Result<PluginState> {
        self.spec
            .presets
            .iter()
            .find(|(p, _)| p.uri == preset.uri)
            .map(|(_, state)| state.clone())
            .ok_or_else(|| HostError::PresetUnavailable(preset.uri.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MockRole {
    ControlIn,
    AudioIn,
    AudioOut,
    EventIn,
    Other,
}

struct MockPort {
    index: u32,
    role: MockRole,
    data: *mut c_void,
}

impl MockPort {
    fn from_info(info: &PortInfo) -> Self {
        let input = info.is_a(uris::LV2_INPUT_PORT);
        let role = if info.is_a(uris::LV2_CONTROL_PORT) && input {
            MockRole::ControlIn
        } else if info.is_a(uris::LV2_AUDIO_PORT) {
            if input {
                MockRole::AudioIn
            } else {
                MockRole::AudioOut
            }
        } else if info.is_a(uris::ATOM_ATOM_PORT) && input {
            MockRole::EventIn
        } else {
            MockRole::Other
        };
        Self {
            index: info.index,
            role,
            data: std::ptr::null_mut(),
        }
    }
}

struct MockInstance {
    ports: Vec<MockPort>,
    urids: Urids,
    properties: Vec<Property>,
    log: MockLog,
}

// SAFETY: the port pointers are only dereferenced inside `run`, which the
// host calls with `&mut self` while the buffers are alive.
unsafe impl Send for MockInstance {}

impl MockInstance {
    fn connected(&self, role: MockRole) -> impl Iterator<Item = *mut c_void> + '_ {
        self.ports
            .iter()
            .filter(move |p| p.role == role && !p.data.is_null())
            .map(|p| p.data)
    }
}

impl NativeInstance for MockInstance {
    unsafe fn connect_port(&mut self, index: u32, data: *mut c_void) {
        self.log.record(MockCall::Connect(index));
        if let Some(port) = self.ports.iter_mut().find(|p| p.index == index) {
            port.data = data;
        }
    }

    fn activate(&mut self) {
        self.log.record(MockCall::Activate);
    }

    fn run(&mut self, nframes: u32) {
        self.log.record(MockCall::Run(nframes));
        let n = nframes as usize;

        // SAFETY: the host connected every port to a live buffer of the
        // right type, with audio buffers at least `nframes` long.
        unsafe {
            let gain = self
                .connected(MockRole::ControlIn)
                .next()
                .map(|p| *(p as *const f32))
                .unwrap_or(1.0);

            let mut mix = vec![0.0f32; n];
            let mut has_inputs = false;
            for input in self.connected(MockRole::AudioIn) {
                has_inputs = true;
                let samples = std::slice::from_raw_parts(input as *const f32, n);
                for (m, s) in mix.iter_mut().zip(samples) {
                    *m += s;
                }
            }
            for output in self.connected(MockRole::AudioOut) {
                let samples = std::slice::from_raw_parts_mut(output as *mut f32, n);
                for (out, m) in samples.iter_mut().zip(&mix) {
                    *out = if has_inputs { m * gain } else { gain };
                }
            }

            let mut decoded = Vec::new();
            for seq in self.connected(MockRole::EventIn) {
                let size = *(seq as *const u32) as usize;
                let bytes = std::slice::from_raw_parts(seq as *const u8, 8 + size);
                for event in AtomEvents::parse(bytes, self.urids.atom_sequence) {
                    decoded.extend(MockEvent::decode(event, &self.urids));
                }
            }
            self.log.0.lock().events.extend(decoded);
        }
    }

    fn deactivate(&mut self) {
        self.log.record(MockCall::Deactivate);
    }

    fn save_properties(&mut self) -> Vec<Property> {
        self.properties.clone()
    }

    fn restore_properties(&mut self, properties: &[Property]) {
        self.properties = properties.to_vec();
        self.log.0.lock().restored.extend_from_slice(properties);
    }
}

impl Drop for MockInstance {
    fn drop(&mut self) {
        self.log.record(MockCall::Free);
    }
}
