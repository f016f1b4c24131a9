//! Native LV2 backend over `lilv`.
//!
//! The lilv world is loaded once per [`LilvSource`] and shared by every plugin
//! it discovered. lilv is not thread-safe, so the world lives behind a mutex
//! and nothing here touches it without holding that lock.

use crate::backend::{InstantiateContext, NativeInstance, NativePlugin, PluginInfo, PluginSource, PortInfo};
use crate::descriptor::Preset;
use crate::error::LoadStage;
use crate::features::NativeFeatures;
use crate::state::{PluginState, PortValue, Property, StateValue};
use crate::urid::{Urid, UridMap};
use crate::uris::{self, Urids};
use crate::{HostError, Result};
use lilv::instance::{ActiveInstance, Instance};
use lilv::node::Node;
use lilv::plugin::Plugin;
use lilv::World;
use lv2_raw::{LV2Feature, LV2Handle};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;
use tracing::{debug, warn};

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

const LV2_STATE_SUCCESS: u32 = 0;
const LV2_STATE_ERR_UNKNOWN: u32 = 1;
const LV2_STATE_IS_POD: u32 = 1;
const LV2_STATE_IS_PORTABLE: u32 = 2;

/// Event types a port may declare that the forge knows how to write.
const KNOWN_EVENTS: &[&str] = &[uris::MIDI_MIDI_EVENT, uris::NOTE_NOTE_EVENT];

struct SharedWorld(Mutex<World>);

// SAFETY: every access to the world, and to the nodes and plugins it hands
// out, happens while holding the mutex.
unsafe impl Send for SharedWorld {}
unsafe impl Sync for SharedWorld {}

/// Plugins installed on the system, found through `LV2_PATH`.
pub struct LilvSource {
    world: Arc<SharedWorld>,
}

impl Default for LilvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LilvSource {
    pub fn new() -> Self {
        let world = World::new();
        world.load_all();
        Self {
            world: Arc::new(SharedWorld(Mutex::new(world))),
        }
    }
}

impl PluginSource for LilvSource {
    fn scan(&self) -> Vec<PluginInfo> {
        let world = self.world.0.lock();
        let rdf_type = world.new_uri(RDF_TYPE);
        let instrument = world.new_uri(uris::LV2_INSTRUMENT_PLUGIN);
        let designation = world.new_uri(uris::LV2_DESIGNATION);
        let events: Vec<(&str, Node)> = KNOWN_EVENTS.iter().map(|e| (*e, world.new_uri(e))).collect();

        let mut plugins = Vec::new();
        for plugin in world.plugins().iter() {
            if !plugin.verify() {
                debug!("Skipping plugin that fails verification");
                continue;
            }
            let Some(uri) = plugin.uri().as_uri().map(str::to_string) else {
                continue;
            };
            let name = plugin.name().as_str().unwrap_or(&uri).to_string();
            let class_uri = world
                .get(Some(&plugin.uri()), Some(&rdf_type), Some(&instrument))
                .map(|_| uris::LV2_INSTRUMENT_PLUGIN.to_string());
            let required_features = plugin
                .required_features()
                .iter()
                .filter_map(|f| f.as_uri().map(str::to_string))
                .collect();
            let ports = plugin
                .iter_ports()
                .map(|port| port_info(&port, &designation, &events))
                .collect();

            plugins.push(PluginInfo {
                plugin: Arc::new(LilvPlugin {
                    world: Arc::clone(&self.world),
                    uri: uri.clone(),
                }),
                uri,
                name,
                class_uri,
                required_features,
                ports,
            });
        }
        plugins
    }
}

fn port_info(port: &lilv::port::Port, designation: &Node, events: &[(&str, Node)]) -> PortInfo {
    let symbol = port
        .symbol()
        .and_then(|n| n.as_str().map(str::to_string))
        .unwrap_or_default();
    let name = port
        .name()
        .and_then(|n| n.as_str().map(str::to_string))
        .unwrap_or_else(|| symbol.clone());
    let classes = port
        .classes()
        .iter()
        .filter_map(|c| c.as_uri().map(str::to_string))
        .collect();
    let supported = events
        .iter()
        .filter(|(_, node)| port.supports_event(node))
        .map(|(uri, _)| uri.to_string())
        .collect();
    let range = port.range();
    let float = |n: Option<Node>| n.and_then(|n| n.as_float());
    let range = match (float(range.default), float(range.minimum), float(range.maximum)) {
        (None, None, None) => None,
        (default, min, max) => {
            let min = min.unwrap_or(0.0);
            Some((default.unwrap_or(min), min, max.unwrap_or(1.0)))
        }
    };

    PortInfo {
        index: port.index() as u32,
        symbol,
        name,
        classes,
        events: supported,
        designation: port.get(designation).and_then(|n| n.as_uri().map(str::to_string)),
        range,
    }
}

struct LilvPlugin {
    world: Arc<SharedWorld>,
    uri: String,
}

impl LilvPlugin {
    fn with_plugin<R>(&self, f: impl FnOnce(&World, &Plugin) -> Result<R>) -> Result<R> {
        let world = self.world.0.lock();
        let plugin = world
            .plugins()
            .plugin(&world.new_uri(&self.uri))
            .ok_or_else(|| HostError::PluginNotFound(self.uri.clone()))?;
        f(&world, &plugin)
    }
}

impl NativePlugin for LilvPlugin {
    fn instantiate(&self, ctx: &InstantiateContext) -> Result<Box<dyn NativeInstance>> {
        self.with_plugin(|_, plugin| {
            let features = NativeFeatures::new(ctx);
            // SAFETY: every feature's data lives in `features`, which the
            // returned instance owns and drops after the native handle.
            let instance = unsafe { plugin.instantiate(ctx.sample_rate, features.features()) }
                .ok_or_else(|| HostError::InstantiationFailed {
                    uri: self.uri.clone(),
                    stage: LoadStage::Instantiation,
                    reason: "lilv returned no instance".to_string(),
                })?;
            Ok(Box::new(LilvInstance {
                native: Native::Inactive(instance),
                urid_map: Arc::clone(&ctx.urid_map),
                urids: ctx.urids,
                _features: features,
            }) as Box<dyn NativeInstance>)
        })
    }

    fn presets(&self) -> Vec<Preset> {
        let found = self.with_plugin(|world, plugin| {
            let preset_class = world.new_uri(uris::PSET_PRESET);
            let label = world.new_uri(uris::RDFS_LABEL);
            let mut presets = Vec::new();
            let Some(related) = plugin.related(Some(&preset_class)) else {
                return Ok(presets);
            };
            for node in related.iter() {
                let Some(uri) = node.as_uri().map(str::to_string) else {
                    continue;
                };
                if world.load_resource(&node).is_err() {
                    warn!("Could not load preset <{}>", uri);
                    continue;
                }
                let name = world
                    .get(Some(&node), Some(&label), None)
                    .and_then(|n| n.as_str().map(str::to_string))
                    .unwrap_or_else(|| uri.clone());
                presets.push(Preset::new(name, uri));
            }
            Ok(presets)
        });
        found.unwrap_or_default()
    }

    fn preset_state(&self, preset: &Preset) -> Result<PluginState> {
        let world = self.world.0.lock();
        let node = world.new_uri(&preset.uri);
        if world.load_resource(&node).is_err() {
            return Err(HostError::PresetUnavailable(preset.uri.clone()));
        }
        let lv2_port = world.new_uri(uris::LV2_PORT);
        let lv2_symbol = world.new_uri(uris::LV2_SYMBOL);
        let pset_value = world.new_uri(uris::PSET_VALUE);

        let mut state = PluginState::new(self.uri.clone());
        for port in world.find_nodes(Some(&node), &lv2_port, None).iter() {
            let symbol = world
                .get(Some(&port), Some(&lv2_symbol), None)
                .and_then(|n| n.as_str().map(str::to_string));
            let value = world
                .get(Some(&port), Some(&pset_value), None)
                .and_then(|n| n.as_float());
            if let (Some(symbol), Some(value)) = (symbol, value) {
                state.values.push(PortValue::new(symbol, StateValue::Float(value)));
            }
        }

        let state_pred = world.new_uri(uris::STATE_STATE);
        if let Some(saved) = world.get(Some(&node), Some(&state_pred), None) {
            for key in self.declared_properties(&world) {
                let key_node = world.new_uri(&key);
                let Some(literal) = world.get(Some(&saved), Some(&key_node), None) else {
                    continue;
                };
                match literal_value(&literal) {
                    Some(value) => state.properties.push(Property::new(key, value)),
                    None => debug!("Skipping non-literal preset property <{}>", key),
                }
            }
        }
        Ok(state)
    }
}

impl LilvPlugin {
    /// Property keys the plugin declares through `patch:writable` and
    /// `patch:readable`. Preset state can only be looked up by these.
    fn declared_properties(&self, world: &World) -> Vec<String> {
        let subject = world.new_uri(&self.uri);
        let mut keys: Vec<String> = Vec::new();
        for predicate in [uris::PATCH_WRITABLE, uris::PATCH_READABLE] {
            let predicate = world.new_uri(predicate);
            for key in world.find_nodes(Some(&subject), &predicate, None).iter() {
                if let Some(uri) = key.as_uri() {
                    if !keys.iter().any(|k| k == uri) {
                        keys.push(uri.to_string());
                    }
                }
            }
        }
        keys
    }
}

fn literal_value(node: &Node) -> Option<StateValue> {
    if node.as_uri().is_some() {
        return None;
    }
    if let Some(v) = node.as_bool() {
        return Some(StateValue::Bool(v));
    }
    if let Some(v) = node.as_int() {
        return Some(StateValue::Int(v));
    }
    if let Some(v) = node.as_float() {
        return Some(StateValue::Float(v));
    }
    node.as_str().map(|s| StateValue::String(s.to_string()))
}

enum Native {
    Inactive(Instance),
    Active(ActiveInstance),
    Gone,
}

struct LilvInstance {
    // Dropped before `_features`: the plugin may hold pointers into them.
    native: Native,
    urid_map: Arc<UridMap>,
    urids: Urids,
    _features: NativeFeatures,
}

// SAFETY: the host drives an instance from one thread at a time (`&mut self`
// everywhere), which is all LV2 asks of the audio-class functions.
unsafe impl Send for LilvInstance {}

impl LilvInstance {
    fn instance(&self) -> Option<&Instance> {
        match &self.native {
            Native::Inactive(instance) => Some(instance),
            Native::Active(active) => Some(active.instance()),
            Native::Gone => None,
        }
    }

    fn state_interface(&self) -> Option<(&StateInterface, LV2Handle)> {
        let instance = self.instance()?;
        // SAFETY: the state interface is a static struct in the plugin
        // binary, valid for the instance's lifetime.
        let iface = unsafe { instance.extension_data::<StateInterface>(uris::STATE_INTERFACE) }?;
        Some((unsafe { iface.as_ref() }, instance.handle()))
    }
}

impl NativeInstance for LilvInstance {
    unsafe fn connect_port(&mut self, index: u32, data: *mut c_void) {
        match &mut self.native {
            Native::Inactive(instance) => instance.connect_port_mut(index as usize, data),
            Native::Active(active) => active.instance_mut().connect_port_mut(index as usize, data),
            Native::Gone => {}
        }
    }

    fn activate(&mut self) {
        self.native = match std::mem::replace(&mut self.native, Native::Gone) {
            // SAFETY: called once, before the first `run`.
            Native::Inactive(instance) => Native::Active(unsafe { instance.activate() }),
            other => other,
        };
    }

    fn run(&mut self, nframes: u32) {
        if let Native::Active(active) = &mut self.native {
            // SAFETY: every port was connected to a live buffer of at least
            // `nframes` samples just before this call.
            unsafe { active.run(nframes as usize) };
        }
    }

    fn deactivate(&mut self) {
        self.native = match std::mem::replace(&mut self.native, Native::Gone) {
            // SAFETY: the instance is active and not running.
            Native::Active(active) => Native::Inactive(unsafe { active.deactivate() }),
            other => other,
        };
    }

    fn save_properties(&mut self) -> Vec<Property> {
        let Some((iface, handle)) = self.state_interface() else {
            return Vec::new();
        };
        let mut store = StoreTarget {
            urid_map: &self.urid_map,
            urids: &self.urids,
            properties: Vec::new(),
        };
        let features: [*const LV2Feature; 1] = [ptr::null()];
        // SAFETY: `store` outlives the call; the callback only touches it.
        let status = unsafe {
            (iface.save)(
                handle,
                store_property,
                (&mut store as *mut StoreTarget).cast(),
                LV2_STATE_IS_POD | LV2_STATE_IS_PORTABLE,
                features.as_ptr(),
            )
        };
        if status != LV2_STATE_SUCCESS {
            warn!("Plugin state save returned status {}", status);
        }
        store.properties
    }

    fn restore_properties(&mut self, properties: &[Property]) {
        let Some((iface, handle)) = self.state_interface() else {
            if !properties.is_empty() {
                warn!("Plugin has no state interface, {} properties dropped", properties.len());
            }
            return;
        };
        let source = RetrieveSource {
            values: properties
                .iter()
                .map(|p| {
                    let (type_, body) = p.value.to_atom(&self.urid_map, &self.urids);
                    (self.urid_map.intern(&p.key), type_, body)
                })
                .collect(),
        };
        let features: [*const LV2Feature; 1] = [ptr::null()];
        // SAFETY: `source` outlives the call and the pointers it hands out
        // are only read during it.
        let status = unsafe {
            (iface.restore)(
                handle,
                retrieve_property,
                (&source as *const RetrieveSource).cast_mut().cast(),
                LV2_STATE_IS_POD | LV2_STATE_IS_PORTABLE,
                features.as_ptr(),
            )
        };
        if status != LV2_STATE_SUCCESS {
            warn!("Plugin state restore returned status {}", status);
        }
    }
}

type StoreFn = unsafe extern "C" fn(*mut c_void, u32, *const c_void, usize, u32, u32) -> u32;
type RetrieveFn =
    unsafe extern "C" fn(*mut c_void, u32, *mut usize, *mut u32, *mut u32) -> *const c_void;

/// `LV2_State_Interface`
#[repr(C)]
struct StateInterface {
    save: unsafe extern "C" fn(LV2Handle, StoreFn, *mut c_void, u32, *const *const LV2Feature) -> u32,
    restore:
        unsafe extern "C" fn(LV2Handle, RetrieveFn, *mut c_void, u32, *const *const LV2Feature) -> u32,
}

struct StoreTarget<'a> {
    urid_map: &'a UridMap,
    urids: &'a Urids,
    properties: Vec<Property>,
}

struct RetrieveSource {
    values: Vec<(Urid, Urid, Vec<u8>)>,
}

unsafe extern "C" fn store_property(
    handle: *mut c_void,
    key: u32,
    value: *const c_void,
    size: usize,
    type_: u32,
    _flags: u32,
) -> u32 {
    if handle.is_null() || (value.is_null() && size > 0) {
        return LV2_STATE_ERR_UNKNOWN;
    }
    let target = &mut *(handle as *mut StoreTarget);
    let body = if size == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(value as *const u8, size)
    };
    let (Ok(key), Some(value)) = (
        target.urid_map.resolve(key),
        StateValue::from_atom(type_, body, target.urid_map, target.urids),
    ) else {
        return LV2_STATE_ERR_UNKNOWN;
    };
    target.properties.push(Property::new(key, value));
    LV2_STATE_SUCCESS
}

unsafe extern "C" fn retrieve_property(
    handle: *mut c_void,
    key: u32,
    size: *mut usize,
    type_: *mut u32,
    flags: *mut u32,
) -> *const c_void {
    if handle.is_null() {
        return ptr::null();
    }
    let source = &*(handle as *const RetrieveSource);
    let Some((_, value_type, body)) = source.values.iter().find(|(k, _, _)| *k == key) else {
        return ptr::null();
    };
    if !size.is_null() {
        *size = body.len();
    }
    if !type_.is_null() {
        *type_ = *value_type;
    }
    if !flags.is_null() {
        *flags = LV2_STATE_IS_POD | LV2_STATE_IS_PORTABLE;
    }
    body.as_ptr().cast()
}
