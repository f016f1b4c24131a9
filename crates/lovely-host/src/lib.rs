//! LV2 instrument hosting for Lovely
//!
//! Discovers installed LV2 plugins, decides which ones can be hosted, and runs
//! one instance at a time inside a hot-swappable slot shared by the audio and
//! control threads.
//!
//! ## Usage
//!
//! ```ignore
//! use lovely_host::{registry, HostConfig, InstanceSlot, VoiceParams};
//!
//! let registry = registry();
//! let synth = registry.descriptor("http://example.org/synth").unwrap();
//!
//! let slot = InstanceSlot::new();
//! slot.load(synth, &HostConfig::default(), registry.urid_map());
//!
//! // Control thread
//! let voice = slot.note_start(0, VoiceParams::new(440.0, 0.8, 0.0));
//!
//! // Audio thread
//! let mut out = [[0.0f32; 2]; 256];
//! slot.process(&mut out);
//! ```
//!
//! Without the `lilv` feature the process-wide registry discovers nothing;
//! pass a [`PluginSource`] to [`init_registry`] or [`Registry::new`].

pub mod error;
pub use error::{HostError, Incompatibility, LoadStage, Result};

mod config;
pub use config::{HostConfig, MAX_BASE_VELOCITY};

pub mod uris;
pub use uris::Urids;

mod urid;
pub use urid::{Urid, UridMap};

mod features;
pub use features::{feature_is_supported, SUPPORTED_FEATURES};

pub mod backend;
pub use backend::{EmptySource, NativeInstance, NativePlugin, PluginInfo, PluginSource, PortInfo};

mod descriptor;
pub use descriptor::{
    resolve_designations, Designation, DesignationTable, EventShape, PluginDescriptor,
    PortDescriptor, PortFlow, PortKind, Preset,
};

mod registry;
pub use registry::{init_registry, registry, Registry, Rejected};

pub mod atom;

mod forge;
pub use forge::{EventForge, EventPayload, EventSink, NoteProperties, TimedEvent};

mod voice;
pub use voice::{VoiceId, VoiceParams, VoiceTracker};

pub mod midi;

mod state;
pub use state::{PluginState, PortValue, Property, StateValue};

mod port;
pub use port::PortBuffer;

mod instance;
pub use instance::{LifecycleState, PluginInstance};

mod slot;
pub use slot::InstanceSlot;

pub mod mock;

#[cfg(feature = "lilv")]
mod lilv_backend;
#[cfg(feature = "lilv")]
pub use lilv_backend::LilvSource;
