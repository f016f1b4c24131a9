//! # Lovely - LV2 instrument host
//!
//! Loads an installed LV2 instrument and plays it: notes in, stereo audio out.
//!
//! ## Architecture
//!
//! Lovely is an umbrella crate over:
//! - **lovely-host** - The hosting engine (discovery, port wiring, event
//!   encoding, voices, state, hot-swap)
//!
//! and adds [`LovelyInstrument`], the object a host keeps per instrument
//! track, with its saved [`InstrumentSettings`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use lovely::prelude::*;
//!
//! let instrument = LovelyInstrument::builder().sample_rate(48000.0).build()?;
//! instrument.load_plugin("http://example.org/synth")?;
//!
//! let voice = instrument.play_note(0, 440.0, 0.8, 0.0);
//!
//! // Audio thread
//! let mut period = [[0.0f32; 2]; 256];
//! instrument.play(&mut period);
//! ```
//!
//! ## Feature Flags
//!
//! - `lilv` - Native LV2 discovery through lilv. Without it the default
//!   registry is empty and plugins come from a custom `PluginSource`.

/// Re-export of lovely-host for direct access
pub use lovely_host as host;

pub use lovely_host::{
    init_registry, registry, Designation, EventShape, HostConfig, HostError, Incompatibility,
    LoadStage, PluginDescriptor, PluginSource, PluginState, Preset, Registry, Rejected,
    StateValue, VoiceId,
};

mod error;
pub use error::{Error, Result};

mod builder;
mod instrument;

pub use builder::LovelyInstrumentBuilder;
pub use instrument::{InstrumentSettings, LovelyInstrument};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        Error, HostConfig, InstrumentSettings, LovelyInstrument, LovelyInstrumentBuilder,
        PluginState, Preset, Registry, Result, StateValue, VoiceId,
    };
}
