//! Error types for the LV2 host

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Discovery,
    Instantiation,
    Activation,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Discovery => write!(f, "discovery"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Activation => write!(f, "activating"),
        }
    }
}

/// Why a discovered plugin cannot be hosted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incompatibility {
    /// The plugin requires a host feature we do not provide.
    UnsupportedFeature(String),
    /// No audio output port could be resolved.
    NoAudioOutput,
    /// Instrument without an event input we know how to feed.
    NoUsableEventInput,
    /// Port class or direction we cannot wire.
    UnsupportedPort { index: u32 },
}

impl std::fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Incompatibility::UnsupportedFeature(uri) => {
                write!(f, "requires unsupported feature <{}>", uri)
            }
            Incompatibility::NoAudioOutput => write!(f, "no audio output port"),
            Incompatibility::NoUsableEventInput => {
                write!(f, "instrument without a MIDI or note event input")
            }
            Incompatibility::UnsupportedPort { index } => {
                write!(f, "port {} has an unsupported type", index)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Plugin not found: <{0}>")]
    PluginNotFound(String),

    #[error("Plugin index {index} out of range ({len} plugins)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown URID: {0}")]
    UnknownUrid(u32),

    #[error("Plugin <{uri}> is not compatible: {}", format_reasons(.reasons))]
    Incompatible {
        uri: String,
        reasons: Vec<Incompatibility>,
    },

    #[error("Plugin <{uri}> failed at {stage} stage\n  Reason: {reason}")]
    InstantiationFailed {
        uri: String,
        stage: LoadStage,
        reason: String,
    },

    #[error("Plugin instance is not valid")]
    InvalidInstance,

    #[error("Failed to parse plugin state: {0}")]
    StateParse(#[from] serde_json::Error),

    #[error("Preset index {index} out of range ({count} presets)")]
    PresetOutOfRange { index: usize, count: usize },

    #[error("Failed to load preset <{0}>")]
    PresetUnavailable(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Plugin registry already initialized")]
    RegistryAlreadyInitialized,
}

fn format_reasons(reasons: &[Incompatibility]) -> String {
    reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, HostError>;
