//! URIs of every ontology term the host speaks.
//!
//! LV2 identifies port classes, atom types, features and options by URI.
//! Plugins see them as URIDs handed out by [`UridMap`](crate::UridMap); the
//! host pre-interns [`WELL_KNOWN`] in a fixed order so the ids in [`Urids`]
//! are the same in every process.

use crate::urid::{Urid, UridMap};

pub const LV2_INPUT_PORT: &str = "http://lv2plug.in/ns/lv2core#InputPort";
pub const LV2_OUTPUT_PORT: &str = "http://lv2plug.in/ns/lv2core#OutputPort";
pub const LV2_CONTROL_PORT: &str = "http://lv2plug.in/ns/lv2core#ControlPort";
pub const LV2_AUDIO_PORT: &str = "http://lv2plug.in/ns/lv2core#AudioPort";
pub const LV2_INSTRUMENT_PLUGIN: &str = "http://lv2plug.in/ns/lv2core#InstrumentPlugin";
pub const LV2_CONTROL: &str = "http://lv2plug.in/ns/lv2core#control";
pub const LV2_DESIGNATION: &str = "http://lv2plug.in/ns/lv2core#designation";
pub const LV2_NAME: &str = "http://lv2plug.in/ns/lv2core#name";
pub const LV2_PORT: &str = "http://lv2plug.in/ns/lv2core#port";
pub const LV2_SYMBOL: &str = "http://lv2plug.in/ns/lv2core#symbol";

pub const ATOM_ATOM_PORT: &str = "http://lv2plug.in/ns/ext/atom#AtomPort";
pub const ATOM_BOOL: &str = "http://lv2plug.in/ns/ext/atom#Bool";
pub const ATOM_CHUNK: &str = "http://lv2plug.in/ns/ext/atom#Chunk";
pub const ATOM_DOUBLE: &str = "http://lv2plug.in/ns/ext/atom#Double";
pub const ATOM_FLOAT: &str = "http://lv2plug.in/ns/ext/atom#Float";
pub const ATOM_INT: &str = "http://lv2plug.in/ns/ext/atom#Int";
pub const ATOM_LONG: &str = "http://lv2plug.in/ns/ext/atom#Long";
pub const ATOM_OBJECT: &str = "http://lv2plug.in/ns/ext/atom#Object";
pub const ATOM_SEQUENCE: &str = "http://lv2plug.in/ns/ext/atom#Sequence";
pub const ATOM_STRING: &str = "http://lv2plug.in/ns/ext/atom#String";
pub const ATOM_URID: &str = "http://lv2plug.in/ns/ext/atom#URID";

pub const BUF_SIZE_BOUNDED_BLOCK_LENGTH: &str =
    "http://lv2plug.in/ns/ext/buf-size#boundedBlockLength";
pub const BUF_SIZE_FIXED_BLOCK_LENGTH: &str = "http://lv2plug.in/ns/ext/buf-size#fixedBlockLength";
pub const BUF_SIZE_POWER_OF_2_BLOCK_LENGTH: &str =
    "http://lv2plug.in/ns/ext/buf-size#powerOf2BlockLength";
pub const BUF_SIZE_MAX_BLOCK_LENGTH: &str = "http://lv2plug.in/ns/ext/buf-size#maxBlockLength";
pub const BUF_SIZE_MIN_BLOCK_LENGTH: &str = "http://lv2plug.in/ns/ext/buf-size#minBlockLength";
pub const BUF_SIZE_SEQUENCE_SIZE: &str = "http://lv2plug.in/ns/ext/buf-size#sequenceSize";

pub const MIDI_MIDI_EVENT: &str = "http://lv2plug.in/ns/ext/midi#MidiEvent";

pub const NOTE_NOTE_EVENT: &str = "http://grejppi.github.io/ns/ext/note#NoteEvent";
pub const NOTE_ID: &str = "http://grejppi.github.io/ns/ext/note#id";
pub const NOTE_GATE: &str = "http://grejppi.github.io/ns/ext/note#gate";
pub const NOTE_FREQUENCY: &str = "http://grejppi.github.io/ns/ext/note#frequency";
pub const NOTE_VELOCITY: &str = "http://grejppi.github.io/ns/ext/note#velocity";
pub const NOTE_STEREO_PANNING: &str = "http://grejppi.github.io/ns/ext/note#stereoPanning";

pub const OPTIONS_OPTIONS: &str = "http://lv2plug.in/ns/ext/options#options";
pub const PARAM_SAMPLE_RATE: &str = "http://lv2plug.in/ns/ext/parameters#sampleRate";

pub const PATCH_READABLE: &str = "http://lv2plug.in/ns/ext/patch#readable";
pub const PATCH_WRITABLE: &str = "http://lv2plug.in/ns/ext/patch#writable";

pub const PG_LEFT: &str = "http://lv2plug.in/ns/ext/port-groups#left";
pub const PG_RIGHT: &str = "http://lv2plug.in/ns/ext/port-groups#right";

pub const PSET_PRESET: &str = "http://lv2plug.in/ns/ext/presets#Preset";
pub const PSET_VALUE: &str = "http://lv2plug.in/ns/ext/presets#value";

pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

pub const STATE_INTERFACE: &str = "http://lv2plug.in/ns/ext/state#interface";
pub const STATE_STATE: &str = "http://lv2plug.in/ns/ext/state#state";

pub const URID_MAP: &str = "http://lv2plug.in/ns/ext/urid#map";
pub const URID_UNMAP: &str = "http://lv2plug.in/ns/ext/urid#unmap";

/// Interned first, in this order, by every [`UridMap`].
pub const WELL_KNOWN: &[&str] = &[
    ATOM_ATOM_PORT,
    ATOM_BOOL,
    ATOM_CHUNK,
    ATOM_DOUBLE,
    ATOM_FLOAT,
    ATOM_INT,
    ATOM_LONG,
    ATOM_OBJECT,
    ATOM_SEQUENCE,
    ATOM_STRING,
    ATOM_URID,
    BUF_SIZE_MAX_BLOCK_LENGTH,
    BUF_SIZE_MIN_BLOCK_LENGTH,
    BUF_SIZE_SEQUENCE_SIZE,
    LV2_AUDIO_PORT,
    LV2_CONTROL_PORT,
    LV2_INPUT_PORT,
    LV2_INSTRUMENT_PLUGIN,
    LV2_OUTPUT_PORT,
    LV2_CONTROL,
    LV2_NAME,
    MIDI_MIDI_EVENT,
    NOTE_NOTE_EVENT,
    NOTE_ID,
    NOTE_FREQUENCY,
    NOTE_GATE,
    NOTE_STEREO_PANNING,
    NOTE_VELOCITY,
    PARAM_SAMPLE_RATE,
    PG_LEFT,
    PG_RIGHT,
    PSET_PRESET,
    RDFS_LABEL,
    URID_MAP,
    URID_UNMAP,
];

/// Interned ids of the terms the forge, port buffers and options use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Urids {
    pub atom_bool: Urid,
    pub atom_chunk: Urid,
    pub atom_double: Urid,
    pub atom_float: Urid,
    pub atom_int: Urid,
    pub atom_long: Urid,
    pub atom_object: Urid,
    pub atom_sequence: Urid,
    pub atom_string: Urid,
    pub atom_urid: Urid,
    pub bufsz_max_block_length: Urid,
    pub bufsz_min_block_length: Urid,
    pub bufsz_sequence_size: Urid,
    pub midi_event: Urid,
    pub note_event: Urid,
    pub note_id: Urid,
    pub note_gate: Urid,
    pub note_frequency: Urid,
    pub note_velocity: Urid,
    pub note_stereo_panning: Urid,
    pub param_sample_rate: Urid,
}

impl Urids {
    pub fn new(map: &UridMap) -> Self {
        Self {
            atom_bool: map.intern(ATOM_BOOL),
            atom_chunk: map.intern(ATOM_CHUNK),
            atom_double: map.intern(ATOM_DOUBLE),
            atom_float: map.intern(ATOM_FLOAT),
            atom_int: map.intern(ATOM_INT),
            atom_long: map.intern(ATOM_LONG),
            atom_object: map.intern(ATOM_OBJECT),
            atom_sequence: map.intern(ATOM_SEQUENCE),
            atom_string: map.intern(ATOM_STRING),
            atom_urid: map.intern(ATOM_URID),
            bufsz_max_block_length: map.intern(BUF_SIZE_MAX_BLOCK_LENGTH),
            bufsz_min_block_length: map.intern(BUF_SIZE_MIN_BLOCK_LENGTH),
            bufsz_sequence_size: map.intern(BUF_SIZE_SEQUENCE_SIZE),
            midi_event: map.intern(MIDI_MIDI_EVENT),
            note_event: map.intern(NOTE_NOTE_EVENT),
            note_id: map.intern(NOTE_ID),
            note_gate: map.intern(NOTE_GATE),
            note_frequency: map.intern(NOTE_FREQUENCY),
            note_velocity: map.intern(NOTE_VELOCITY),
            note_stereo_panning: map.intern(NOTE_STEREO_PANNING),
            param_sample_rate: map.intern(PARAM_SAMPLE_RATE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for uri in WELL_KNOWN {
            assert!(seen.insert(*uri), "duplicate well-known uri {}", uri);
        }
    }

    #[test]
    fn test_urids_are_stable_across_maps() {
        let a = Urids::new(&UridMap::new());
        let b = Urids::new(&UridMap::new());
        assert_eq!(a, b);
        assert_ne!(a.note_event, a.midi_event);
    }
}
