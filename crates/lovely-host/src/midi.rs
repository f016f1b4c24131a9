//! Raw-MIDI fallback for plugins without a note event input.
//!
//! Only gate changes survive the translation. Pitch, velocity and pan
//! updates of a held note have no MIDI counterpart here and are dropped.

use crate::forge::NoteProperties;
use crate::voice::VoiceId;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

/// 12-TET key for `hz`, A4 = 440 Hz = key 69, clamped to the MIDI range.
pub fn hz_to_key(hz: f32) -> u8 {
    if hz.is_nan() || hz <= 0.0 {
        return 0;
    }
    let key = (69.0 + 12.0 * (hz / 440.0).log2()).round();
    key.clamp(0.0, 127.0) as u8
}

/// Note velocity in `0.0..=1.0` scaled by `base` into the MIDI range.
pub fn scaled_velocity(velocity: f32, base: u8) -> u8 {
    let scaled = velocity * base as f32;
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(0.0, 127.0) as u8
}

/// A note-on or note-off for one key, and who owns the key after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiNote {
    pub bytes: [u8; 3],
    owner: Option<VoiceId>,
}

impl MidiNote {
    pub fn key(&self) -> u8 {
        self.bytes[1]
    }
}

/// Per-instance key table for the note → MIDI translation.
#[derive(Debug, Clone)]
pub struct NoteToMidi {
    keys: [Option<VoiceId>; 128],
}

impl Default for NoteToMidi {
    fn default() -> Self {
        Self { keys: [None; 128] }
    }
}

impl NoteToMidi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Works out the MIDI message for one note event without touching the
    /// key table. Pass the result to [`commit`](Self::commit) once the
    /// message has actually been written.
    pub fn plan(&self, note: &NoteProperties, base_velocity: u8) -> Option<MidiNote> {
        match note.gate {
            Some(true) => {
                let key = hz_to_key(note.frequency?);
                if self.keys[key as usize].is_some() {
                    return None;
                }
                let velocity = scaled_velocity(note.velocity.unwrap_or(1.0), base_velocity);
                Some(MidiNote {
                    bytes: [NOTE_ON, key, velocity],
                    owner: Some(note.id),
                })
            }
            Some(false) => {
                let key = self.keys.iter().position(|k| *k == Some(note.id))?;
                Some(MidiNote {
                    bytes: [NOTE_OFF, key as u8, 0],
                    owner: None,
                })
            }
            None => None,
        }
    }

    /// Claims or frees the key of a delivered message.
    pub fn commit(&mut self, note: MidiNote) {
        self.keys[note.key() as usize] = note.owner;
    }

    /// [`plan`](Self::plan) and [`commit`](Self::commit) in one step.
    pub fn translate(&mut self, note: &NoteProperties, base_velocity: u8) -> Option<[u8; 3]> {
        let planned = self.plan(note, base_velocity)?;
        self.commit(planned);
        Some(planned.bytes)
    }

    pub fn sounding(&self) -> usize {
        self.keys.iter().filter(|k| k.is_some()).count()
    }

    pub fn reset(&mut self) {
        self.keys = [None; 128];
    }
}
