//! Per-voice note tracking.
//!
//! The host refers to a sounding note by its [`VoiceId`]. Each voice keeps a
//! shadow copy of the parameters last sent to the plugin so a block with no
//! change sends nothing.

use crate::forge::{EventPayload, EventSink, NoteProperties};
use std::num::NonZeroU32;

const INITIAL_VOICES: usize = 64;

/// Identifier of a live voice. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(NonZeroU32);

impl VoiceId {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Continuous parameters of a note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    /// Hz
    pub frequency: f32,
    /// 0.0..=1.0
    pub velocity: f32,
    /// -1.0 (left) ..= 1.0 (right)
    pub pan: f32,
}

impl VoiceParams {
    pub fn new(frequency: f32, velocity: f32, pan: f32) -> Self {
        Self {
            frequency,
            velocity,
            pan,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    id: VoiceId,
    gate: bool,
    sent: VoiceParams,
}

#[derive(Debug)]
pub struct VoiceTracker {
    voices: Vec<Voice>,
    next_id: u32,
}

impl Default for VoiceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceTracker {
    pub fn new() -> Self {
        Self {
            voices: Vec::with_capacity(INITIAL_VOICES),
            next_id: 1,
        }
    }

    /// Starts a voice and emits its gate-on with every parameter.
    pub fn start<S: EventSink + ?Sized>(
        &mut self,
        frame: u32,
        params: VoiceParams,
        sink: &mut S,
    ) -> VoiceId {
        let id = self.allocate_id();
        self.voices.push(Voice {
            id,
            gate: true,
            sent: params,
        });
        sink.write_event(
            frame,
            EventPayload::Note(NoteProperties {
                gate: Some(true),
                frequency: Some(params.frequency),
                velocity: Some(params.velocity),
                pan: Some(params.pan),
                ..NoteProperties::new(id)
            }),
        );
        id
    }

    /// Emits whichever parameters changed since they were last sent.
    /// Returns `false` for an unknown voice.
    pub fn update<S: EventSink + ?Sized>(
        &mut self,
        id: VoiceId,
        frame: u32,
        params: VoiceParams,
        sink: &mut S,
    ) -> bool {
        let Some(voice) = self.voice_mut(id) else {
            return false;
        };

        let mut note = NoteProperties::new(id);
        if params.frequency != voice.sent.frequency {
            note.frequency = Some(params.frequency);
        }
        if params.velocity != voice.sent.velocity {
            note.velocity = Some(params.velocity);
        }
        if params.pan != voice.sent.pan {
            note.pan = Some(params.pan);
        }
        voice.sent = params;

        if !note.is_empty() {
            sink.write_event(frame, EventPayload::Note(note));
        }
        true
    }

    /// Emits the gate-off the first time it is called for a voice.
    pub fn release<S: EventSink + ?Sized>(&mut self, id: VoiceId, frame: u32, sink: &mut S) {
        if let Some(voice) = self.voice_mut(id) {
            if voice.gate {
                voice.gate = false;
                sink.write_event(frame, gate_off(id));
            }
        }
    }

    /// Frees the voice, releasing it first if it is still gated.
    pub fn dispose<S: EventSink + ?Sized>(&mut self, id: VoiceId, frame: u32, sink: &mut S) {
        let Some(position) = self.voices.iter().position(|v| v.id == id) else {
            return;
        };
        let voice = self.voices.swap_remove(position);
        if voice.gate {
            sink.write_event(frame, gate_off(id));
        }
    }

    /// Forgets every voice without emitting anything.
    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn contains(&self, id: VoiceId) -> bool {
        self.voices.iter().any(|v| v.id == id)
    }

    pub fn is_gated(&self, id: VoiceId) -> bool {
        self.voices.iter().any(|v| v.id == id && v.gate)
    }

    fn voice_mut(&mut self, id: VoiceId) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|v| v.id == id)
    }

    fn allocate_id(&mut self) -> VoiceId {
        loop {
            let candidate = VoiceId::new(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
            if let Some(id) = candidate {
                if !self.contains(id) {
                    return id;
                }
            }
        }
    }

    #[cfg(test)]
    fn with_next_id(next_id: u32) -> Self {
        Self {
            next_id,
            ..Self::new()
        }
    }
}

fn gate_off(id: VoiceId) -> EventPayload {
    EventPayload::Note(NoteProperties {
        gate: Some(false),
        ..NoteProperties::new(id)
    })
}
