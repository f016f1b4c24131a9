//! Per-block event encoding.
//!
//! Host-side events are queued as [`TimedEvent`]s during a block and encoded
//! into the plugin's event input right before `run`. The sequence format
//! requires non-decreasing timestamps, so the queue is sorted first.

use crate::atom::{AtomSequence, AtomValue, ScalarTypes};
use crate::descriptor::EventShape;
use crate::midi::NoteToMidi;
use crate::urid::Urid;
use crate::uris::Urids;
use crate::voice::VoiceId;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

/// Fields of a `note:NoteEvent`. `None` fields are not sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteProperties {
    pub id: VoiceId,
    pub gate: Option<bool>,
    pub frequency: Option<f32>,
    pub velocity: Option<f32>,
    pub pan: Option<f32>,
}

impl NoteProperties {
    pub fn new(id: VoiceId) -> Self {
        Self {
            id,
            gate: None,
            frequency: None,
            velocity: None,
            pan: None,
        }
    }

    /// True if only the id is set.
    pub fn is_empty(&self) -> bool {
        self.gate.is_none()
            && self.frequency.is_none()
            && self.velocity.is_none()
            && self.pan.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventPayload {
    Note(NoteProperties),
    Midi([u8; 3]),
}

/// An event at a frame offset within the current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    pub frame: u32,
    pub payload: EventPayload,
}

/// Receives events for the current block.
pub trait EventSink {
    fn write_event(&mut self, frame: u32, payload: EventPayload);
}

impl EventSink for Vec<TimedEvent> {
    fn write_event(&mut self, frame: u32, payload: EventPayload) {
        self.push(TimedEvent { frame, payload });
    }
}

/// Stable in-place sort by frame. Allocation-free.
pub fn sort_by_frame(events: &mut [TimedEvent]) {
    for i in 1..events.len() {
        let mut j = i;
        while j > 0 && events[j - 1].frame > events[j].frame {
            events.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Encodes queued events into an event input sequence.
#[derive(Debug)]
pub struct EventForge {
    urids: Urids,
    midi: NoteToMidi,
    overflowed: bool,
}

impl EventForge {
    pub fn new(urids: Urids) -> Self {
        Self {
            urids,
            midi: NoteToMidi::new(),
            overflowed: false,
        }
    }

    /// Sorts `events` and appends them to `seq` (already cleared), clamping
    /// frames into `0..nframes`.
    ///
    /// Returns the number of events dropped because `seq` ran out of room.
    pub fn encode(
        &mut self,
        events: &mut [TimedEvent],
        nframes: u32,
        shape: EventShape,
        base_velocity: u8,
        seq: &mut AtomSequence,
    ) -> usize {
        sort_by_frame(events);
        let last_frame = nframes.saturating_sub(1);

        for (written, event) in events.iter().enumerate() {
            let frames = event.frame.min(last_frame) as i64;
            let fits = match (event.payload, shape) {
                (EventPayload::Note(note), EventShape::StructuredNote) => {
                    let props = self.note_properties(&note);
                    let types = self.scalar_types();
                    seq.forge().object(
                        frames,
                        self.urids.atom_object,
                        self.urids.note_event,
                        &types,
                        &props,
                    )
                }
                (EventPayload::Note(note), EventShape::RawMidi) => {
                    match self.midi.plan(&note, base_velocity) {
                        Some(midi) => {
                            let fits = seq.forge().raw(frames, self.urids.midi_event, &midi.bytes);
                            if fits {
                                self.midi.commit(midi);
                            }
                            fits
                        }
                        None => true,
                    }
                }
                (EventPayload::Midi(bytes), EventShape::RawMidi) => {
                    seq.forge().raw(frames, self.urids.midi_event, &bytes)
                }
                (payload, shape) => {
                    trace!("No encoding of {:?} for a {:?} port", payload, shape);
                    true
                }
            };

            if !fits {
                let dropped = events.len() - written;
                if self.overflowed {
                    debug!("Event buffer full, dropped {} events", dropped);
                } else {
                    warn!(
                        "Event buffer full ({} bytes), dropped {} events",
                        seq.capacity(),
                        dropped
                    );
                    self.overflowed = true;
                }
                return dropped;
            }
        }
        0
    }

    /// Forgets raw-MIDI key assignments.
    pub fn reset(&mut self) {
        self.midi.reset();
    }

    fn note_properties(&self, note: &NoteProperties) -> SmallVec<[(Urid, AtomValue); 5]> {
        let urids = &self.urids;
        let mut props = SmallVec::new();
        props.push((urids.note_id, AtomValue::Int(note.id.get() as i32)));
        if let Some(gate) = note.gate {
            props.push((urids.note_gate, AtomValue::Bool(gate)));
        }
        if let Some(frequency) = note.frequency {
            props.push((urids.note_frequency, AtomValue::Float(frequency)));
        }
        if let Some(velocity) = note.velocity {
            props.push((urids.note_velocity, AtomValue::Float(velocity)));
        }
        if let Some(pan) = note.pan {
            props.push((urids.note_stereo_panning, AtomValue::Float(pan)));
        }
        props
    }

    fn scalar_types(&self) -> ScalarTypes {
        ScalarTypes {
            bool_: self.urids.atom_bool,
            int: self.urids.atom_int,
            float: self.urids.atom_float,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urid::UridMap;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn urids() -> Urids {
        Urids::new(&UridMap::new())
    }

    fn sequence(capacity: usize, urids: &Urids) -> AtomSequence {
        let mut seq = AtomSequence::new(capacity);
        seq.clear(urids.atom_sequence);
        seq
    }

    fn id(n: u32) -> VoiceId {
        VoiceId::new(n).unwrap()
    }

    fn note_on(frame: u32, n: u32, hz: f32) -> TimedEvent {
        TimedEvent {
            frame,
            payload: EventPayload::Note(NoteProperties {
                gate: Some(true),
                frequency: Some(hz),
                velocity: Some(0.8),
                pan: Some(0.0),
                ..NoteProperties::new(id(n))
            }),
        }
    }

    #[test]
    fn test_structured_note_encoding() {
        let urids = urids();
        let mut seq = sequence(1024, &urids);
        let mut forge = EventForge::new(urids);
        let mut events = [note_on(10, 1, 440.0)];

        let dropped = forge.encode(&mut events, 256, EventShape::StructuredNote, 63, &mut seq);
        assert_eq!(dropped, 0);

        let decoded: Vec<_> = seq.events(urids.atom_sequence).collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].frames, 10);
        assert_eq!(decoded[0].type_, urids.atom_object);

        let object = decoded[0].object().unwrap();
        assert_eq!(object.otype, urids.note_event);
        let id = object.get(urids.note_id).unwrap();
        assert_eq!(id.type_, urids.atom_int);
        assert_eq!(id.as_i32(), Some(1));
        let gate = object.get(urids.note_gate).unwrap();
        assert_eq!(gate.type_, urids.atom_bool);
        assert_eq!(gate.as_bool(), Some(true));
        assert_relative_eq!(object.get(urids.note_frequency).unwrap().as_f32().unwrap(), 440.0);
        assert_relative_eq!(object.get(urids.note_velocity).unwrap().as_f32().unwrap(), 0.8);
        assert_relative_eq!(object.get(urids.note_stereo_panning).unwrap().as_f32().unwrap(), 0.0);
    }

    #[test]
    fn test_raw_midi_translation() {
        let urids = urids();
        let mut seq = sequence(1024, &urids);
        let mut forge = EventForge::new(urids);
        let mut events = vec![note_on(0, 1, 440.0)];
        events.write_event(
            8,
            EventPayload::Note(NoteProperties {
                gate: Some(false),
                ..NoteProperties::new(id(1))
            }),
        );
        events.write_event(4, EventPayload::Midi([0xB0, 7, 100]));

        forge.encode(&mut events, 64, EventShape::RawMidi, 100, &mut seq);
        let decoded: Vec<_> = seq
            .events(urids.atom_sequence)
            .map(|e| (e.frames, e.type_, e.body.to_vec()))
            .collect();
        assert_eq!(
            decoded,
            vec![
                (0, urids.midi_event, vec![0x90, 69, 80]),
                (4, urids.midi_event, vec![0xB0, 7, 100]),
                (8, urids.midi_event, vec![0x80, 69, 0]),
            ]
        );
    }

    #[test]
    fn test_frames_clamped_into_block() {
        let urids = urids();
        let mut seq = sequence(1024, &urids);
        let mut forge = EventForge::new(urids);
        let mut events = [note_on(300, 1, 440.0)];

        forge.encode(&mut events, 128, EventShape::StructuredNote, 63, &mut seq);
        assert_eq!(seq.events(urids.atom_sequence).next().unwrap().frames, 127);
    }

    #[test]
    fn test_overflow_drops_tail() {
        let urids = urids();
        // Sequence body plus room for two raw MIDI events.
        let mut seq = sequence(8 + 2 * 24, &urids);
        let mut forge = EventForge::new(urids);
        let mut events: Vec<TimedEvent> = (0..5)
            .map(|i| TimedEvent {
                frame: i,
                payload: EventPayload::Midi([0x90, 60 + i as u8, 100]),
            })
            .collect();

        assert_eq!(forge.encode(&mut events, 64, EventShape::RawMidi, 63, &mut seq), 3);
        let keys: Vec<_> = seq
            .events(urids.atom_sequence)
            .map(|e| e.body[1])
            .collect();
        assert_eq!(keys, [60, 61]);

        // Later overflows still report their drops.
        seq.clear(urids.atom_sequence);
        seq.forge().raw(0, urids.midi_event, &[0, 0, 0]);
        seq.forge().raw(0, urids.midi_event, &[0, 0, 0]);
        assert_eq!(forge.encode(&mut events, 64, EventShape::RawMidi, 63, &mut seq), 5);
    }

    fn note_off(frame: u32, n: u32) -> TimedEvent {
        TimedEvent {
            frame,
            payload: EventPayload::Note(NoteProperties {
                gate: Some(false),
                ..NoteProperties::new(id(n))
            }),
        }
    }

    fn delivered(seq: &AtomSequence, urids: &Urids) -> Vec<Vec<u8>> {
        seq.events(urids.atom_sequence).map(|e| e.body.to_vec()).collect()
    }

    #[test]
    fn test_dropped_midi_notes_keep_key_table_in_sync() {
        let urids = urids();
        // Room for exactly one raw MIDI event.
        let mut seq = sequence(8 + 24, &urids);
        let mut forge = EventForge::new(urids);

        let mut events = [note_on(0, 1, 440.0), note_on(1, 2, 880.0)];
        assert_eq!(forge.encode(&mut events, 64, EventShape::RawMidi, 100, &mut seq), 1);
        assert_eq!(delivered(&seq, &urids), [vec![0x90, 69, 80]]);

        // The dropped note-on never claimed key 81.
        seq.clear(urids.atom_sequence);
        let mut events = [note_on(0, 3, 880.0)];
        assert_eq!(forge.encode(&mut events, 64, EventShape::RawMidi, 100, &mut seq), 0);
        assert_eq!(delivered(&seq, &urids), [vec![0x90, 81, 80]]);

        // A dropped note-off leaves its key owned, so it is sent next time.
        seq.clear(urids.atom_sequence);
        let mut events = [note_off(0, 1), note_off(1, 3)];
        assert_eq!(forge.encode(&mut events, 64, EventShape::RawMidi, 100, &mut seq), 1);
        assert_eq!(delivered(&seq, &urids), [vec![0x80, 69, 0]]);

        seq.clear(urids.atom_sequence);
        let mut events = [note_off(0, 3)];
        assert_eq!(forge.encode(&mut events, 64, EventShape::RawMidi, 100, &mut seq), 0);
        assert_eq!(delivered(&seq, &urids), [vec![0x80, 81, 0]]);
    }

    #[test]
    fn test_unknown_shape_writes_nothing() {
        let urids = urids();
        let mut seq = sequence(1024, &urids);
        let mut forge = EventForge::new(urids);
        let mut events = [note_on(0, 1, 440.0)];
        assert_eq!(forge.encode(&mut events, 64, EventShape::Unknown, 63, &mut seq), 0);
        assert_eq!(seq.events(urids.atom_sequence).count(), 0);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut events = vec![
            TimedEvent { frame: 5, payload: EventPayload::Midi([1, 0, 0]) },
            TimedEvent { frame: 2, payload: EventPayload::Midi([2, 0, 0]) },
            TimedEvent { frame: 5, payload: EventPayload::Midi([3, 0, 0]) },
            TimedEvent { frame: 2, payload: EventPayload::Midi([4, 0, 0]) },
        ];
        sort_by_frame(&mut events);
        let order: Vec<_> = events
            .iter()
            .map(|e| match e.payload {
                EventPayload::Midi(b) => b[0],
                EventPayload::Note(_) => 0,
            })
            .collect();
        assert_eq!(order, [2, 4, 1, 3]);
    }

    fn arb_event() -> impl Strategy<Value = TimedEvent> {
        (0u32..64, 1u32..8, 0u8..3, 50.0f32..2000.0).prop_map(|(frame, n, kind, hz)| {
            let payload = match kind {
                0 => EventPayload::Note(NoteProperties {
                    gate: Some(true),
                    frequency: Some(hz),
                    velocity: Some(0.5),
                    ..NoteProperties::new(VoiceId::new(n).unwrap_or(id(1)))
                }),
                1 => EventPayload::Note(NoteProperties {
                    gate: Some(false),
                    ..NoteProperties::new(VoiceId::new(n).unwrap_or(id(1)))
                }),
                _ => EventPayload::Midi([0xB0, n as u8, 64]),
            };
            TimedEvent { frame, payload }
        })
    }

    fn encoded(events: &[TimedEvent], shape: EventShape, capacity: usize) -> (Vec<u8>, usize) {
        let urids = urids();
        let mut seq = sequence(capacity, &urids);
        let mut forge = EventForge::new(urids);
        let mut events = events.to_vec();
        let dropped = forge.encode(&mut events, 64, shape, 63, &mut seq);
        let bytes = seq
            .events(urids.atom_sequence)
            .flat_map(|e| {
                let mut out = e.frames.to_ne_bytes().to_vec();
                out.extend_from_slice(&e.type_.to_ne_bytes());
                out.extend_from_slice(e.body);
                out
            })
            .collect();
        (bytes, dropped)
    }

    proptest! {
        #[test]
        fn test_unsorted_input_encodes_like_sorted(
            events in proptest::collection::vec(arb_event(), 0..40),
            structured in any::<bool>(),
            capacity in 64usize..2048,
        ) {
            let shape = if structured { EventShape::StructuredNote } else { EventShape::RawMidi };
            let mut sorted = events.clone();
            sorted.sort_by_key(|e| e.frame);
            prop_assert_eq!(
                encoded(&events, shape, capacity),
                encoded(&sorted, shape, capacity)
            );
        }
    }
}
