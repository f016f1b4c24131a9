//! `LV2_Atom_Sequence` buffers.
//!
//! Layout (native endian, 8-byte aligned):
//!
//! ```text
//! atom     { size: u32, type: u32 }
//! body     { unit: u32, pad: u32 }
//! event*   { frames: i64, atom { size, type }, body[size], pad to 8 }
//! ```
//!
//! An input sequence is cleared to an empty `atom:Sequence` before each
//! block. An output sequence is primed as an `atom:Chunk` whose size is the
//! full body capacity, telling the plugin how much room it has.

use crate::urid::Urid;
use std::ffi::c_void;

const ATOM_HEADER: usize = 8;
const SEQUENCE_BODY: usize = 8;
const EVENT_HEADER: usize = 16;
const OBJECT_BODY: usize = 8;
const PROPERTY_HEADER: usize = 16;

/// Rounds `size` up to the next multiple of 8.
pub const fn pad_size(size: usize) -> usize {
    (size + 7) & !7
}

/// Fixed-capacity sequence buffer handed to an atom port.
#[derive(Clone)]
pub struct AtomSequence {
    // u64 storage keeps the buffer 8-byte aligned as LV2 requires.
    data: Vec<u64>,
    capacity: usize,
}

impl std::fmt::Debug for AtomSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomSequence")
            .field("capacity", &self.capacity)
            .field("size", &self.atom_size())
            .field("type", &self.atom_type())
            .finish()
    }
}

impl AtomSequence {
    /// `capacity` is the body size in bytes (sequence header included), rounded
    /// up to a multiple of 8.
    pub fn new(capacity: usize) -> Self {
        let capacity = pad_size(capacity.max(SEQUENCE_BODY));
        Self {
            data: vec![0; (ATOM_HEADER + capacity) / 8],
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn atom_size(&self) -> u32 {
        read_u32(self.bytes(), 0)
    }

    pub fn atom_type(&self) -> Urid {
        read_u32(self.bytes(), 4)
    }

    /// Empty input sequence.
    pub fn clear(&mut self, sequence: Urid) {
        let bytes = self.bytes_mut();
        write_u32(bytes, 0, SEQUENCE_BODY as u32);
        write_u32(bytes, 4, sequence);
        write_u32(bytes, 8, 0);
        write_u32(bytes, 12, 0);
    }

    /// Output sequence ready for the plugin to fill.
    pub fn prime_output(&mut self, chunk: Urid) {
        let capacity = self.capacity as u32;
        let bytes = self.bytes_mut();
        write_u32(bytes, 0, capacity);
        write_u32(bytes, 4, chunk);
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.data.as_mut_ptr().cast()
    }

    /// Events currently in the sequence. Empty unless the buffer holds an
    /// `atom:Sequence` of `sequence` type.
    pub fn events(&self, sequence: Urid) -> AtomEvents<'_> {
        AtomEvents::parse(self.bytes(), sequence)
    }

    pub fn forge(&mut self) -> AtomForge<'_> {
        AtomForge { seq: self }
    }

    /// Bytes left for events.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.atom_size() as usize)
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: u64 storage reinterpreted as bytes, same allocation and length.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr().cast(), self.data.len() * 8) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` guarantees exclusivity.
        unsafe {
            std::slice::from_raw_parts_mut(self.data.as_mut_ptr().cast(), self.data.len() * 8)
        }
    }
}

/// One event in a sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomEvent<'a> {
    pub frames: i64,
    pub type_: Urid,
    pub body: &'a [u8],
}

impl<'a> AtomEvent<'a> {
    /// Reads the body as an `atom:Object`.
    pub fn object(&self) -> Option<AtomObject<'a>> {
        AtomObject::parse(self.body)
    }
}

pub struct AtomEvents<'a> {
    bytes: &'a [u8],
    offset: usize,
    end: usize,
}

impl<'a> AtomEvents<'a> {
    /// Walks a sequence atom laid out in `bytes`, header first. Yields
    /// nothing if the atom is not of `sequence` type or is truncated.
    pub fn parse(bytes: &'a [u8], sequence: Urid) -> Self {
        let end = if bytes.len() >= ATOM_HEADER && read_u32(bytes, 4) == sequence {
            (ATOM_HEADER + read_u32(bytes, 0) as usize).min(bytes.len())
        } else {
            0
        };
        Self {
            bytes,
            offset: ATOM_HEADER + SEQUENCE_BODY,
            end,
        }
    }
}

impl<'a> Iterator for AtomEvents<'a> {
    type Item = AtomEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + EVENT_HEADER > self.end {
            return None;
        }
        let frames = read_i64(self.bytes, self.offset);
        let size = read_u32(self.bytes, self.offset + 8) as usize;
        let type_ = read_u32(self.bytes, self.offset + 12);
        let body_start = self.offset + EVENT_HEADER;
        if body_start + size > self.end {
            return None;
        }
        self.offset += pad_size(EVENT_HEADER + size);
        Some(AtomEvent {
            frames,
            type_,
            body: &self.bytes[body_start..body_start + size],
        })
    }
}

/// Body of an `atom:Object`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomObject<'a> {
    pub id: u32,
    pub otype: Urid,
    props: &'a [u8],
}

impl<'a> AtomObject<'a> {
    pub fn parse(body: &'a [u8]) -> Option<Self> {
        if body.len() < OBJECT_BODY {
            return None;
        }
        Some(Self {
            id: read_u32(body, 0),
            otype: read_u32(body, 4),
            props: &body[OBJECT_BODY..],
        })
    }

    pub fn properties(&self) -> impl Iterator<Item = AtomProperty<'a>> + 'a {
        let props = self.props;
        let mut offset = 0;
        std::iter::from_fn(move || {
            if offset + PROPERTY_HEADER > props.len() {
                return None;
            }
            let key = read_u32(props, offset);
            let size = read_u32(props, offset + 8) as usize;
            let type_ = read_u32(props, offset + 12);
            let start = offset + PROPERTY_HEADER;
            if start + size > props.len() {
                return None;
            }
            offset += pad_size(PROPERTY_HEADER + size);
            Some(AtomProperty {
                key,
                type_,
                value: &props[start..start + size],
            })
        })
    }

    pub fn get(&self, key: Urid) -> Option<AtomProperty<'a>> {
        self.properties().find(|p| p.key == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomProperty<'a> {
    pub key: Urid,
    pub type_: Urid,
    pub value: &'a [u8],
}

impl AtomProperty<'_> {
    pub fn as_i32(&self) -> Option<i32> {
        (self.value.len() == 4).then(|| read_u32(self.value, 0) as i32)
    }

    pub fn as_f32(&self) -> Option<f32> {
        (self.value.len() == 4).then(|| f32::from_bits(read_u32(self.value, 0)))
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_i32().map(|v| v != 0)
    }
}

/// Scalar property value for [`AtomForge::object`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtomValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

impl AtomValue {
    fn bits(self) -> u32 {
        match self {
            AtomValue::Bool(b) => b as u32,
            AtomValue::Int(i) => i as u32,
            AtomValue::Float(f) => f.to_bits(),
        }
    }
}

/// Types an [`AtomValue`] is written as.
#[derive(Debug, Clone, Copy)]
pub struct ScalarTypes {
    pub bool_: Urid,
    pub int: Urid,
    pub float: Urid,
}

impl ScalarTypes {
    fn of(&self, value: AtomValue) -> Urid {
        match value {
            AtomValue::Bool(_) => self.bool_,
            AtomValue::Int(_) => self.int,
            AtomValue::Float(_) => self.float,
        }
    }
}

/// Appends events to a cleared input sequence.
///
/// Each write either fits entirely or leaves the sequence untouched and
/// returns `false`.
pub struct AtomForge<'a> {
    seq: &'a mut AtomSequence,
}

impl AtomForge<'_> {
    /// Event with an opaque body, e.g. a 3-byte `midi:MidiEvent`.
    pub fn raw(&mut self, frames: i64, type_: Urid, body: &[u8]) -> bool {
        let Some(at) = self.reserve(body.len()) else {
            return false;
        };
        let bytes = self.seq.bytes_mut();
        write_event_header(bytes, at, frames, body.len() as u32, type_);
        let start = at + EVENT_HEADER;
        bytes[start..start + body.len()].copy_from_slice(body);
        true
    }

    /// Event carrying an `atom:Object` of type `otype` with scalar properties.
    pub fn object(
        &mut self,
        frames: i64,
        object_type: Urid,
        otype: Urid,
        types: &ScalarTypes,
        properties: &[(Urid, AtomValue)],
    ) -> bool {
        let body_size = OBJECT_BODY + properties.len() * pad_size(PROPERTY_HEADER + 4);
        let Some(at) = self.reserve(body_size) else {
            return false;
        };
        let bytes = self.seq.bytes_mut();
        write_event_header(bytes, at, frames, body_size as u32, object_type);
        let mut offset = at + EVENT_HEADER;
        write_u32(bytes, offset, 0);
        write_u32(bytes, offset + 4, otype);
        offset += OBJECT_BODY;
        for &(key, value) in properties {
            write_u32(bytes, offset, key);
            write_u32(bytes, offset + 4, 0);
            write_u32(bytes, offset + 8, 4);
            write_u32(bytes, offset + 12, types.of(value));
            write_u32(bytes, offset + 16, value.bits());
            write_u32(bytes, offset + 20, 0);
            offset += pad_size(PROPERTY_HEADER + 4);
        }
        true
    }

    /// Grows the sequence by one event of `body_size`, returning the byte
    /// offset of the new event, or `None` if it does not fit.
    fn reserve(&mut self, body_size: usize) -> Option<usize> {
        let event_size = pad_size(EVENT_HEADER + body_size);
        let used = self.seq.atom_size() as usize;
        if used + event_size > self.seq.capacity {
            return None;
        }
        let at = ATOM_HEADER + used;
        write_u32(self.seq.bytes_mut(), 0, (used + event_size) as u32);
        Some(at)
    }
}

fn write_event_header(bytes: &mut [u8], at: usize, frames: i64, size: u32, type_: Urid) {
    bytes[at..at + 8].copy_from_slice(&frames.to_ne_bytes());
    write_u32(bytes, at + 8, size);
    write_u32(bytes, at + 12, type_);
    // Zero the padding so stale bytes never leak into the plugin.
    let end = at + pad_size(EVENT_HEADER + size as usize);
    bytes[at + EVENT_HEADER + size as usize..end].fill(0);
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_ne_bytes(word)
}

fn read_i64(bytes: &[u8], at: usize) -> i64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    i64::from_ne_bytes(word)
}

fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQ: Urid = 9;
    const CHUNK: Urid = 3;
    const OBJECT: Urid = 8;
    const MIDI: Urid = 22;
    const TYPES: ScalarTypes = ScalarTypes {
        bool_: 2,
        int: 6,
        float: 5,
    };

    #[test]
    fn test_clear_and_prime() {
        let mut seq = AtomSequence::new(100);
        assert_eq!(seq.capacity(), 104);

        seq.clear(SEQ);
        assert_eq!(seq.atom_size(), 8);
        assert_eq!(seq.atom_type(), SEQ);
        assert_eq!(seq.events(SEQ).count(), 0);

        seq.prime_output(CHUNK);
        assert_eq!(seq.atom_size(), 104);
        assert_eq!(seq.atom_type(), CHUNK);
        assert_eq!(seq.events(SEQ).count(), 0);
    }

    #[test]
    fn test_buffer_is_aligned() {
        let mut seq = AtomSequence::new(64);
        assert_eq!(seq.as_mut_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_raw_event_is_padded() {
        let mut seq = AtomSequence::new(256);
        seq.clear(SEQ);
        assert!(seq.forge().raw(5, MIDI, &[0x90, 60, 100]));
        assert!(seq.forge().raw(7, MIDI, &[0x80, 60, 0]));
        // sequence body + 2 * pad(16 + 3)
        assert_eq!(seq.atom_size(), 8 + 24 + 24);

        let events: Vec<_> = seq.events(SEQ).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].frames, 5);
        assert_eq!(events[0].type_, MIDI);
        assert_eq!(events[0].body, &[0x90, 60, 100]);
        assert_eq!(events[1].frames, 7);
    }

    #[test]
    fn test_object_properties() {
        let mut seq = AtomSequence::new(256);
        seq.clear(SEQ);
        let props = [
            (40, AtomValue::Int(1)),
            (41, AtomValue::Bool(true)),
            (42, AtomValue::Float(440.0)),
        ];
        assert!(seq.forge().object(10, OBJECT, 30, &TYPES, &props));

        let event = seq.events(SEQ).next().unwrap();
        assert_eq!(event.type_, OBJECT);
        let object = event.object().unwrap();
        assert_eq!(object.otype, 30);
        assert_eq!(object.properties().count(), 3);
        assert_eq!(object.get(40).unwrap().as_i32(), Some(1));
        assert_eq!(object.get(41).unwrap().type_, TYPES.bool_);
        assert_eq!(object.get(41).unwrap().as_bool(), Some(true));
        assert_eq!(object.get(42).unwrap().as_f32(), Some(440.0));
        assert!(object.get(99).is_none());
    }

    #[test]
    fn test_overflow_leaves_sequence_untouched() {
        // Room for the sequence body and exactly one MIDI event.
        let mut seq = AtomSequence::new(8 + 24);
        seq.clear(SEQ);
        assert!(seq.forge().raw(0, MIDI, &[0x90, 60, 100]));
        assert_eq!(seq.remaining(), 0);
        assert!(!seq.forge().raw(1, MIDI, &[0x80, 60, 0]));
        assert!(!seq.forge().object(1, OBJECT, 30, &TYPES, &[]));
        assert_eq!(seq.events(SEQ).count(), 1);
    }
}
