//! Buffers connected to plugin ports.

use crate::atom::AtomSequence;
use crate::descriptor::{PortDescriptor, PortFlow, PortKind};
use crate::uris::Urids;
use std::ffi::c_void;

/// Storage for one port, typed by the port's kind.
#[derive(Debug, Clone)]
pub enum PortBuffer {
    Control(f32),
    Audio(Vec<f32>),
    Event(AtomSequence),
}

impl PortBuffer {
    /// Control ports start at their default, audio ports at `block_size`
    /// zeros, event ports empty (inputs) or primed (outputs).
    pub fn for_port(
        port: &PortDescriptor,
        block_size: usize,
        sequence_capacity: usize,
        urids: &Urids,
    ) -> Self {
        match port.kind {
            PortKind::Control { default, .. } => PortBuffer::Control(default),
            PortKind::Audio => PortBuffer::Audio(vec![0.0; block_size]),
            PortKind::Event { .. } => {
                let mut buffer = PortBuffer::Event(AtomSequence::new(sequence_capacity));
                buffer.reset(port.flow, urids);
                buffer
            }
            PortKind::Unsupported => PortBuffer::Control(0.0),
        }
    }

    /// Pointer handed to `connect_port`. Stable until the buffer is grown.
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            PortBuffer::Control(value) => (value as *mut f32).cast(),
            PortBuffer::Audio(samples) => samples.as_mut_ptr().cast(),
            PortBuffer::Event(seq) => seq.as_mut_ptr(),
        }
    }

    /// Prepares an event buffer for the next block. Other kinds are left as
    /// they are: their outputs are read after `run`.
    pub fn reset(&mut self, flow: PortFlow, urids: &Urids) {
        if let PortBuffer::Event(seq) = self {
            match flow {
                PortFlow::Input => seq.clear(urids.atom_sequence),
                PortFlow::Output => seq.prime_output(urids.atom_chunk),
            }
        }
    }

    /// Grows an audio buffer to at least `frames` samples, zero-filling the
    /// new tail. Never shrinks.
    pub fn grow(&mut self, frames: usize) {
        if let PortBuffer::Audio(samples) = self {
            if samples.len() < frames {
                samples.resize(frames, 0.0);
            }
        }
    }

    pub fn value(&self) -> Option<f32> {
        match self {
            PortBuffer::Control(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns `false` if this is not a control buffer.
    pub fn set_value(&mut self, value: f32) -> bool {
        match self {
            PortBuffer::Control(v) => {
                *v = value;
                true
            }
            _ => false,
        }
    }

    pub fn samples(&self) -> Option<&[f32]> {
        match self {
            PortBuffer::Audio(samples) => Some(samples),
            _ => None,
        }
    }

    pub fn samples_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            PortBuffer::Audio(samples) => Some(samples),
            _ => None,
        }
    }

    pub fn sequence(&self) -> Option<&AtomSequence> {
        match self {
            PortBuffer::Event(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn sequence_mut(&mut self) -> Option<&mut AtomSequence> {
        match self {
            PortBuffer::Event(seq) => Some(seq),
            _ => None,
        }
    }

    /// Samples for audio, bytes for events, 1 for control.
    pub fn capacity(&self) -> usize {
        match self {
            PortBuffer::Control(_) => 1,
            PortBuffer::Audio(samples) => samples.len(),
            PortBuffer::Event(seq) => seq.capacity(),
        }
    }
}
