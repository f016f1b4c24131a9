//! Test helpers and fixtures for Lovely integration tests
//!
//! Instruments are built on the in-memory mock backend, so nothing here needs
//! LV2 plugins installed. Each fixture plugin keeps a shared log of the calls
//! and events it received.

#![allow(dead_code)]

pub mod tolerances;

use lovely::host::mock::{MockLog, MockPluginSpec, MockSource};
use lovely::prelude::*;
use std::sync::Arc;

pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Frames per test period.
pub const TEST_BLOCK: usize = 128;

pub const STEREO_URI: &str = "urn:lovely:test:stereo";
pub const MONO_URI: &str = "urn:lovely:test:mono";
pub const MIDI_URI: &str = "urn:lovely:test:midi";
pub const BROKEN_URI: &str = "urn:lovely:test:broken";
pub const EFFECT_URI: &str = "urn:lovely:test:effect";

/// Fixture plugins with their logs.
pub struct Fixture {
    pub instrument: LovelyInstrument,
    pub stereo: MockLog,
    pub mono: MockLog,
    pub midi: MockLog,
}

/// An instrument over a registry holding every fixture plugin, plus an
/// effect without audio outputs that discovery must reject.
pub fn fixture() -> Fixture {
    let stereo = MockPluginSpec::stereo_synth(STEREO_URI)
        .name("Stereo Synth")
        .preset(
            "Soft",
            PluginState::default().with_value("gain", StateValue::Float(0.5)),
        )
        .preset(
            "Loud",
            PluginState::default().with_value("gain", StateValue::Float(2.0)),
        );
    let mono = MockPluginSpec::mono_synth(MONO_URI).name("Mono Synth");
    let midi = MockPluginSpec::midi_synth(MIDI_URI).name("MIDI Synth");
    let broken = MockPluginSpec::stereo_synth(BROKEN_URI).failing();
    let effect = MockPluginSpec::new(EFFECT_URI)
        .port(lovely::host::PortInfo::audio_input(0, "in"));

    let logs = (stereo.log(), mono.log(), midi.log());
    let source = MockSource::new()
        .with_plugin(stereo)
        .with_plugin(mono)
        .with_plugin(midi)
        .with_plugin(broken)
        .with_plugin(effect);

    let instrument = LovelyInstrument::builder()
        .registry(Arc::new(Registry::new(source)))
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(TEST_BLOCK)
        .build()
        .expect("Failed to create test instrument");

    Fixture {
        instrument,
        stereo: logs.0,
        mono: logs.1,
        midi: logs.2,
    }
}

/// Renders one period of `frames` frames.
pub fn render(instrument: &LovelyInstrument, frames: usize) -> Vec<[f32; 2]> {
    let mut period = vec![[0.0f32; 2]; frames];
    instrument.play(&mut period);
    period
}

pub fn is_silent(period: &[[f32; 2]]) -> bool {
    period
        .iter()
        .all(|f| f[0].abs() < tolerances::SILENCE_THRESHOLD && f[1].abs() < tolerances::SILENCE_THRESHOLD)
}
