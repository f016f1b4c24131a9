//! Integration tests for the host-facing instrument
//!
//! Drives `LovelyInstrument` the way a host does: pick a plugin from the
//! registry, play notes, render periods, swap plugins and save/restore
//! project settings.
//!
//! Run with:
//! ```bash
//! cargo test -p lovely --test instrument_integration
//! ```

mod helpers;

use approx::assert_abs_diff_eq;
use helpers::tolerances::FLOAT_EPSILON;
use helpers::*;
use lovely::host::mock::{MockCall, MockEvent};
use lovely::prelude::*;
use lovely::{HostError, Incompatibility};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn assert_dc(period: &[[f32; 2]], level: f32) {
    for frame in period {
        assert_abs_diff_eq!(frame[0], level, epsilon = FLOAT_EPSILON);
        assert_abs_diff_eq!(frame[1], level, epsilon = FLOAT_EPSILON);
    }
}

#[test]
fn test_plugin_picker_lists_usable_plugins() {
    let fx = fixture();
    let registry = fx.instrument.registry();

    assert_eq!(registry.number_of_plugins(), 4);
    assert_eq!(registry.descriptor_at(0).unwrap().uri(), STEREO_URI);
    assert_eq!(registry.descriptor_at(0).unwrap().name(), "Stereo Synth");
    assert!(matches!(
        registry.descriptor_at(4),
        Err(HostError::IndexOutOfRange { index: 4, len: 4 })
    ));

    assert!(registry.descriptor(EFFECT_URI).is_none());
    let rejected = registry.rejected();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].uri, EFFECT_URI);
    assert!(rejected[0].reasons.contains(&Incompatibility::NoAudioOutput));
}

#[test]
fn test_empty_instrument_renders_silence() {
    let fx = fixture();
    assert!(fx.instrument.plugin_uri().is_none());
    assert!(is_silent(&render(&fx.instrument, TEST_BLOCK)));
    assert!(fx.instrument.play_note(0, 440.0, 1.0, 0.0).is_none());
}

#[test]
fn test_stereo_plugin_renders() {
    let fx = fixture();
    fx.instrument.load_plugin(STEREO_URI).unwrap();
    assert!(fx.instrument.is_ready());
    assert_dc(&render(&fx.instrument, TEST_BLOCK), 1.0);
    assert_eq!(
        fx.stereo.lifecycle(),
        vec![MockCall::Instantiate, MockCall::Activate, MockCall::Run(TEST_BLOCK as u32)]
    );
}

#[test]
fn test_mono_plugin_fills_both_channels() {
    let fx = fixture();
    fx.instrument.load_plugin(MONO_URI).unwrap();
    assert_dc(&render(&fx.instrument, TEST_BLOCK), 1.0);
    assert!(fx.mono.events().is_empty());
}

#[test]
fn test_period_longer_than_block_size() {
    let fx = fixture();
    fx.instrument.load_plugin(STEREO_URI).unwrap();
    assert_dc(&render(&fx.instrument, TEST_BLOCK * 4), 1.0);
    assert_dc(&render(&fx.instrument, TEST_BLOCK / 2), 1.0);
}

#[test]
fn test_note_reaches_plugin_once() {
    let fx = fixture();
    fx.instrument.load_plugin(STEREO_URI).unwrap();

    let id = fx.instrument.play_note(10, 440.0, 0.8, 0.0).unwrap();
    render(&fx.instrument, TEST_BLOCK);
    assert_eq!(
        fx.stereo.events(),
        vec![MockEvent::Note {
            frame: 10,
            id: Some(id.get() as i32),
            gate: Some(true),
            frequency: Some(440.0),
            velocity: Some(0.8),
            pan: Some(0.0),
        }]
    );

    // Same parameters again: nothing new is sent.
    assert!(fx.instrument.update_note(id, 0, 440.0, 0.8, 0.0));
    render(&fx.instrument, TEST_BLOCK);
    assert_eq!(fx.stereo.events().len(), 1);

    fx.instrument.update_note(id, 3, 445.0, 0.8, 0.0);
    render(&fx.instrument, TEST_BLOCK);
    let events = fx.stereo.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[1],
        MockEvent::Note { frame: 3, frequency: Some(f), gate: None, .. } if f == 445.0
    ));
}

#[test]
fn test_release_and_delete_send_one_gate_off() {
    let fx = fixture();
    fx.instrument.load_plugin(STEREO_URI).unwrap();

    let released = fx.instrument.play_note(0, 220.0, 1.0, 0.0).unwrap();
    let deleted = fx.instrument.play_note(0, 330.0, 1.0, 0.0).unwrap();
    render(&fx.instrument, TEST_BLOCK);

    fx.instrument.release_note(released, 5);
    fx.instrument.delete_note(released, 6);
    fx.instrument.delete_note(deleted, 7);
    fx.instrument.delete_note(deleted, 8);
    render(&fx.instrument, TEST_BLOCK);

    let gate_offs: Vec<i64> = fx
        .stereo
        .events()
        .iter()
        .filter(|e| e.gate() == Some(false))
        .map(|e| e.frame())
        .collect();
    assert_eq!(gate_offs, vec![5, 7]);
    assert!(!fx.instrument.update_note(released, 0, 220.0, 1.0, 0.0));
}

#[test]
fn test_midi_only_plugin_gets_note_on_and_off() {
    let fx = fixture();
    fx.instrument.load_plugin(MIDI_URI).unwrap();

    let id = fx.instrument.play_note(4, 440.0, 1.0, 0.0).unwrap();
    render(&fx.instrument, TEST_BLOCK);
    fx.instrument.release_note(id, 2);
    render(&fx.instrument, TEST_BLOCK);

    assert_eq!(
        fx.midi.events(),
        vec![
            MockEvent::Midi {
                frame: 4,
                bytes: vec![0x90, 69, 63],
            },
            MockEvent::Midi {
                frame: 2,
                bytes: vec![0x80, 69, 0],
            },
        ]
    );
}

#[test]
fn test_raw_midi_passthrough() {
    let fx = fixture();
    fx.instrument.load_plugin(MIDI_URI).unwrap();
    fx.instrument.handle_midi_event(9, [0xB0, 7, 100]);
    render(&fx.instrument, TEST_BLOCK);
    assert_eq!(
        fx.midi.events(),
        vec![MockEvent::Midi {
            frame: 9,
            bytes: vec![0xB0, 7, 100],
        }]
    );
}

#[test]
fn test_base_velocity_scales_midi_notes() {
    let fx = fixture();
    fx.instrument.load_plugin(MIDI_URI).unwrap();
    fx.instrument.set_base_velocity(100);
    fx.instrument.play_note(0, 440.0, 0.5, 0.0);
    render(&fx.instrument, TEST_BLOCK);
    assert!(matches!(
        &fx.midi.events()[..],
        [MockEvent::Midi { bytes, .. }] if bytes[2] == 50
    ));
}

#[test]
fn test_broken_plugin_is_silent_and_inert() {
    let fx = fixture();
    fx.instrument.load_plugin(STEREO_URI).unwrap();
    fx.instrument.load_plugin(BROKEN_URI).unwrap();

    assert_eq!(fx.instrument.plugin_uri().as_deref(), Some(BROKEN_URI));
    assert!(!fx.instrument.is_ready());
    assert!(is_silent(&render(&fx.instrument, TEST_BLOCK)));
    assert!(fx.instrument.play_note(0, 440.0, 1.0, 0.0).is_none());
    assert!(matches!(
        fx.instrument.load_preset(0),
        Err(Error::Host(HostError::InvalidInstance))
    ));
}

#[test]
fn test_hot_swap_frees_old_instance_first() {
    let fx = fixture();
    fx.instrument.load_plugin(STEREO_URI).unwrap();
    fx.instrument.play_note(0, 440.0, 1.0, 0.0);
    render(&fx.instrument, TEST_BLOCK);

    fx.instrument.load_plugin(MONO_URI).unwrap();
    assert_eq!(fx.stereo.lifecycle().last(), Some(&MockCall::Free));
    assert!(fx.stereo.freed_before(&fx.mono));
    assert_eq!(fx.stereo.live_instances(), 0);

    // The old voice does not leak into the new plugin.
    render(&fx.instrument, TEST_BLOCK);
    assert!(fx.mono.events().is_empty());
}

#[test]
fn test_presets_sorted_and_applied() {
    let fx = fixture();
    fx.instrument.load_plugin(STEREO_URI).unwrap();

    let names: Vec<String> = fx.instrument.presets().into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["Loud", "Soft"]);

    fx.instrument.load_preset(1).unwrap();
    assert_dc(&render(&fx.instrument, TEST_BLOCK), 0.5);
    fx.instrument.load_preset(0).unwrap();
    assert_dc(&render(&fx.instrument, TEST_BLOCK), 2.0);

    assert!(matches!(
        fx.instrument.load_preset(2),
        Err(Error::Host(HostError::PresetOutOfRange { index: 2, count: 2 }))
    ));
}

#[test]
fn test_settings_round_trip_through_project_file() {
    let fx = fixture();
    fx.instrument.load_plugin(STEREO_URI).unwrap();
    fx.instrument.load_preset(1).unwrap();

    let saved = fx.instrument.save_settings().unwrap();
    assert_eq!(saved.uri.as_deref(), Some(STEREO_URI));
    assert!(saved.state.is_some());
    assert!(saved.state_cdata.is_none());
    let text = serde_json::to_string(&saved).unwrap();

    let restored = fixture();
    let settings: InstrumentSettings = serde_json::from_str(&text).unwrap();
    restored.instrument.load_settings(&settings).unwrap();
    assert_eq!(restored.instrument.plugin_uri().as_deref(), Some(STEREO_URI));
    assert_dc(&render(&restored.instrument, TEST_BLOCK), 0.5);
}

#[test]
fn test_legacy_cdata_settings_load() {
    let fx = fixture();
    let blob = PluginState::new(STEREO_URI)
        .with_value("gain", StateValue::Float(0.25))
        .to_blob()
        .unwrap();
    let settings = InstrumentSettings {
        uri: Some(STEREO_URI.to_string()),
        state: None,
        state_cdata: Some(blob),
    };
    fx.instrument.load_settings(&settings).unwrap();
    assert_dc(&render(&fx.instrument, TEST_BLOCK), 0.25);
}

#[test]
fn test_unknown_symbol_in_saved_state_is_skipped() {
    let fx = fixture();
    let blob = PluginState::new(STEREO_URI)
        .with_value("foo_bar", StateValue::Float(9.0))
        .with_value("gain", StateValue::Double(1.5))
        .to_blob()
        .unwrap();
    let settings = InstrumentSettings {
        uri: Some(STEREO_URI.to_string()),
        state: Some(blob),
        state_cdata: None,
    };
    fx.instrument.load_settings(&settings).unwrap();
    assert_dc(&render(&fx.instrument, TEST_BLOCK), 1.5);
}

#[test]
fn test_malformed_state_is_an_error() {
    let fx = fixture();
    let settings = InstrumentSettings {
        uri: Some(STEREO_URI.to_string()),
        state: Some("not json".to_string()),
        state_cdata: None,
    };
    let err = fx.instrument.load_settings(&settings).unwrap_err();
    assert!(matches!(err, Error::Host(HostError::StateParse(_))));
    // The plugin itself still loaded.
    assert!(fx.instrument.is_ready());
}

#[test]
fn test_settings_without_uri_unload() {
    let fx = fixture();
    fx.instrument.load_plugin(STEREO_URI).unwrap();
    fx.instrument
        .load_settings(&InstrumentSettings::default())
        .unwrap();
    assert!(fx.instrument.plugin_uri().is_none());
    assert_eq!(fx.stereo.live_instances(), 0);
    assert_eq!(fx.instrument.save_settings().unwrap(), InstrumentSettings::default());
}

#[test]
fn test_audio_thread_survives_plugin_swaps() {
    let fx = fixture();
    let instrument = Arc::new(fx.instrument);
    instrument.load_plugin(STEREO_URI).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let audio = {
        let instrument = Arc::clone(&instrument);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut blocks = 0usize;
            while !done.load(Ordering::Acquire) {
                let period = render(&instrument, TEST_BLOCK);
                // Every plugin here outputs DC 1.0, so a block is all-or-nothing.
                assert!(period.iter().all(|f| *f == [1.0, 1.0]) || is_silent(&period));
                blocks += 1;
            }
            blocks
        })
    };

    for i in 0..40 {
        let uri = if i % 2 == 0 { MONO_URI } else { STEREO_URI };
        instrument.load_plugin(uri).unwrap();
        instrument.play_note(0, 440.0, 1.0, 0.0);
    }
    done.store(true, Ordering::Release);
    assert!(audio.join().unwrap() > 0);
}

#[derive(Debug, Clone)]
enum NoteOp {
    Play(f32),
    Release(usize),
    Delete(usize),
    Render,
}

fn note_op() -> impl proptest::strategy::Strategy<Value = NoteOp> {
    use proptest::prelude::*;
    prop_oneof![
        (20.0f32..2000.0).prop_map(NoteOp::Play),
        (0usize..8).prop_map(NoteOp::Release),
        (0usize..8).prop_map(NoteOp::Delete),
        Just(NoteOp::Render),
    ]
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

    #[test]
    fn test_every_voice_gets_at_most_one_gate_off(ops in proptest::collection::vec(note_op(), 1..20)) {
        let fx = fixture();
        fx.instrument.load_plugin(STEREO_URI).unwrap();
        let mut voices = Vec::new();
        for op in ops {
            match op {
                NoteOp::Play(freq) => {
                    voices.extend(fx.instrument.play_note(0, freq, 1.0, 0.0));
                }
                NoteOp::Release(i) => {
                    if let Some(id) = voices.get(i) {
                        fx.instrument.release_note(*id, 0);
                    }
                }
                NoteOp::Delete(i) => {
                    if let Some(id) = voices.get(i) {
                        fx.instrument.delete_note(*id, 0);
                    }
                }
                NoteOp::Render => {
                    render(&fx.instrument, TEST_BLOCK);
                }
            }
        }
        render(&fx.instrument, TEST_BLOCK);

        let events = fx.stereo.events();
        let ons = events.iter().filter(|e| e.gate() == Some(true)).count();
        proptest::prop_assert_eq!(ons, voices.len());
        for id in &voices {
            let offs = events
                .iter()
                .filter(|e| {
                    matches!(e, MockEvent::Note { id: Some(n), gate: Some(false), .. } if *n == id.get() as i32)
                })
                .count();
            proptest::prop_assert!(offs <= 1);
        }
    }
}
