use approx::assert_relative_eq;
use encore_domain_notes::import_midi_bytes;
use midly::num::{u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

fn build_midi(track: Vec<TrackEvent<'static>>) -> Vec<u8> {
    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(480.into()),
        },
        tracks: vec![track],
    };
    let mut data = Vec::new();
    smf.write(&mut data).expect("midi write should succeed");
    data
}

fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        },
    }
}

fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(64),
            },
        },
    }
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

#[test]
fn midi_import_uses_default_tempo_without_tempo_events() {
    // 480 ticks per quarter at 120 bpm: one quarter is 0.5 s.
    let track = vec![
        note_on(0, 60, 100),
        note_off(480, 60),
        note_on(0, 64, 90),
        note_off(480, 64),
        end_of_track(),
    ];

    let notes = import_midi_bytes(&build_midi(track)).expect("import should succeed");

    assert_eq!(notes.len(), 2);
    assert_eq!(notes.onsets(60), &[0.0]);
    assert_relative_eq!(notes.onsets(64)[0], 0.5, epsilon = 1e-9);
}

#[test]
fn midi_import_follows_tempo_changes() {
    let track = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1_000_000))),
        },
        note_on(480, 60, 100),
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(250_000))),
        },
        note_on(480, 62, 100),
        end_of_track(),
    ];

    let notes = import_midi_bytes(&build_midi(track)).expect("import should succeed");

    assert_relative_eq!(notes.onsets(60)[0], 1.0, epsilon = 1e-9);
    assert_relative_eq!(notes.onsets(62)[0], 1.25, epsilon = 1e-9);
}

#[test]
fn midi_import_ignores_zero_velocity_note_on() {
    let track = vec![
        note_on(0, 60, 100),
        // Running-status style note off.
        note_on(240, 60, 0),
        end_of_track(),
    ];

    let notes = import_midi_bytes(&build_midi(track)).expect("import should succeed");

    assert_eq!(notes.len(), 1);
    assert_eq!(notes.onsets(60), &[0.0]);
}

#[test]
fn midi_import_rejects_garbage() {
    assert!(import_midi_bytes(b"not a midi file").is_err());
}
