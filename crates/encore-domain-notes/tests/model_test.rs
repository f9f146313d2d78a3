use encore_domain_notes::NoteSequence;
use encore_ports::notes::NoteEvent;
use pretty_assertions::assert_eq;

fn seq(events: &[(u8, f64)]) -> NoteSequence {
    events
        .iter()
        .filter_map(|&(pitch, onset)| NoteEvent::new(pitch, onset))
        .collect()
}

#[test]
fn slice_is_half_open() {
    let notes = seq(&[(60, 0.0), (60, 1.0), (60, 2.0), (61, 1.99), (61, 3.0)]);

    let window = notes.slice(1.0, 2.0);

    assert_eq!(window.onsets(60), &[1.0]);
    assert_eq!(window.onsets(61), &[1.99]);
    assert_eq!(window.len(), 2);
}

#[test]
fn shifted_moves_every_onset() {
    let notes = seq(&[(60, 0.25), (72, 1.0)]).shifted(4.0);

    assert_eq!(notes.onsets(60), &[4.25]);
    assert_eq!(notes.onsets(72), &[5.0]);
    assert_eq!(notes.last_onset(), Some(5.0));
}

#[test]
fn events_are_time_ordered() {
    let notes = seq(&[(72, 0.5), (60, 0.5), (64, 0.1)]);

    let order: Vec<u8> = notes.events().iter().map(|e| e.pitch).collect();

    assert_eq!(order, vec![64, 60, 72]);
}
