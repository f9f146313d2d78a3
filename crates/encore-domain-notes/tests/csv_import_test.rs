use encore_domain_notes::{import_note_csv_str, NotesImportError};
use pretty_assertions::assert_eq;

#[test]
fn csv_import_reads_onsets_grouped_by_pitch() {
    let data = "\
start_time_s,end_time_s,pitch_midi,velocity,pitch_bend
0.5,0.9,60,80,
0.1,0.4,60,80,
0.2,0.3,64,70,0
";
    let notes = import_note_csv_str(data).expect("import should succeed");

    assert_eq!(notes.len(), 3);
    assert_eq!(notes.onsets(60), &[0.1, 0.5]);
    assert_eq!(notes.onsets(64), &[0.2]);
    assert_eq!(notes.pitches().collect::<Vec<_>>(), vec![60, 64]);
}

#[test]
fn csv_import_sniffs_tab_and_semicolon_delimiters() {
    let tabbed = "pitch_midi\tstart_time_s\n62\t1.5\n";
    let notes = import_note_csv_str(tabbed).expect("tab import should succeed");
    assert_eq!(notes.onsets(62), &[1.5]);

    let semi = "start_time_s;pitch_midi\n2.0;70.0\n";
    let notes = import_note_csv_str(semi).expect("semicolon import should succeed");
    assert_eq!(notes.onsets(70), &[2.0]);
}

#[test]
fn csv_import_header_only_is_empty() {
    let notes = import_note_csv_str("start_time_s,pitch_midi\n").expect("import should succeed");
    assert!(notes.is_empty());

    let notes = import_note_csv_str("").expect("empty input should succeed");
    assert!(notes.is_empty());
}

#[test]
fn csv_import_requires_onset_and_pitch_columns() {
    let err = import_note_csv_str("end_time_s,pitch_midi\n1.0,60\n").unwrap_err();
    assert!(matches!(err, NotesImportError::Parse(msg) if msg.contains("start_time_s")));
}

#[test]
fn csv_import_rejects_out_of_range_pitch() {
    let err = import_note_csv_str("start_time_s,pitch_midi\n0.1,128\n").unwrap_err();
    assert!(matches!(err, NotesImportError::Parse(_)));

    let err = import_note_csv_str("start_time_s,pitch_midi\nabc,60\n").unwrap_err();
    assert!(matches!(err, NotesImportError::Parse(_)));
}
