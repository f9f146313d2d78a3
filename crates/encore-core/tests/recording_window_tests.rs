use encore_core::RecordingWindow;
use pretty_assertions::assert_eq;

#[test]
fn chunk_ready_once_overlap_fills() {
    let mut window = RecordingWindow::new(6, 2);

    let advance = window.append(&[1.0]);
    assert_eq!(advance.consumed, 1);
    assert!(!advance.chunk_ready);

    let advance = window.append(&[2.0, 3.0, 4.0]);
    assert_eq!(advance.consumed, 1);
    assert!(advance.chunk_ready);

    let chunk = window.chunk();
    assert_eq!(chunk.samples, &[0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
    assert_eq!(chunk.valid_frames, 2);
    assert_eq!(window.pending_frames(), 0);
}

#[test]
fn chunks_overlap_without_gaps_or_duplicates() {
    let mut window = RecordingWindow::new(4, 2);
    let input: Vec<f32> = (1..=8).map(|v| v as f32).collect();

    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < input.len() {
        let advance = window.append(&input[offset..]);
        offset += advance.consumed;
        if advance.chunk_ready {
            let chunk = window.chunk();
            chunks.push((chunk.samples.to_vec(), chunk.valid_frames));
        }
    }

    assert_eq!(
        chunks,
        vec![
            (vec![0.0, 0.0, 1.0, 2.0], 2),
            (vec![1.0, 2.0, 3.0, 4.0], 4),
            (vec![3.0, 4.0, 5.0, 6.0], 4),
            (vec![5.0, 6.0, 7.0, 8.0], 4),
        ]
    );
}

#[test]
fn every_chunk_has_the_full_main_length() {
    let mut window = RecordingWindow::new(10, 3);
    for _ in 0..7 {
        let advance = window.append(&[0.5; 5]);
        if advance.chunk_ready {
            assert_eq!(window.chunk().samples.len(), 10);
        }
    }
}

#[test]
fn reset_discards_captured_audio() {
    let mut window = RecordingWindow::new(4, 2);
    window.append(&[1.0, 2.0]);
    window.append(&[3.0]);

    window.reset();

    assert_eq!(window.pending_frames(), 0);
    assert_eq!(window.valid_frames(), 0);
    let advance = window.append(&[9.0, 9.0]);
    assert!(advance.chunk_ready);
    assert_eq!(window.chunk().samples, &[0.0, 0.0, 9.0, 9.0]);
}

#[test]
fn flush_shifts_in_a_partial_overlap() {
    let mut window = RecordingWindow::new(5, 2);
    window.append(&[1.0, 2.0]);
    window.append(&[3.0]);

    assert!(window.flush());

    let chunk = window.chunk();
    assert_eq!(chunk.samples, &[0.0, 0.0, 1.0, 2.0, 3.0]);
    assert_eq!(chunk.valid_frames, 3);
    assert_eq!(window.pending_frames(), 0);
    assert!(!window.flush());
}
