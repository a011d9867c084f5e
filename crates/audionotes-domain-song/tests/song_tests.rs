use audionotes_domain_song::{validate_notes, MergeOutcome, Note, NoteError, NoteOrigin, Song};
use audionotes_ports::transcription::NoteDto;
use pretty_assertions::assert_eq;

fn dto(pitch: i32, start: f64, duration: f64, velocity: i32) -> NoteDto {
    NoteDto {
        pitch,
        start,
        duration,
        velocity,
    }
}

fn note(pitch: u8, start: f64, duration: f64, origin: NoteOrigin) -> Note {
    Note::new(pitch, start, duration, 100, origin).expect("valid note")
}

#[test]
fn validation_drops_out_of_range_notes() {
    let raw = vec![
        dto(60, 0.0, 1.0, 100),
        dto(128, 0.0, 1.0, 100),
        dto(-1, 0.0, 1.0, 100),
        dto(60, 0.0, 0.0, 100),
        dto(60, 0.0, -1.0, 100),
        dto(60, 0.0, 1.0, 0),
        dto(60, 0.0, 1.0, 128),
        dto(60, -0.5, 1.0, 100),
        dto(60, f64::NAN, 1.0, 100),
        dto(127, 2.0, 0.5, 1),
    ];

    let notes = validate_notes(&raw, NoteOrigin::Captured);
    assert_eq!(notes.len(), 2);
    for note in &notes {
        assert!(note.duration > 0.0);
        assert!(note.pitch <= 127);
        assert!((1..=127).contains(&note.velocity));
        assert_eq!(note.origin, NoteOrigin::Captured);
    }
}

#[test]
fn note_errors_name_the_broken_field() {
    assert_eq!(
        Note::new(60, 0.0, 0.0, 100, NoteOrigin::Captured),
        Err(NoteError::InvalidDuration(0.0))
    );
    assert_eq!(
        Note::from_dto(&dto(60, 0.0, 1.0, 0), NoteOrigin::Generated),
        Err(NoteError::VelocityOutOfRange(0))
    );
    assert_eq!(
        Note::from_dto(&dto(200, 0.0, 1.0, 90), NoteOrigin::Generated),
        Err(NoteError::PitchOutOfRange(200))
    );
}

#[test]
fn load_captured_sorts_and_applies_duration_floor() {
    let mut song = Song::new(10.0);
    let total = song.load_captured(
        vec![
            note(64, 2.0, 1.0, NoteOrigin::Captured),
            note(60, 0.0, 1.0, NoteOrigin::Captured),
        ],
        3.0,
    );

    assert_eq!(total, 10.0);
    let starts: Vec<f64> = song.notes().iter().map(|n| n.start).collect();
    assert_eq!(starts, vec![0.0, 2.0]);
}

#[test]
fn load_captured_uses_longest_of_service_duration_and_notes() {
    let mut song = Song::new(10.0);
    assert_eq!(
        song.load_captured(vec![note(60, 11.0, 1.5, NoteOrigin::Captured)], 4.0),
        12.5
    );
    assert_eq!(
        song.load_captured(vec![note(60, 0.0, 1.0, NoteOrigin::Captured)], 14.0),
        14.0
    );
}

#[test]
fn load_captured_replaces_generated_notes_too() {
    let mut song = Song::new(10.0);
    song.load_captured(vec![note(60, 0.0, 1.0, NoteOrigin::Captured)], 0.0);
    song.merge_generated(vec![note(48, 0.0, 2.0, NoteOrigin::Generated)]);
    song.load_captured(vec![note(62, 1.0, 1.0, NoteOrigin::Captured)], 0.0);

    assert_eq!(song.notes().len(), 1);
    assert_eq!(song.notes()[0].pitch, 62);
}

#[test]
fn merge_concatenates_and_resorts() {
    let mut song = Song::new(10.0);
    song.load_captured(
        vec![
            note(60, 0.0, 1.0, NoteOrigin::Captured),
            note(62, 4.0, 1.0, NoteOrigin::Captured),
        ],
        0.0,
    );

    let outcome = song.merge_generated(vec![
        note(48, 2.0, 1.0, NoteOrigin::Captured),
        note(43, 11.0, 2.0, NoteOrigin::Generated),
    ]);

    assert_eq!(
        outcome,
        MergeOutcome::Merged {
            added: 2,
            total_duration: 13.0
        }
    );
    let order: Vec<(u8, NoteOrigin)> = song.notes().iter().map(|n| (n.pitch, n.origin)).collect();
    assert_eq!(
        order,
        vec![
            (60, NoteOrigin::Captured),
            (48, NoteOrigin::Generated),
            (62, NoteOrigin::Captured),
            (43, NoteOrigin::Generated),
        ]
    );
}

#[test]
fn merging_empty_result_changes_nothing() {
    let mut song = Song::new(10.0);
    song.load_captured(vec![note(60, 0.0, 1.0, NoteOrigin::Captured)], 0.0);
    song.merge_generated(vec![note(48, 0.5, 1.0, NoteOrigin::Generated)]);
    let before = song.notes().to_vec();
    let total_before = song.total_duration();

    assert_eq!(song.merge_generated(Vec::new()), MergeOutcome::Unchanged);
    assert_eq!(song.notes(), before.as_slice());
    assert_eq!(song.total_duration(), total_before);
}

#[test]
fn regeneration_replaces_previous_accompaniment() {
    let mut song = Song::new(10.0);
    song.load_captured(vec![note(60, 0.0, 1.0, NoteOrigin::Captured)], 0.0);
    song.merge_generated(vec![note(48, 0.0, 1.0, NoteOrigin::Generated)]);
    song.merge_generated(vec![note(50, 0.0, 1.0, NoteOrigin::Generated)]);

    let generated: Vec<u8> = song
        .notes()
        .iter()
        .filter(|n| n.origin == NoteOrigin::Generated)
        .map(|n| n.pitch)
        .collect();
    assert_eq!(generated, vec![50]);
    assert!(song.has_captured());
}

#[test]
fn clear_restores_floor() {
    let mut song = Song::new(10.0);
    song.load_captured(vec![note(60, 20.0, 1.0, NoteOrigin::Captured)], 0.0);
    song.clear();
    assert!(song.is_empty());
    assert_eq!(song.total_duration(), 10.0);
}
