mod support;

use audionotes_core::{TickOutcome, TransportClock};
use audionotes_ports::playback::LoopRange;
use pretty_assertions::assert_eq;
use support::assert_close;

fn loaded(total: f64) -> TransportClock {
    let mut transport = TransportClock::new(total);
    transport.load_song(total, true);
    transport
}

#[test]
fn play_is_noop_without_notes() {
    let mut transport = TransportClock::new(10.0);
    transport.load_song(10.0, false);
    assert_eq!(transport.play(None, 0.0), None);
    assert!(!transport.is_playing());
}

#[test]
fn play_is_refused_while_recording() {
    let mut transport = loaded(10.0);
    transport.set_recording(true);
    assert_eq!(transport.play(None, 0.0), None);
}

#[test]
fn play_twice_keeps_first_anchor() {
    let mut transport = loaded(10.0);
    let first = transport.play(Some(2.0), 1.0).expect("starts");
    assert_eq!(transport.play(Some(5.0), 3.0), None);
    assert_close(first.reference_device_time, 1.0);
    assert_close(first.offset, 2.0);
}

#[test]
fn play_outside_loop_starts_at_loop_start() {
    let mut transport = loaded(10.0);
    transport.set_loop(2.0, 5.0, 0.0);

    let intent = transport.play(Some(7.0), 0.0).expect("starts");
    assert_close(intent.offset, 2.0);
    assert_eq!(
        intent.loop_window,
        Some(LoopRange {
            start: 2.0,
            end: 5.0
        })
    );

    transport.stop();
    let intent = transport.play(Some(5.0), 0.0).expect("starts");
    assert_close(intent.offset, 2.0);
}

#[test]
fn scrub_clamps_into_song() {
    let mut transport = loaded(10.0);
    assert_eq!(transport.scrub(-3.0, 0.0), None);
    assert_close(transport.song_position(), 0.0);
    transport.scrub(42.0, 0.0);
    assert_close(transport.song_position(), 10.0);
    transport.scrub(f64::NAN, 0.0);
    assert_close(transport.song_position(), 0.0);
}

#[test]
fn scrub_while_playing_restarts_from_new_position() {
    let mut transport = loaded(10.0);
    transport.set_loop(0.0, 0.0, 0.0);
    let first = transport.play(None, 0.0).expect("starts");

    let restart = transport.scrub(4.0, 1.5).expect("restarts");
    assert!(restart.pass > first.pass);
    assert_close(restart.offset, 4.0);
    assert_close(restart.reference_device_time, 1.5);
    assert!(transport.is_playing());
}

#[test]
fn set_loop_orders_and_clamps_inputs() {
    let mut transport = loaded(10.0);
    transport.set_loop(5.0, 2.0, 0.0);
    assert_eq!(
        transport.loop_range(),
        LoopRange {
            start: 2.0,
            end: 5.0
        }
    );

    transport.set_loop(-4.0, 30.0, 0.0);
    assert_eq!(
        transport.loop_range(),
        LoopRange {
            start: 0.0,
            end: 10.0
        }
    );
}

#[test]
fn set_loop_while_playing_keeps_position_inside_range() {
    let mut transport = loaded(10.0);
    transport.play(Some(1.0), 0.0).expect("starts");
    transport.tick(7.0);
    assert_close(transport.song_position(), 8.0);

    let intent = transport.set_loop(2.0, 5.0, 7.0).expect("restarts");
    assert_close(intent.offset, 2.0);
}

#[test]
fn looped_wrap_happens_within_one_tick() {
    let mut transport = loaded(10.0);
    transport.set_loop(2.0, 5.0, 0.0);
    transport.play(Some(2.0), 0.0).expect("starts");

    match transport.tick(3.2) {
        TickOutcome::Wrapped { position } => assert_close(position, 2.2),
        other => panic!("expected wrap, got {other:?}"),
    }
    match transport.tick(3.5) {
        TickOutcome::Advanced { position } => assert_close(position, 2.5),
        other => panic!("expected advance, got {other:?}"),
    }
}

#[test]
fn unlooped_playback_stops_at_total_duration() {
    let mut transport = loaded(10.0);
    transport.set_loop(0.0, 0.0, 0.0);
    transport.play(Some(9.0), 100.0).expect("starts");

    assert_eq!(
        transport.tick(100.5),
        TickOutcome::Advanced { position: 9.5 }
    );
    assert_eq!(
        transport.tick(101.2),
        TickOutcome::Finished { position: 10.0 }
    );
    assert!(!transport.is_playing());
    assert_close(transport.song_position(), 10.0);
    assert_eq!(transport.tick(102.0), TickOutcome::Idle);
}

#[test]
fn stop_is_idempotent_and_keeps_position() {
    let mut transport = loaded(10.0);
    transport.play(None, 0.0).expect("starts");
    transport.tick(3.0);

    assert!(transport.stop());
    assert!(!transport.stop());
    assert_close(transport.song_position(), 3.0);
}

#[test]
fn repeated_wraps_do_not_drift() {
    let mut transport = loaded(20.0);
    transport.set_loop(1.0, 4.0, 0.0);
    transport.play(Some(1.0), 0.0).expect("starts");

    for frame in 1..=60_000u32 {
        let now = frame as f64 * 0.016;
        transport.tick(now);
        let expected = 1.0 + now % 3.0;
        let position = transport.song_position();
        let diff = (position - expected).abs();
        // Right at the boundary either end of the loop is the same instant.
        let diff = diff.min((diff - 3.0).abs());
        assert!(diff < 1e-6, "frame {frame}: {position} vs {expected}");
    }
}

#[test]
fn upcoming_loop_pass_is_queued_once_per_pass() {
    let mut transport = loaded(10.0);
    transport.set_loop(0.0, 2.0, 0.0);
    let first = transport.play(Some(0.0), 0.0).expect("starts");

    assert_eq!(transport.upcoming_loop_pass(1.85, 0.1), None);
    let next = transport
        .upcoming_loop_pass(1.95, 0.1)
        .expect("next pass queued");
    assert_close(next.reference_device_time, 2.0);
    assert_close(next.offset, 0.0);
    assert!(next.pass > first.pass);
    assert_eq!(transport.upcoming_loop_pass(1.96, 0.1), None);

    transport.tick(2.05);
    assert_eq!(transport.upcoming_loop_pass(2.05, 0.1), None);
    let after = transport
        .upcoming_loop_pass(3.95, 0.1)
        .expect("following pass queued");
    assert_close(after.reference_device_time, 4.0);
    assert!(after.pass > next.pass);
}

#[test]
fn missed_pass_is_scheduled_after_wrap() {
    let mut transport = loaded(10.0);
    transport.set_loop(0.0, 2.0, 0.0);
    transport.play(Some(0.0), 0.0).expect("starts");

    transport.tick(2.5);
    let catch_up = transport
        .upcoming_loop_pass(2.5, 0.1)
        .expect("current pass scheduled late");
    assert_close(catch_up.reference_device_time, 2.0);
    assert_close(catch_up.offset, 0.0);
}

#[test]
fn no_loop_passes_without_loop() {
    let mut transport = loaded(10.0);
    transport.set_loop(3.0, 3.0, 0.0);
    transport.play(None, 0.0).expect("starts");
    assert_eq!(transport.upcoming_loop_pass(9.95, 0.1), None);
}

#[test]
fn set_song_clamps_loop_and_position() {
    let mut transport = loaded(20.0);
    transport.set_loop(5.0, 18.0, 0.0);
    transport.scrub(15.0, 0.0);

    transport.set_song(12.0, true);
    assert_eq!(
        transport.loop_range(),
        LoopRange {
            start: 5.0,
            end: 12.0
        }
    );
    assert_close(transport.song_position(), 12.0);
}

#[test]
fn reset_clears_loop_and_recording() {
    let mut transport = loaded(10.0);
    transport.set_recording(true);
    transport.reset(10.0);

    let snapshot = transport.snapshot();
    assert!(!snapshot.is_recording);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.loop_range, LoopRange::default());
    assert_close(snapshot.song_position, 0.0);
}
