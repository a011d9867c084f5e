use audionotes_ports::playback::{LoopRange, TransportSnapshot};
use audionotes_ports::types::{DeviceTime, SongTime};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
}

/// Maps device time onto song time for one scheduling pass:
/// `song = offset + (device - reference_device_time)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayIntent {
    pub reference_device_time: DeviceTime,
    pub offset: SongTime,
    pub loop_window: Option<LoopRange>,
    pub pass: u64,
}

impl PlayIntent {
    pub fn device_time_of(&self, song_time: SongTime) -> DeviceTime {
        self.reference_device_time + (song_time - self.offset).max(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    Idle,
    Advanced { position: SongTime },
    Wrapped { position: SongTime },
    Finished { position: SongTime },
}

/// Song position derived from the audio device clock.
///
/// The position is never integrated frame by frame; every tick recomputes it
/// from the current reference pair, so frame jitter does not accumulate.
#[derive(Clone, Debug)]
pub struct TransportClock {
    state: TransportState,
    is_recording: bool,
    has_notes: bool,
    song_position: SongTime,
    loop_range: LoopRange,
    total_duration: SongTime,
    reference_device_time: DeviceTime,
    reference_offset: SongTime,
    pass: u64,
    current_pass_scheduled: bool,
    next_pass_queued: bool,
}

impl TransportClock {
    pub fn new(total_duration: SongTime) -> Self {
        Self {
            state: TransportState::Stopped,
            is_recording: false,
            has_notes: false,
            song_position: 0.0,
            loop_range: LoopRange::default(),
            total_duration: sanitize(total_duration).max(0.0),
            reference_device_time: 0.0,
            reference_offset: 0.0,
            pass: 0,
            current_pass_scheduled: false,
            next_pass_queued: false,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.is_recording = recording;
    }

    pub fn song_position(&self) -> SongTime {
        self.song_position
    }

    pub fn loop_range(&self) -> LoopRange {
        self.loop_range
    }

    pub fn total_duration(&self) -> SongTime {
        self.total_duration
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            is_playing: self.is_playing(),
            is_recording: self.is_recording,
            song_position: self.song_position,
            loop_range: self.loop_range,
            total_duration: self.total_duration,
        }
    }

    /// Updates the song extent; loop and position are clamped into it.
    pub fn set_song(&mut self, total_duration: SongTime, has_notes: bool) {
        self.total_duration = sanitize(total_duration).max(0.0);
        self.has_notes = has_notes;
        let start = self.loop_range.start.clamp(0.0, self.total_duration);
        let end = self.loop_range.end.clamp(start, self.total_duration);
        self.loop_range = LoopRange { start, end };
        self.song_position = self.song_position.clamp(0.0, self.total_duration);
    }

    /// Fresh song: stopped at 0 with the loop spanning the whole piece.
    pub fn load_song(&mut self, total_duration: SongTime, has_notes: bool) {
        self.stop();
        self.total_duration = sanitize(total_duration).max(0.0);
        self.has_notes = has_notes;
        self.song_position = 0.0;
        self.loop_range = LoopRange {
            start: 0.0,
            end: self.total_duration,
        };
    }

    /// Starts playback from `from` (or the current position). Returns the
    /// intent the scheduler needs, or `None` when playback cannot start.
    pub fn play(&mut self, from: Option<SongTime>, now: DeviceTime) -> Option<PlayIntent> {
        if self.is_playing() || self.is_recording || !self.has_notes {
            return None;
        }

        let requested = from.filter(|t| t.is_finite()).unwrap_or(self.song_position);
        let mut start = requested.clamp(0.0, self.total_duration);
        if self.loop_range.is_active()
            && (start < self.loop_range.start || start >= self.loop_range.end)
        {
            start = self.loop_range.start;
        }

        self.song_position = start;
        self.reference_device_time = now;
        self.reference_offset = start;
        self.state = TransportState::Playing;
        self.pass += 1;
        self.current_pass_scheduled = true;
        self.next_pass_queued = false;
        debug!(from = start, device_time = now, pass = self.pass, "transport play");

        Some(self.current_intent())
    }

    /// Returns whether playback was running. The position is kept.
    pub fn stop(&mut self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.state = TransportState::Stopped;
        self.current_pass_scheduled = false;
        self.next_pass_queued = false;
        debug!(position = self.song_position, "transport stop");
        true
    }

    /// Moves the position; a running transport restarts from there.
    pub fn scrub(&mut self, time: SongTime, now: DeviceTime) -> Option<PlayIntent> {
        let position = sanitize(time).clamp(0.0, self.total_duration);
        self.song_position = position;
        if self.stop() {
            return self.play(Some(position), now);
        }
        None
    }

    /// Sets the loop window from two arbitrary points. A running transport
    /// restarts from the current position clamped into the new window.
    pub fn set_loop(
        &mut self,
        start: SongTime,
        end: SongTime,
        now: DeviceTime,
    ) -> Option<PlayIntent> {
        let (a, b) = {
            let (a, b) = (sanitize(start), sanitize(end));
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        };
        let start = a.clamp(0.0, self.total_duration);
        let end = b.clamp(start, self.total_duration);
        self.loop_range = LoopRange { start, end };
        debug!(start, end, "loop range set");

        if self.stop() {
            let position = self.song_position.clamp(start, end);
            return self.play(Some(position), now);
        }
        None
    }

    pub fn tick(&mut self, now: DeviceTime) -> TickOutcome {
        if !self.is_playing() {
            return TickOutcome::Idle;
        }

        let mut position = self.reference_offset + (now - self.reference_device_time);
        let mut wrapped = false;

        if self.loop_range.is_active() && self.total_duration > 0.0 {
            let LoopRange { start, end } = self.loop_range;
            let len = end - start;
            if position >= end {
                let elapsed = position - start;
                let into = elapsed % len;
                let passes = (elapsed / len).floor();
                self.reference_offset = start;
                self.reference_device_time = now - into;
                position = start + into;
                self.current_pass_scheduled = self.next_pass_queued && passes < 2.0;
                self.next_pass_queued = false;
                wrapped = true;
            }
            position = position.clamp(start, end);
        } else if self.total_duration > 0.0 && position >= self.total_duration {
            self.song_position = self.total_duration;
            self.stop();
            return TickOutcome::Finished {
                position: self.total_duration,
            };
        } else if self.total_duration <= 0.0 {
            position = 0.0;
        }

        self.song_position = position.max(0.0);
        if wrapped {
            debug!(position = self.song_position, "loop wrapped");
            TickOutcome::Wrapped {
                position: self.song_position,
            }
        } else {
            TickOutcome::Advanced {
                position: self.song_position,
            }
        }
    }

    /// Intent for the loop pass the scheduler has not covered yet, if it
    /// starts within `lookahead` seconds. Each pass is handed out once.
    pub fn upcoming_loop_pass(
        &mut self,
        now: DeviceTime,
        lookahead: DeviceTime,
    ) -> Option<PlayIntent> {
        if !self.is_playing() || !self.loop_range.is_active() {
            return None;
        }

        if !self.current_pass_scheduled {
            self.current_pass_scheduled = true;
            self.pass += 1;
            return Some(self.current_intent());
        }
        if self.next_pass_queued {
            return None;
        }

        let boundary =
            self.reference_device_time + (self.loop_range.end - self.reference_offset);
        if boundary - now > lookahead {
            return None;
        }

        self.next_pass_queued = true;
        self.pass += 1;
        Some(PlayIntent {
            reference_device_time: boundary,
            offset: self.loop_range.start,
            loop_window: Some(self.loop_range),
            pass: self.pass,
        })
    }

    pub fn reset(&mut self, total_duration: SongTime) {
        self.stop();
        self.is_recording = false;
        self.has_notes = false;
        self.song_position = 0.0;
        self.loop_range = LoopRange::default();
        self.total_duration = sanitize(total_duration).max(0.0);
    }

    fn current_intent(&self) -> PlayIntent {
        PlayIntent {
            reference_device_time: self.reference_device_time,
            offset: self.reference_offset,
            loop_window: self.loop_range.is_active().then_some(self.loop_range),
            pass: self.pass,
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
