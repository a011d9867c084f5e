use crate::transport::PlayIntent;
use audionotes_domain_song::Note;
use audionotes_ports::types::{pitch_to_frequency, DeviceTime};
use audionotes_ports::voice::{
    GainAutomation, ToneSpec, VoiceError, VoiceHandle, VoicePort, Waveform,
};
use std::collections::HashMap;
use tracing::{debug, error, warn};

pub const ATTACK_S: f64 = 0.05;
pub const DECAY_S: f64 = 0.15;
pub const SUSTAIN_RATIO: f32 = 0.7;
pub const RELEASE_S: f64 = 0.3;
pub const GAIN_FLOOR: f32 = 0.0001;
pub const STOP_PADDING_S: f64 = 0.01;
/// Abbreviated release used when playback is stopped or restarted.
pub const FORCED_RELEASE_S: f64 = 0.05;
pub const FORCED_STOP_S: f64 = 0.06;
pub const SCHEDULE_HORIZON_S: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub attack_s: f64,
    pub decay_s: f64,
    pub sustain_ratio: f32,
    pub release_s: f64,
    pub floor: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack_s: ATTACK_S,
            decay_s: DECAY_S,
            sustain_ratio: SUSTAIN_RATIO,
            release_s: RELEASE_S,
            floor: GAIN_FLOOR,
        }
    }
}

impl Envelope {
    pub fn peak_for_velocity(&self, velocity: u8) -> f32 {
        (velocity as f32 / 127.0).clamp(self.floor, 1.0)
    }

    /// Builds the gain timeline for a tone and returns it with the stop time.
    ///
    /// Stages that would run past the release point are truncated, so the
    /// timeline stays monotonic for very short notes.
    pub fn automation(
        &self,
        peak: f32,
        start_at: DeviceTime,
        release_at: DeviceTime,
        now: DeviceTime,
    ) -> (GainAutomation, DeviceTime) {
        let onset = start_at.max(now);
        let release_at = release_at.max(onset);
        let sustain = peak * self.sustain_ratio;
        let attack_end = onset + self.attack_s;
        let decay_end = attack_end + self.decay_s;

        let mut gain = GainAutomation::new(0.0);
        gain.set_value_at(0.0, (start_at - 0.001).max(now));

        if release_at >= decay_end {
            gain.linear_ramp_to(peak, attack_end);
            gain.linear_ramp_to(sustain, decay_end);
            gain.set_value_at(sustain, release_at);
        } else if release_at >= attack_end {
            gain.linear_ramp_to(peak, attack_end);
            let frac = if self.decay_s > 0.0 {
                ((release_at - attack_end) / self.decay_s) as f32
            } else {
                1.0
            };
            gain.linear_ramp_to(peak + (sustain - peak) * frac, release_at);
        } else {
            let frac = if self.attack_s > 0.0 {
                ((release_at - onset) / self.attack_s) as f32
            } else {
                1.0
            };
            gain.linear_ramp_to(peak * frac, release_at);
        }

        let release_end = release_at + self.release_s;
        gain.linear_ramp_to(self.floor, release_end);
        (gain, release_end + STOP_PADDING_S)
    }
}

/// Identity of a scheduled voice: the same note in a later loop pass is a
/// different voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceKey {
    pub pass: u64,
    pub note_index: usize,
    pub start_us: i64,
    pub pitch: u8,
}

#[derive(Clone, Debug)]
pub struct ActiveVoice {
    pub key: VoiceKey,
    pub note: Note,
    pub handle: VoiceHandle,
    pub scheduled_start: DeviceTime,
    pub scheduled_release: DeviceTime,
    pub stop_at: DeviceTime,
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub envelope: Envelope,
    pub waveform: Waveform,
    /// Voices are only handed to the device once their start falls within
    /// this many seconds of the current device time.
    pub horizon_s: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            envelope: Envelope::default(),
            waveform: Waveform::Triangle,
            horizon_s: SCHEDULE_HORIZON_S,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScheduleReport {
    pub scheduled: usize,
    pub skipped: usize,
    /// The command queue was full; the remaining notes wait for the next call.
    pub backlogged: bool,
    /// Set only the first time the voice device fails.
    pub failure: Option<VoiceError>,
    /// The device failed earlier; nothing was scheduled.
    pub disabled: bool,
}

/// A pass still walking its notes. `cursor` indexes the next note to start.
#[derive(Clone, Copy, Debug)]
struct PendingPass {
    intent: PlayIntent,
    cursor: usize,
}

enum Walk {
    Done,
    Waiting,
    Backlogged,
    Failed,
}

/// Turns notes into timed voices on a [`VoicePort`] and tracks the live set.
///
/// Passes are walked lazily: each call to [`VoiceScheduler::advance`] starts
/// the notes whose onset lies within the horizon, so the device only ever
/// holds the voices that are sounding or about to.
pub struct VoiceScheduler {
    config: SchedulerConfig,
    port: Box<dyn VoicePort>,
    voices: HashMap<VoiceKey, ActiveVoice>,
    by_handle: HashMap<VoiceHandle, VoiceKey>,
    pending: Vec<PendingPass>,
    ended: Vec<VoiceHandle>,
    failed: bool,
}

impl VoiceScheduler {
    pub fn new(port: Box<dyn VoicePort>, config: SchedulerConfig) -> Self {
        Self {
            config,
            port,
            voices: HashMap::new(),
            by_handle: HashMap::new(),
            pending: Vec::new(),
            ended: Vec::with_capacity(64),
            failed: false,
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.config.waveform = waveform;
    }

    /// Swaps the voice device, e.g. after the output was reopened.
    pub fn replace_port(&mut self, port: Box<dyn VoicePort>) {
        self.voices.clear();
        self.by_handle.clear();
        self.pending.clear();
        self.port = port;
        self.failed = false;
    }

    pub fn is_disabled(&self) -> bool {
        self.failed
    }

    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Passes that still have notes left to start.
    pub fn pending_passes(&self) -> usize {
        self.pending.len()
    }

    pub fn voices(&self) -> impl Iterator<Item = &ActiveVoice> + '_ {
        self.voices.values()
    }

    pub fn contains(&self, key: &VoiceKey) -> bool {
        self.voices.contains_key(key)
    }

    /// Fresh start: any previous voice is killed outright, then the pass
    /// described by `intent` is queued and its first notes started.
    pub fn start_playback(
        &mut self,
        notes: &[Note],
        intent: &PlayIntent,
        now: DeviceTime,
    ) -> ScheduleReport {
        self.kill_all();
        self.schedule_pass(notes, intent, now)
    }

    /// Queues one pass without touching voices already in flight, then
    /// advances every pending pass.
    pub fn schedule_pass(
        &mut self,
        notes: &[Note],
        intent: &PlayIntent,
        now: DeviceTime,
    ) -> ScheduleReport {
        self.queue_pass(intent);
        self.advance(notes, now)
    }

    /// Registers a pass to be walked by later calls to [`Self::advance`].
    /// Queuing a pass again rewinds its cursor; notes already started are
    /// not started twice.
    pub fn queue_pass(&mut self, intent: &PlayIntent) {
        if self.failed {
            return;
        }
        self.pending.retain(|pending| pending.intent.pass != intent.pass);
        self.pending.push(PendingPass {
            intent: *intent,
            cursor: 0,
        });
    }

    /// Starts every pending note whose onset is at most `horizon_s` away.
    ///
    /// `notes` must be the same start-ordered slice the passes were queued
    /// against.
    pub fn advance(&mut self, notes: &[Note], now: DeviceTime) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        if self.failed {
            report.disabled = true;
            return report;
        }

        let horizon_end = now + self.config.horizon_s;
        let mut index = 0;
        while index < self.pending.len() {
            let mut pass = self.pending[index];
            let walk = self.walk(notes, &mut pass, now, horizon_end, &mut report);
            self.pending[index] = pass;
            match walk {
                Walk::Done => {
                    debug!(pass = pass.intent.pass, "pass fully scheduled");
                    self.pending.remove(index);
                }
                Walk::Waiting => index += 1,
                Walk::Backlogged => {
                    report.backlogged = true;
                    debug!(
                        pass = pass.intent.pass,
                        cursor = pass.cursor,
                        "voice queue full, deferring"
                    );
                    break;
                }
                Walk::Failed => {
                    self.pending.clear();
                    break;
                }
            }
        }

        if report.scheduled > 0 || report.skipped > 0 {
            debug!(
                scheduled = report.scheduled,
                skipped = report.skipped,
                pending = self.pending.len(),
                "advanced passes"
            );
        }
        report
    }

    fn walk(
        &mut self,
        notes: &[Note],
        pass: &mut PendingPass,
        now: DeviceTime,
        horizon_end: DeviceTime,
        report: &mut ScheduleReport,
    ) -> Walk {
        let intent = pass.intent;
        while let Some(note) = notes.get(pass.cursor) {
            if let Some(window) = intent.loop_window {
                if note.start >= window.end {
                    report.skipped += notes.len() - pass.cursor;
                    pass.cursor = notes.len();
                    break;
                }
            }
            if intent.device_time_of(note.start) > horizon_end {
                return Walk::Waiting;
            }
            match self.start_note(pass.cursor, note, &intent, now) {
                Ok(true) => report.scheduled += 1,
                Ok(false) => report.skipped += 1,
                Err(VoiceError::QueueFull) => return Walk::Backlogged,
                Err(err) => {
                    error!("voice device failed: {err}");
                    self.failed = true;
                    report.failure = Some(err);
                    return Walk::Failed;
                }
            }
            pass.cursor += 1;
        }
        Walk::Done
    }

    /// Starts one note of a pass. `Ok(false)` means there was nothing to
    /// start: the note lies before the pass offset, has already finished or
    /// is already sounding.
    fn start_note(
        &mut self,
        note_index: usize,
        note: &Note,
        intent: &PlayIntent,
        now: DeviceTime,
    ) -> Result<bool, VoiceError> {
        let envelope = self.config.envelope;
        let mut release_song = note.end();
        if let Some(window) = intent.loop_window {
            release_song = release_song.min(window.end);
        }
        if release_song <= intent.offset {
            return Ok(false);
        }

        let scheduled_start = intent.device_time_of(note.start);
        let scheduled_release = intent.device_time_of(release_song);
        if scheduled_release + envelope.release_s <= now {
            return Ok(false);
        }

        let key = VoiceKey {
            pass: intent.pass,
            note_index,
            start_us: (note.start * 1_000_000.0).round() as i64,
            pitch: note.pitch,
        };
        if self.voices.contains_key(&key) {
            return Ok(false);
        }

        let peak = envelope.peak_for_velocity(note.velocity);
        let (gain, stop_at) = envelope.automation(peak, scheduled_start, scheduled_release, now);
        let handle = self.port.start(ToneSpec {
            frequency_hz: pitch_to_frequency(note.pitch),
            waveform: self.config.waveform,
            gain,
            start_at: scheduled_start.max(now),
            stop_at,
        })?;

        self.by_handle.insert(handle, key);
        self.voices.insert(
            key,
            ActiveVoice {
                key,
                note: *note,
                handle,
                scheduled_start,
                scheduled_release,
                stop_at,
            },
        );
        Ok(true)
    }

    /// Abbreviated release of every live voice; the set is emptied at once.
    pub fn stop_all(&mut self, now: DeviceTime) -> usize {
        self.pending.clear();
        let count = self.voices.len();
        for (_, voice) in self.voices.drain() {
            let released =
                self.port
                    .release(voice.handle, now, FORCED_RELEASE_S, now + FORCED_STOP_S);
            if let Err(err) = released {
                warn!("release failed for {:?}: {err}", voice.handle);
                let _ = self.port.kill(voice.handle);
            }
        }
        self.by_handle.clear();
        count
    }

    /// Drops voices the renderer reported as finished.
    pub fn collect_finished(&mut self) -> usize {
        self.ended.clear();
        self.port.drain_ended(&mut self.ended);
        let mut removed = 0;
        for handle in &self.ended {
            if let Some(key) = self.by_handle.remove(handle) {
                if self.voices.remove(&key).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    fn kill_all(&mut self) {
        self.pending.clear();
        for (_, voice) in self.voices.drain() {
            let _ = self.port.kill(voice.handle);
        }
        self.by_handle.clear();
    }
}
