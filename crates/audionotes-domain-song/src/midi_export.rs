use crate::model::Note;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;

const MAX_TICK: u32 = 0x0FFF_FFFF;
/// Slowest tempo whose microseconds per quarter fit the 24-bit tempo meta.
const MIN_TEMPO_BPM: u32 = 4;

#[derive(thiserror::Error, Debug)]
pub enum MidiExportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("no notes to export")]
    Empty,
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

#[derive(Clone, Copy, Debug)]
pub struct MidiExportOptions {
    pub tempo_bpm: u32,
    pub ppq: u16,
    pub program: u8,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        Self {
            tempo_bpm: 120,
            ppq: 480,
            program: 0,
        }
    }
}

impl MidiExportOptions {
    fn validate(&self) -> Result<(), MidiExportError> {
        if self.tempo_bpm < MIN_TEMPO_BPM {
            return Err(MidiExportError::InvalidOptions(format!(
                "tempo must be at least {MIN_TEMPO_BPM} bpm, got {}",
                self.tempo_bpm
            )));
        }
        if self.ppq == 0 || self.ppq > 0x7FFF {
            return Err(MidiExportError::InvalidOptions(format!(
                "ppq out of range: {}",
                self.ppq
            )));
        }
        if self.program > 127 {
            return Err(MidiExportError::InvalidOptions(format!(
                "program out of range: {}",
                self.program
            )));
        }
        Ok(())
    }

    fn us_per_quarter(&self) -> u32 {
        60_000_000 / self.tempo_bpm
    }
}

pub fn seconds_to_ticks(seconds: f64, options: &MidiExportOptions) -> u32 {
    let quarters = seconds.max(0.0) * options.tempo_bpm as f64 / 60.0;
    let ticks = (quarters * options.ppq as f64).round();
    ticks.min(MAX_TICK as f64) as u32
}

pub fn export_midi_path(
    notes: &[Note],
    options: MidiExportOptions,
    path: &Path,
) -> Result<(), MidiExportError> {
    let data = export_midi_bytes(notes, options)?;
    std::fs::write(path, data).map_err(|e| MidiExportError::Io(e.to_string()))
}

/// Single-track SMF with notes written in start order.
pub fn export_midi_bytes(
    notes: &[Note],
    options: MidiExportOptions,
) -> Result<Vec<u8>, MidiExportError> {
    if notes.is_empty() {
        return Err(MidiExportError::Empty);
    }
    options.validate()?;

    let mut sorted: Vec<&Note> = notes.iter().collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut events = build_events(&sorted, &options);
    events.sort_by(|a, b| {
        a.tick
            .cmp(&b.tick)
            .then_with(|| track_event_rank(&a.kind).cmp(&track_event_rank(&b.kind)))
    });

    let mut track_events = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0u32;
    for event in events {
        let delta = event.tick.saturating_sub(last_tick);
        last_tick = event.tick;
        track_events.push(TrackEvent {
            delta: u28::new(delta.min(MAX_TICK)),
            kind: event.kind,
        });
    }

    track_events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: midly::Format::SingleTrack,
            timing: Timing::Metrical(u15::new(options.ppq)),
        },
        tracks: vec![track_events],
    };

    let mut data = Vec::new();
    smf.write(&mut data)
        .map_err(|e| MidiExportError::Io(e.to_string()))?;
    Ok(data)
}

struct MidiEvent {
    tick: u32,
    kind: TrackEventKind<'static>,
}

fn track_event_rank(kind: &TrackEventKind<'static>) -> (u8, u8, u8) {
    match kind {
        TrackEventKind::Meta(MetaMessage::Tempo(_)) => (0, 0, 0),
        TrackEventKind::Meta(_) => (0, 1, 0),
        TrackEventKind::Midi { message, .. } => match message {
            MidiMessage::ProgramChange { .. } => (1, 0, 0),
            MidiMessage::NoteOff { key, .. } => (1, 1, key.as_int()),
            MidiMessage::NoteOn { key, .. } => (1, 2, key.as_int()),
            _ => (1, 3, 0),
        },
        _ => (2, 0, 0),
    }
}

fn build_events(notes: &[&Note], options: &MidiExportOptions) -> Vec<MidiEvent> {
    let mut events = Vec::with_capacity(notes.len() * 2 + 2);
    let channel = u4::new(0);

    events.push(MidiEvent {
        tick: 0,
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(options.us_per_quarter()))),
    });
    events.push(MidiEvent {
        tick: 0,
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(options.program),
            },
        },
    });

    for note in notes {
        let on_tick = seconds_to_ticks(note.start, options);
        let length = seconds_to_ticks(note.duration, options).max(1);
        let key = u7::new(note.pitch);
        events.push(MidiEvent {
            tick: on_tick,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    vel: u7::new(note.velocity.max(1)),
                },
            },
        });
        events.push(MidiEvent {
            tick: on_tick.saturating_add(length).min(MAX_TICK),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: u7::new(64),
                },
            },
        });
    }

    events
}
