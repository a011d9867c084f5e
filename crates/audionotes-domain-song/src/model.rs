use audionotes_ports::transcription::NoteDto;
use audionotes_ports::types::SongTime;
use serde::{Deserialize, Serialize};

/// Shortest song the piano roll ever displays, in seconds.
pub const MIN_SONG_DURATION_S: SongTime = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteOrigin {
    Captured,
    Generated,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NoteError {
    #[error("pitch out of range: {0}")]
    PitchOutOfRange(i32),
    #[error("velocity out of range: {0}")]
    VelocityOutOfRange(i32),
    #[error("invalid start: {0}")]
    InvalidStart(f64),
    #[error("invalid duration: {0}")]
    InvalidDuration(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub start: SongTime,
    pub duration: SongTime,
    pub velocity: u8,
    pub origin: NoteOrigin,
}

impl Note {
    pub fn new(
        pitch: u8,
        start: SongTime,
        duration: SongTime,
        velocity: u8,
        origin: NoteOrigin,
    ) -> Result<Self, NoteError> {
        let note = Self {
            pitch,
            start,
            duration,
            velocity,
            origin,
        };
        note.validate()?;
        Ok(note)
    }

    pub fn from_dto(dto: &NoteDto, origin: NoteOrigin) -> Result<Self, NoteError> {
        let pitch = u8::try_from(dto.pitch)
            .ok()
            .filter(|p| *p <= 127)
            .ok_or(NoteError::PitchOutOfRange(dto.pitch))?;
        let velocity = u8::try_from(dto.velocity)
            .ok()
            .filter(|v| (1..=127).contains(v))
            .ok_or(NoteError::VelocityOutOfRange(dto.velocity))?;
        Self::new(pitch, dto.start, dto.duration, velocity, origin)
    }

    pub fn validate(&self) -> Result<(), NoteError> {
        if self.pitch > 127 {
            return Err(NoteError::PitchOutOfRange(self.pitch as i32));
        }
        if !(1..=127).contains(&self.velocity) {
            return Err(NoteError::VelocityOutOfRange(self.velocity as i32));
        }
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(NoteError::InvalidStart(self.start));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(NoteError::InvalidDuration(self.duration));
        }
        Ok(())
    }

    pub fn end(&self) -> SongTime {
        self.start + self.duration
    }

    pub fn to_dto(&self) -> NoteDto {
        NoteDto {
            pitch: self.pitch as i32,
            start: self.start,
            duration: self.duration,
            velocity: self.velocity as i32,
        }
    }
}

/// Converts service output into notes, dropping entries that break the note invariants.
pub fn validate_notes(dtos: &[NoteDto], origin: NoteOrigin) -> Vec<Note> {
    dtos.iter()
        .filter_map(|dto| Note::from_dto(dto, origin).ok())
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MergeOutcome {
    Unchanged,
    Merged {
        added: usize,
        total_duration: SongTime,
    },
}

/// The note store: notes ordered by start time plus the song length.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Song {
    notes: Vec<Note>,
    total_duration: SongTime,
    min_duration: SongTime,
}

impl Song {
    pub fn new(min_duration: SongTime) -> Self {
        let min_duration = if min_duration.is_finite() {
            min_duration.max(0.0)
        } else {
            MIN_SONG_DURATION_S
        };
        Self {
            notes: Vec::new(),
            total_duration: min_duration,
            min_duration,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn total_duration(&self) -> SongTime {
        self.total_duration
    }

    pub fn min_duration(&self) -> SongTime {
        self.min_duration
    }

    pub fn captured(&self) -> impl Iterator<Item = &Note> + '_ {
        self.notes
            .iter()
            .filter(|note| note.origin == NoteOrigin::Captured)
    }

    pub fn has_captured(&self) -> bool {
        self.captured().next().is_some()
    }

    pub fn max_end(&self) -> SongTime {
        max_end(&self.notes)
    }

    /// Full reload from a transcription: every previous note is dropped.
    pub fn load_captured(&mut self, notes: Vec<Note>, service_duration: SongTime) -> SongTime {
        let mut notes: Vec<Note> = notes
            .into_iter()
            .filter(|note| note.validate().is_ok())
            .map(|note| Note {
                origin: NoteOrigin::Captured,
                ..note
            })
            .collect();
        sort_by_start(&mut notes);

        let service_duration = if service_duration.is_finite() {
            service_duration.max(0.0)
        } else {
            0.0
        };
        self.total_duration = service_duration
            .max(max_end(&notes))
            .max(self.min_duration);
        self.notes = notes;
        self.total_duration
    }

    /// Merges a generation result. Previously generated notes are replaced;
    /// captured notes are kept. An empty result changes nothing.
    pub fn merge_generated(&mut self, notes: Vec<Note>) -> MergeOutcome {
        let generated: Vec<Note> = notes
            .into_iter()
            .filter(|note| note.validate().is_ok())
            .map(|note| Note {
                origin: NoteOrigin::Generated,
                ..note
            })
            .collect();
        if generated.is_empty() {
            return MergeOutcome::Unchanged;
        }

        let added = generated.len();
        self.notes.retain(|note| note.origin == NoteOrigin::Captured);
        self.notes.extend(generated);
        sort_by_start(&mut self.notes);
        self.total_duration = self.total_duration.max(max_end(&self.notes));

        MergeOutcome::Merged {
            added,
            total_duration: self.total_duration,
        }
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.total_duration = self.min_duration;
    }
}

impl Default for Song {
    fn default() -> Self {
        Self::new(MIN_SONG_DURATION_S)
    }
}

fn sort_by_start(notes: &mut [Note]) {
    notes.sort_by(|a, b| a.start.total_cmp(&b.start));
}

fn max_end(notes: &[Note]) -> SongTime {
    notes.iter().map(Note::end).fold(0.0, f64::max)
}
