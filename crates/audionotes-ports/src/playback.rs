use crate::types::SongTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct LoopRange {
    pub start: SongTime,
    pub end: SongTime,
}

impl LoopRange {
    /// A loop only wraps playback when it spans a positive length.
    pub fn is_active(&self) -> bool {
        self.end > self.start
    }

    pub fn len(&self) -> SongTime {
        (self.end - self.start).max(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportSnapshot {
    pub is_playing: bool,
    pub is_recording: bool,
    pub song_position: SongTime,
    pub loop_range: LoopRange,
    pub total_duration: SongTime,
}
