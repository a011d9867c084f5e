use serde::{Deserialize, Serialize};

/// A note as reported by an external service, not validated yet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteDto {
    pub pitch: i32,
    pub start: f64,
    pub duration: f64,
    pub velocity: i32,
}

#[derive(Clone, Debug, Default)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionOutput {
    #[serde(default)]
    pub notes: Vec<NoteDto>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub detected_key: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum TranscriptionError {
    #[error("unsupported audio: {0}")]
    UnsupportedAudio(String),
    #[error("transcription failed: {0}")]
    Failed(String),
    #[error("invalid service output: {0}")]
    InvalidOutput(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// External collaborator turning recorded audio into timed notes.
pub trait TranscriptionPort: Send + Sync {
    fn transcribe(&self, clip: &AudioClip) -> Result<TranscriptionOutput, TranscriptionError>;
}
