use crate::transcription::NoteDto;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ACCOMPANIMENT_STYLE: &str =
    "Complementary piano harmony, focusing on arpeggios and sustained chords.";
pub const DEFAULT_ACCOMPANIMENT_MOOD: &str = "Neutral";
pub const DEFAULT_KEY_SIGNATURE: &str = "C Major / A minor";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccompanimentOptions {
    pub key_signature: Option<String>,
    pub style: Option<String>,
    pub complexity: Complexity,
    pub mood: Option<String>,
}

impl Default for AccompanimentOptions {
    fn default() -> Self {
        Self {
            key_signature: Some(DEFAULT_KEY_SIGNATURE.to_string()),
            style: Some(DEFAULT_ACCOMPANIMENT_STYLE.to_string()),
            complexity: Complexity::Moderate,
            mood: Some(DEFAULT_ACCOMPANIMENT_MOOD.to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccompanimentRequest {
    pub melody_notes: Vec<NoteDto>,
    pub options: AccompanimentOptions,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccompanimentOutput {
    #[serde(default)]
    pub accompaniment_notes: Vec<NoteDto>,
}

#[derive(thiserror::Error, Debug)]
pub enum AccompanimentError {
    #[error("generation failed: {0}")]
    Failed(String),
    #[error("invalid service output: {0}")]
    InvalidOutput(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// External collaborator generating notes that accompany a melody.
pub trait AccompanimentPort: Send + Sync {
    fn generate(
        &self,
        request: &AccompanimentRequest,
    ) -> Result<AccompanimentOutput, AccompanimentError>;
}
