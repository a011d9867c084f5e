use audionotes_ports::accompaniment::{
    AccompanimentError, AccompanimentOutput, AccompanimentPort, AccompanimentRequest,
};
use audionotes_ports::transcription::{
    AudioClip, TranscriptionError, TranscriptionOutput, TranscriptionPort,
};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

pub const DEFAULT_ENGINE: &str = "audionotes-engine";

/// Transcription and accompaniment through an external executable.
///
/// `<engine> transcribe <audio-file>` and `<engine> accompany` (request JSON
/// on stdin) must both print a single JSON document on stdout.
pub struct CommandEngine {
    engine: String,
}

impl CommandEngine {
    pub fn new(engine_path: Option<String>) -> Self {
        Self {
            engine: engine_path.unwrap_or_else(|| DEFAULT_ENGINE.to_string()),
        }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    fn make_workdir() -> std::io::Result<PathBuf> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let dir = std::env::temp_dir()
            .join("audionotes-transcribe")
            .join(format!("job-{}-{}", std::process::id(), now));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn run_transcribe(&self, workdir: &Path, clip: &AudioClip) -> Result<Output, TranscriptionError> {
        let input = workdir.join(clip_file_name(clip));
        fs::write(&input, &clip.bytes).map_err(|e| TranscriptionError::Backend(e.to_string()))?;
        debug!(engine = %self.engine, input = %input.display(), "running transcription");

        Command::new(&self.engine)
            .arg("transcribe")
            .arg(&input)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TranscriptionError::Backend(format!("{}: {e}", self.engine)))
    }
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TranscriptionPort for CommandEngine {
    fn transcribe(&self, clip: &AudioClip) -> Result<TranscriptionOutput, TranscriptionError> {
        if clip.bytes.is_empty() {
            return Err(TranscriptionError::UnsupportedAudio(
                "audio clip is empty".to_string(),
            ));
        }

        let workdir = Self::make_workdir().map_err(|e| TranscriptionError::Backend(e.to_string()))?;
        let result = self.run_transcribe(&workdir, clip);
        if let Err(err) = fs::remove_dir_all(&workdir) {
            debug!(dir = %workdir.display(), "could not remove workdir: {err}");
        }
        let output = result?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = %output.status, "transcription engine failed");
            return Err(TranscriptionError::Failed(stderr));
        }

        let parsed = parse_transcription(&output.stdout)?;
        info!(notes = parsed.notes.len(), "transcription finished");
        Ok(parsed)
    }
}

impl AccompanimentPort for CommandEngine {
    fn generate(
        &self,
        request: &AccompanimentRequest,
    ) -> Result<AccompanimentOutput, AccompanimentError> {
        let body =
            serde_json::to_vec(request).map_err(|e| AccompanimentError::Backend(e.to_string()))?;
        debug!(engine = %self.engine, melody = request.melody_notes.len(), "running accompaniment");

        let mut child = Command::new(&self.engine)
            .arg("accompany")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AccompanimentError::Backend(format!("{}: {e}", self.engine)))?;

        // The request is fed from its own thread while stdout and stderr are
        // drained here; an engine that writes before it reads cannot stall us.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(&body) {
                // The engine may exit without reading; its status says why.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                result => result,
            })
        });
        let output = child
            .wait_with_output()
            .map_err(|e| AccompanimentError::Backend(e.to_string()))?;
        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| AccompanimentError::Backend("request writer panicked".to_string()))?
                .map_err(|e| AccompanimentError::Backend(e.to_string()))?;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = %output.status, "accompaniment engine failed");
            return Err(AccompanimentError::Failed(stderr));
        }

        let parsed = parse_accompaniment(&output.stdout)?;
        info!(notes = parsed.accompaniment_notes.len(), "accompaniment finished");
        Ok(parsed)
    }
}

pub fn parse_transcription(stdout: &[u8]) -> Result<TranscriptionOutput, TranscriptionError> {
    serde_json::from_slice(stdout).map_err(|e| TranscriptionError::InvalidOutput(e.to_string()))
}

pub fn parse_accompaniment(stdout: &[u8]) -> Result<AccompanimentOutput, AccompanimentError> {
    serde_json::from_slice(stdout).map_err(|e| AccompanimentError::InvalidOutput(e.to_string()))
}

/// Name for the temp copy of a clip. Directory parts of the original name
/// are dropped; without a name the extension comes from the mime type.
pub fn clip_file_name(clip: &AudioClip) -> String {
    if let Some(name) = clip
        .file_name
        .as_deref()
        .and_then(|n| Path::new(n).file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
    {
        return name.to_string();
    }

    let ext = match clip.mime_type.as_deref() {
        Some("audio/wav") | Some("audio/x-wav") | Some("audio/wave") => "wav",
        Some("audio/mpeg") | Some("audio/mp3") => "mp3",
        Some("audio/ogg") => "ogg",
        Some("audio/flac") | Some("audio/x-flac") => "flac",
        Some("audio/mp4") | Some("audio/aac") => "m4a",
        _ => "webm",
    };
    format!("clip.{ext}")
}
