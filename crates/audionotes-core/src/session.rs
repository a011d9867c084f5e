use crate::audio_graph::{AudioClock, AudioGraph, VoiceLink, VOICE_COMMAND_CAPACITY};
use crate::audio_params::AudioParams;
use crate::ipc::{Command, Event};
use crate::piano_roll::RollCommand;
use crate::scheduler::{ScheduleReport, SchedulerConfig, VoiceScheduler};
use crate::transport::{PlayIntent, TickOutcome, TransportClock};
use audionotes_domain_song::{
    export_midi_bytes, match_key_signature, normalize_detected_key, validate_notes,
    MergeOutcome, MidiExportError, MidiExportOptions, Note, NoteOrigin, Song,
};
use audionotes_ports::accompaniment::{
    AccompanimentError, AccompanimentOptions, AccompanimentOutput, AccompanimentPort,
    AccompanimentRequest,
};
use audionotes_ports::audio::{AudioError, AudioOutputPort, AudioStreamHandle, DeviceClock};
use audionotes_ports::playback::TransportSnapshot;
use audionotes_ports::storage::{SettingsDto, StorageError, StoragePort};
use audionotes_ports::synth::SynthPort;
use audionotes_ports::transcription::{
    AudioClip, TranscriptionError, TranscriptionOutput, TranscriptionPort,
};
use audionotes_ports::types::{AudioConfig, DeviceId, DeviceTime, SongTime, Volume01};
use audionotes_ports::voice::{VoiceError, VoicePort, Waveform};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How far ahead of the loop end the next pass is queued.
pub const LOOP_LOOKAHEAD_S: DeviceTime = 0.1;
const TRANSPORT_EMIT_INTERVAL_S: DeviceTime = 0.033;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("voice device error: {0}")]
    Voice(#[from] VoiceError),
    #[error("transcription error: {0}")]
    Transcription(#[from] TranscriptionError),
    #[error("accompaniment error: {0}")]
    Accompaniment(#[from] AccompanimentError),
    #[error("midi export error: {0}")]
    Export(#[from] MidiExportError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("no notes loaded")]
    NoNotes,
    #[error("not available while {0}")]
    Busy(&'static str),
    #[error("no transcription service configured")]
    TranscriptionUnavailable,
    #[error("no accompaniment service configured")]
    AccompanimentUnavailable,
    #[error("no audio output attached")]
    NoAudioOutput,
}

struct AudioOutput {
    port: Box<dyn AudioOutputPort>,
    synth: Arc<dyn SynthPort>,
    stream: Option<Box<dyn AudioStreamHandle>>,
}

/// One user session: the note store, its transport and the voices it drives.
///
/// Hosts call [`Session::tick`] on a steady cadence (about 16 ms) and drain
/// [`Event`]s afterwards.
pub struct Session {
    clock: Arc<dyn DeviceClock>,
    audio: Option<AudioOutput>,
    audio_params: Arc<AudioParams>,
    transcriber: Option<Box<dyn TranscriptionPort>>,
    accompanist: Option<Box<dyn AccompanimentPort>>,
    storage: Option<Box<dyn StoragePort>>,
    settings: SettingsDto,
    song: Song,
    transport: TransportClock,
    scheduler: VoiceScheduler,
    detected_key: Option<String>,
    accompaniment: AccompanimentOptions,
    source_name: Option<String>,
    events: VecDeque<Event>,
    last_transport_emit: Option<DeviceTime>,
}

impl Session {
    /// Session over an arbitrary clock and voice port.
    pub fn new(
        clock: Arc<dyn DeviceClock>,
        voices: Box<dyn VoicePort>,
        storage: Option<Box<dyn StoragePort>>,
    ) -> Self {
        let settings = load_settings(storage.as_deref());
        let audio_params = Arc::new(AudioParams::new(&settings));
        Self::build(clock, voices, storage, settings, audio_params)
    }

    /// Session playing through an audio output. The stored device is tried
    /// first, then the backend's default output.
    pub fn with_audio_output(
        audio_port: Box<dyn AudioOutputPort>,
        synth: Arc<dyn SynthPort>,
        storage: Option<Box<dyn StoragePort>>,
    ) -> Result<Self, SessionError> {
        let settings = load_settings(storage.as_deref());
        let audio_params = Arc::new(AudioParams::new(&settings));
        let config = AudioConfig {
            buffer_size_frames: settings.audio_buffer_size_frames,
            ..AudioConfig::default()
        };

        let mut opened = None;
        if let Some(device_id) = settings.selected_audio_out.as_ref() {
            match open_stream(
                audio_port.as_ref(),
                synth.clone(),
                audio_params.clone(),
                device_id,
                config,
            ) {
                Ok(parts) => opened = Some(parts),
                Err(err) => warn!("stored audio output {device_id} unavailable: {err}"),
            }
        }
        let (stream, clock, link) = match opened {
            Some(parts) => parts,
            None => {
                let device = audio_port.default_output()?.ok_or_else(|| {
                    AudioError::DeviceNotFound("no audio output device".to_string())
                })?;
                open_stream(
                    audio_port.as_ref(),
                    synth.clone(),
                    audio_params.clone(),
                    &device.id,
                    config,
                )?
            }
        };

        let mut session = Self::build(clock, Box::new(link), storage, settings, audio_params);
        session.audio = Some(AudioOutput {
            port: audio_port,
            synth,
            stream: Some(stream),
        });
        Ok(session)
    }

    fn build(
        clock: Arc<dyn DeviceClock>,
        voices: Box<dyn VoicePort>,
        storage: Option<Box<dyn StoragePort>>,
        settings: SettingsDto,
        audio_params: Arc<AudioParams>,
    ) -> Self {
        let song = Song::new(settings.min_song_duration_s);
        let transport = TransportClock::new(song.total_duration());
        let scheduler = VoiceScheduler::new(
            voices,
            SchedulerConfig {
                waveform: settings.waveform,
                ..SchedulerConfig::default()
            },
        );
        let accompaniment = settings.accompaniment.clone();

        Self {
            clock,
            audio: None,
            audio_params,
            transcriber: None,
            accompanist: None,
            storage,
            settings,
            song,
            transport,
            scheduler,
            detected_key: None,
            accompaniment,
            source_name: None,
            events: VecDeque::new(),
            last_transport_emit: None,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Box<dyn TranscriptionPort>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_accompanist(mut self, accompanist: Box<dyn AccompanimentPort>) -> Self {
        self.accompanist = Some(accompanist);
        self
    }

    pub fn handle_command(&mut self, cmd: Command) -> Result<(), SessionError> {
        match cmd {
            Command::ListAudioOutputs => {
                let audio = self.audio.as_ref().ok_or(SessionError::NoAudioOutput)?;
                let devices = audio.port.list_outputs()?;
                self.events.push_back(Event::AudioOutputsUpdated { devices });
            }
            Command::SelectAudioOutput { device_id, config } => {
                self.select_audio_output(device_id, config)?;
            }
            Command::SetMasterVolume { volume } => self.set_master_volume(volume),
            Command::SetWaveform { waveform } => self.set_waveform(waveform),
            Command::LoadAudio {
                bytes,
                file_name,
                mime_type,
            } => {
                self.load_audio(AudioClip {
                    bytes,
                    file_name,
                    mime_type,
                })?;
            }
            Command::BeginRecording => self.begin_recording(),
            Command::FinishRecording {
                bytes,
                file_name,
                mime_type,
            } => {
                self.finish_recording(AudioClip {
                    bytes,
                    file_name,
                    mime_type,
                })?;
            }
            Command::AbortRecording => self.abort_recording(),
            Command::Play { from } => self.play(from)?,
            Command::Stop => self.stop(),
            Command::Scrub { time } => self.scrub(time)?,
            Command::SetLoop { start, end } => self.set_loop(start, end)?,
            Command::Roll { command } => self.apply_roll_command(command)?,
            Command::SetAccompanimentOptions { options } => {
                self.set_accompaniment_options(options)
            }
            Command::GenerateAccompaniment => {
                self.generate_accompaniment()?;
            }
            Command::ExportMidi { path } => {
                self.export_midi(Path::new(&path))?;
            }
            Command::Reset => self.reset(),
        }
        Ok(())
    }

    pub fn tick(&mut self) {
        let now = self.clock.now();
        self.scheduler.collect_finished();

        match self.transport.tick(now) {
            TickOutcome::Idle => return,
            TickOutcome::Finished { position } => {
                debug!(position, "playback reached the end");
                self.scheduler.stop_all(now);
                self.emit_transport(now, true);
                return;
            }
            TickOutcome::Advanced { .. } | TickOutcome::Wrapped { .. } => {}
        }

        if let Some(intent) = self.transport.upcoming_loop_pass(now, LOOP_LOOKAHEAD_S) {
            self.scheduler.queue_pass(&intent);
        }
        let report = self.scheduler.advance(self.song.notes(), now);
        if let Err(err) = self.check_report(report, now) {
            debug!("playback halted while scheduling: {err}");
            return;
        }
        self.emit_transport(now, false);
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn play(&mut self, from: Option<SongTime>) -> Result<(), SessionError> {
        let now = self.clock.now();
        let Some(intent) = self.transport.play(from, now) else {
            return Ok(());
        };
        info!(from = intent.offset, "playback started");
        self.start_voices(intent, now)
    }

    /// Stops playback and releases every voice. Safe to call at any time.
    pub fn stop(&mut self) {
        let now = self.clock.now();
        let was_playing = self.transport.stop();
        let released = self.scheduler.stop_all(now);
        if was_playing || released > 0 {
            debug!(released, "playback stopped");
            self.emit_transport(now, true);
        }
    }

    pub fn scrub(&mut self, time: SongTime) -> Result<(), SessionError> {
        if self.song.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        match self.transport.scrub(time, now) {
            Some(intent) => self.restart(intent, now),
            None => {
                self.emit_transport(now, true);
                Ok(())
            }
        }
    }

    pub fn set_loop(&mut self, start: SongTime, end: SongTime) -> Result<(), SessionError> {
        if self.song.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        match self.transport.set_loop(start, end, now) {
            Some(intent) => self.restart(intent, now),
            None => {
                self.emit_transport(now, true);
                Ok(())
            }
        }
    }

    pub fn apply_roll_command(&mut self, command: RollCommand) -> Result<(), SessionError> {
        match command {
            RollCommand::SetLoop { start, end } => self.set_loop(start, end),
            RollCommand::Scrub { time } => self.scrub(time),
        }
    }

    /// Transcribes `clip` and replaces the song with the result.
    pub fn load_audio(&mut self, clip: AudioClip) -> Result<usize, SessionError> {
        self.stop();
        let result = match self.transcriber.as_ref() {
            Some(transcriber) => {
                info!(file = ?clip.file_name, bytes = clip.bytes.len(), "transcribing audio");
                transcriber.transcribe(&clip)
            }
            None => return Err(SessionError::TranscriptionUnavailable),
        };
        self.complete_transcription(clip.file_name, result)
    }

    /// Applies the outcome of a transcription that ran elsewhere. A failure
    /// resets the session, since the previous song is already gone.
    pub fn complete_transcription(
        &mut self,
        source_name: Option<String>,
        result: Result<TranscriptionOutput, TranscriptionError>,
    ) -> Result<usize, SessionError> {
        match result {
            Ok(output) => Ok(self.apply_transcription(source_name, output)),
            Err(err) => {
                warn!("transcription failed: {err}");
                self.reset();
                self.emit_error("Transcription failed", err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn apply_transcription(
        &mut self,
        source_name: Option<String>,
        output: TranscriptionOutput,
    ) -> usize {
        self.stop();
        let notes = validate_notes(&output.notes, NoteOrigin::Captured);
        let dropped = output.notes.len() - notes.len();
        if dropped > 0 {
            warn!(dropped, "discarded invalid notes from transcription");
        }

        let total = self.song.load_captured(notes, output.duration);
        self.transport.load_song(total, !self.song.is_empty());
        self.source_name = source_name;

        self.detected_key = normalize_detected_key(output.detected_key.as_deref());
        let key_signature = self.detected_key.as_deref().and_then(match_key_signature);
        if let Some(label) = key_signature {
            self.accompaniment.key_signature = Some(label.to_string());
            self.events.push_back(Event::AccompanimentOptionsUpdated {
                options: self.accompaniment.clone(),
            });
        }

        let count = self.song.notes().len();
        info!(
            notes = count,
            total_duration = total,
            key = ?self.detected_key,
            "transcription applied"
        );

        self.emit_notes();
        self.events.push_back(Event::KeyDetected {
            detected_key: self.detected_key.clone(),
            key_signature: key_signature.map(str::to_string),
        });
        if count == 0 {
            self.events.push_back(Event::Notice {
                title: "No notes detected".to_string(),
                message: "The recording did not contain any recognizable notes.".to_string(),
            });
        }
        let now = self.clock.now();
        self.emit_transport(now, true);
        count
    }

    /// Clears the session and marks a recording in progress.
    pub fn begin_recording(&mut self) {
        if self.transport.is_recording() {
            return;
        }
        self.reset();
        self.transport.set_recording(true);
        info!("recording started");
        let now = self.clock.now();
        self.emit_transport(now, true);
    }

    pub fn finish_recording(&mut self, clip: AudioClip) -> Result<usize, SessionError> {
        self.transport.set_recording(false);
        info!(bytes = clip.bytes.len(), "recording finished");
        self.load_audio(clip)
    }

    pub fn abort_recording(&mut self) {
        if !self.transport.is_recording() {
            return;
        }
        self.transport.set_recording(false);
        info!("recording aborted");
        let now = self.clock.now();
        self.emit_transport(now, true);
    }

    pub fn generate_accompaniment(&mut self) -> Result<MergeOutcome, SessionError> {
        if !self.song.has_captured() {
            return Err(SessionError::NoNotes);
        }
        if self.transport.is_playing() {
            return Err(SessionError::Busy("playing"));
        }
        if self.transport.is_recording() {
            return Err(SessionError::Busy("recording"));
        }

        let request = AccompanimentRequest {
            melody_notes: self.song.captured().map(Note::to_dto).collect(),
            options: self.accompaniment.clone(),
        };
        let result = match self.accompanist.as_ref() {
            Some(accompanist) => {
                info!(
                    melody_notes = request.melody_notes.len(),
                    "requesting accompaniment"
                );
                accompanist.generate(&request)
            }
            None => return Err(SessionError::AccompanimentUnavailable),
        };

        match result {
            Ok(output) => self.apply_accompaniment(output),
            Err(err) => {
                warn!("accompaniment failed: {err}");
                self.emit_error("Accompaniment failed", err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn apply_accompaniment(
        &mut self,
        output: AccompanimentOutput,
    ) -> Result<MergeOutcome, SessionError> {
        let notes = validate_notes(&output.accompaniment_notes, NoteOrigin::Generated);
        let outcome = self.song.merge_generated(notes);
        match outcome {
            MergeOutcome::Unchanged => {
                info!("accompaniment returned no notes");
                self.events.push_back(Event::Notice {
                    title: "No accompaniment".to_string(),
                    message: "The service did not return any notes.".to_string(),
                });
            }
            MergeOutcome::Merged {
                added,
                total_duration,
            } => {
                let now = self.clock.now();
                let loop_range = self.transport.loop_range();
                self.transport.set_song(total_duration, true);
                let mut restart = None;
                if loop_range.end < total_duration {
                    restart = self
                        .transport
                        .set_loop(loop_range.start, total_duration, now);
                }
                // Pending passes index into the old note order.
                if restart.is_none() && self.transport.is_playing() {
                    let position = self.transport.song_position();
                    restart = self.transport.scrub(position, now);
                }
                if let Some(intent) = restart {
                    self.restart(intent, now)?;
                }
                info!(added, total_duration, "accompaniment merged");
                self.emit_notes();
                self.emit_transport(now, true);
            }
        }
        Ok(outcome)
    }

    pub fn set_accompaniment_options(&mut self, options: AccompanimentOptions) {
        self.accompaniment = options;
        self.events.push_back(Event::AccompanimentOptionsUpdated {
            options: self.accompaniment.clone(),
        });
    }

    pub fn midi_export_options(&self) -> MidiExportOptions {
        MidiExportOptions {
            tempo_bpm: self.settings.midi_tempo_bpm,
            ppq: self.settings.midi_ppq,
            ..MidiExportOptions::default()
        }
    }

    pub fn export_midi_bytes(&self) -> Result<Vec<u8>, SessionError> {
        if self.song.is_empty() {
            return Err(SessionError::NoNotes);
        }
        Ok(export_midi_bytes(self.song.notes(), self.midi_export_options())?)
    }

    pub fn export_midi(&mut self, path: &Path) -> Result<usize, SessionError> {
        let bytes = self.export_midi_bytes()?;
        std::fs::write(path, &bytes).map_err(|e| MidiExportError::Io(e.to_string()))?;
        info!(path = %path.display(), bytes = bytes.len(), "midi exported");
        self.events.push_back(Event::MidiExported {
            path: path.display().to_string(),
            bytes: bytes.len(),
        });
        Ok(bytes.len())
    }

    /// Back to an empty session: no notes, no key, no loop, default options.
    pub fn reset(&mut self) {
        self.stop();
        self.song.clear();
        self.transport.reset(self.song.total_duration());
        self.detected_key = None;
        self.source_name = None;
        self.accompaniment = self.settings.accompaniment.clone();
        info!("session reset");

        self.emit_notes();
        self.events.push_back(Event::KeyDetected {
            detected_key: None,
            key_signature: None,
        });
        self.events.push_back(Event::AccompanimentOptionsUpdated {
            options: self.accompaniment.clone(),
        });
        let now = self.clock.now();
        self.emit_transport(now, true);
    }

    pub fn set_master_volume(&mut self, volume: Volume01) {
        self.settings.master_volume = volume;
        self.audio_params.set_master(volume);
        self.emit_settings();
        self.save_settings();
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.settings.waveform = waveform;
        self.scheduler.set_waveform(waveform);
        self.emit_settings();
        self.save_settings();
    }

    pub fn select_audio_output(
        &mut self,
        device_id: DeviceId,
        config: Option<AudioConfig>,
    ) -> Result<(), SessionError> {
        if self.audio.is_none() {
            return Err(SessionError::NoAudioOutput);
        }
        self.stop();

        let config = config.unwrap_or(AudioConfig {
            buffer_size_frames: self.settings.audio_buffer_size_frames,
            ..AudioConfig::default()
        });
        let audio_params = self.audio_params.clone();
        let audio = self.audio.as_mut().ok_or(SessionError::NoAudioOutput)?;
        if let Some(stream) = audio.stream.take() {
            stream.close();
        }
        let (stream, clock, link) = open_stream(
            audio.port.as_ref(),
            audio.synth.clone(),
            audio_params,
            &device_id,
            config,
        )?;
        audio.stream = Some(stream);

        self.clock = clock as Arc<dyn DeviceClock>;
        self.scheduler.replace_port(Box::new(link));
        self.settings.selected_audio_out = Some(device_id);
        self.settings.audio_buffer_size_frames = config.buffer_size_frames;
        self.emit_settings();
        self.save_settings();
        Ok(())
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn transport(&self) -> TransportSnapshot {
        self.transport.snapshot()
    }

    pub fn detected_key(&self) -> Option<&str> {
        self.detected_key.as_deref()
    }

    pub fn accompaniment_options(&self) -> &AccompanimentOptions {
        &self.accompaniment
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn settings(&self) -> &SettingsDto {
        &self.settings
    }

    pub fn audio_params(&self) -> Arc<AudioParams> {
        self.audio_params.clone()
    }

    pub fn active_voice_count(&self) -> usize {
        self.scheduler.active_count()
    }

    pub fn now(&self) -> DeviceTime {
        self.clock.now()
    }

    /// Stops playback and closes the audio stream, if any.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(stream) = self.audio.as_mut().and_then(|audio| audio.stream.take()) {
            stream.close();
        }
    }

    fn restart(&mut self, intent: PlayIntent, now: DeviceTime) -> Result<(), SessionError> {
        self.scheduler.stop_all(now);
        self.start_voices(intent, now)
    }

    fn start_voices(&mut self, intent: PlayIntent, now: DeviceTime) -> Result<(), SessionError> {
        let report = self
            .scheduler
            .start_playback(self.song.notes(), &intent, now);
        self.emit_transport(now, true);
        self.check_report(report, now)
    }

    /// A voice device failure ends playback. It is surfaced only once;
    /// later attempts stop silently.
    fn check_report(&mut self, report: ScheduleReport, now: DeviceTime) -> Result<(), SessionError> {
        if let Some(err) = report.failure {
            self.transport.stop();
            self.scheduler.stop_all(now);
            self.emit_error("Audio device", err.to_string());
            self.emit_transport(now, true);
            return Err(err.into());
        }
        if report.disabled {
            self.transport.stop();
            self.emit_transport(now, true);
        }
        Ok(())
    }

    fn emit_transport(&mut self, now: DeviceTime, force: bool) {
        if !force {
            if let Some(last) = self.last_transport_emit {
                if now - last < TRANSPORT_EMIT_INTERVAL_S {
                    return;
                }
            }
        }
        self.last_transport_emit = Some(now);
        self.events.push_back(Event::TransportUpdated {
            snapshot: self.transport.snapshot(),
        });
    }

    fn emit_notes(&mut self) {
        self.events.push_back(Event::NotesUpdated {
            notes: self.song.notes().to_vec(),
            total_duration: self.song.total_duration(),
        });
    }

    fn emit_settings(&mut self) {
        self.events.push_back(Event::SettingsUpdated {
            settings: self.settings.clone(),
        });
    }

    fn emit_error(&mut self, title: &str, message: String) {
        self.events.push_back(Event::Error {
            title: title.to_string(),
            message,
        });
    }

    fn save_settings(&self) {
        if let Some(storage) = self.storage.as_ref() {
            if let Err(err) = storage.save_settings(&self.settings) {
                warn!("failed to save settings: {err}");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(stream) = self.audio.as_mut().and_then(|audio| audio.stream.take()) {
            stream.close();
        }
    }
}

fn load_settings(storage: Option<&dyn StoragePort>) -> SettingsDto {
    match storage.map(|storage| storage.load_settings()) {
        Some(Ok(settings)) => settings,
        Some(Err(err)) => {
            warn!("failed to load settings, using defaults: {err}");
            SettingsDto::default()
        }
        None => SettingsDto::default(),
    }
}

fn open_stream(
    port: &dyn AudioOutputPort,
    synth: Arc<dyn SynthPort>,
    params: Arc<AudioParams>,
    device_id: &DeviceId,
    config: AudioConfig,
) -> Result<(Box<dyn AudioStreamHandle>, Arc<AudioClock>, VoiceLink), AudioError> {
    let clock = Arc::new(AudioClock::new(config.sample_rate_hz));
    synth.set_sample_rate(config.sample_rate_hz);
    let (graph, link) = AudioGraph::new(synth, params, clock.clone(), VOICE_COMMAND_CAPACITY);
    let stream = port.open_output(device_id, config, Box::new(graph))?;
    let opened = stream.config();
    info!(
        device = %device_id,
        sample_rate = opened.sample_rate_hz,
        buffer = ?opened.buffer_size_frames,
        "audio output opened"
    );
    Ok((stream, clock, link))
}
