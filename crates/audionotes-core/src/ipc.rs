use crate::piano_roll::RollCommand;
use audionotes_domain_song::Note;
use audionotes_ports::accompaniment::AccompanimentOptions;
use audionotes_ports::playback::TransportSnapshot;
use audionotes_ports::storage::SettingsDto;
use audionotes_ports::types::{AudioConfig, AudioOutputDevice, DeviceId, SongTime, Volume01};
use audionotes_ports::voice::Waveform;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    ListAudioOutputs,
    SelectAudioOutput { device_id: DeviceId, config: Option<AudioConfig> },
    SetMasterVolume { volume: Volume01 },
    SetWaveform { waveform: Waveform },
    LoadAudio {
        bytes: Vec<u8>,
        file_name: Option<String>,
        mime_type: Option<String>,
    },
    BeginRecording,
    FinishRecording {
        bytes: Vec<u8>,
        file_name: Option<String>,
        mime_type: Option<String>,
    },
    AbortRecording,
    Play { from: Option<SongTime> },
    Stop,
    Scrub { time: SongTime },
    SetLoop { start: SongTime, end: SongTime },
    Roll { command: RollCommand },
    SetAccompanimentOptions { options: AccompanimentOptions },
    GenerateAccompaniment,
    ExportMidi { path: String },
    Reset,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    AudioOutputsUpdated { devices: Vec<AudioOutputDevice> },
    SettingsUpdated { settings: SettingsDto },
    TransportUpdated { snapshot: TransportSnapshot },
    NotesUpdated {
        notes: Vec<Note>,
        total_duration: SongTime,
    },
    KeyDetected {
        detected_key: Option<String>,
        key_signature: Option<String>,
    },
    AccompanimentOptionsUpdated { options: AccompanimentOptions },
    MidiExported { path: String, bytes: usize },
    Notice { title: String, message: String },
    Error { title: String, message: String },
}
