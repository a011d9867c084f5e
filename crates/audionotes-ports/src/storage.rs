use crate::accompaniment::AccompanimentOptions;
use crate::types::*;
use crate::voice::Waveform;
use serde::{Deserialize, Serialize};

fn default_master_volume() -> Volume01 {
    Volume01::new(0.8)
}

fn default_min_song_duration_s() -> f64 {
    10.0
}

fn default_midi_tempo_bpm() -> u32 {
    120
}

fn default_midi_ppq() -> u16 {
    480
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    pub selected_audio_out: Option<DeviceId>,
    pub audio_buffer_size_frames: Option<u32>,
    #[serde(default = "default_master_volume")]
    pub master_volume: Volume01,
    pub waveform: Waveform,
    #[serde(default = "default_min_song_duration_s")]
    pub min_song_duration_s: f64,
    #[serde(default = "default_midi_tempo_bpm")]
    pub midi_tempo_bpm: u32,
    #[serde(default = "default_midi_ppq")]
    pub midi_ppq: u16,
    pub accompaniment: AccompanimentOptions,
    pub transcription_engine_path: Option<String>,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            selected_audio_out: None,
            audio_buffer_size_frames: None,
            master_volume: default_master_volume(),
            waveform: Waveform::Triangle,
            min_song_duration_s: default_min_song_duration_s(),
            midi_tempo_bpm: default_midi_tempo_bpm(),
            midi_ppq: default_midi_ppq(),
            accompaniment: AccompanimentOptions::default(),
            transcription_engine_path: None,
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;
}
