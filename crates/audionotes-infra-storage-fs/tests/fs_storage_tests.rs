use audionotes_infra_storage_fs::FsStorage;
use audionotes_ports::accompaniment::Complexity;
use audionotes_ports::storage::{SettingsDto, StorageError, StoragePort};
use audionotes_ports::types::{DeviceId, Volume01};
use audionotes_ports::voice::Waveform;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    std::env::temp_dir().join(format!("audionotes_{tag}_{nanos}"))
}

#[test]
fn missing_file_yields_defaults() {
    let storage = FsStorage::new(temp_dir("missing"));
    let settings = storage.load_settings().expect("defaults");
    assert_eq!(settings.master_volume, Volume01::new(0.8));
    assert_eq!(settings.midi_tempo_bpm, 120);
    assert_eq!(settings.midi_ppq, 480);
    assert_eq!(settings.waveform, Waveform::Triangle);
}

#[test]
fn settings_round_trip() {
    let dir = temp_dir("roundtrip");
    let storage = FsStorage::new(dir.clone());

    let mut settings = SettingsDto::default();
    settings.selected_audio_out = Some(DeviceId("cpal:Alsa:0:default".to_string()));
    settings.master_volume = Volume01::new(0.5);
    settings.waveform = Waveform::Sine;
    settings.accompaniment.complexity = Complexity::Complex;
    settings.transcription_engine_path = Some("/usr/local/bin/notes-engine".to_string());
    storage.save_settings(&settings).expect("saves");

    let loaded = storage.load_settings().expect("loads");
    assert_eq!(loaded.selected_audio_out, settings.selected_audio_out);
    assert_eq!(loaded.master_volume, settings.master_volume);
    assert_eq!(loaded.waveform, Waveform::Sine);
    assert_eq!(loaded.accompaniment, settings.accompaniment);
    assert_eq!(
        loaded.transcription_engine_path,
        settings.transcription_engine_path
    );
    assert!(!storage.settings_path().with_extension("json.tmp").exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = temp_dir("partial");
    std::fs::create_dir_all(&dir).expect("dir");
    std::fs::write(dir.join("settings.json"), r#"{ "midi_tempo_bpm": 90 }"#).expect("write");

    let loaded = FsStorage::new(dir.clone()).load_settings().expect("loads");
    assert_eq!(loaded.midi_tempo_bpm, 90);
    assert_eq!(loaded.midi_ppq, 480);
    assert_eq!(loaded.min_song_duration_s, 10.0);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn corrupt_file_is_a_serde_error() {
    let dir = temp_dir("corrupt");
    std::fs::create_dir_all(&dir).expect("dir");
    std::fs::write(dir.join("settings.json"), "not json").expect("write");

    let err = FsStorage::new(dir.clone())
        .load_settings()
        .expect_err("rejects");
    assert!(matches!(err, StorageError::Serde(_)));

    let _ = std::fs::remove_dir_all(dir);
}
