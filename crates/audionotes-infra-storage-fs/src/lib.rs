use audionotes_ports::storage::{SettingsDto, StorageError, StoragePort};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "AudioNotes";
const SETTINGS_FILE: &str = "settings.json";

/// Settings persisted as pretty JSON under a base directory.
pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// `<config dir>/AudioNotes`.
    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        dirs_next::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| StorageError::Io("no user config directory".to_string()))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join(SETTINGS_FILE)
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        Self::new(Self::default_base_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        let path = self.settings_path();
        match fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data).map_err(serde_error),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Ok(SettingsDto::default())
            }
            Err(e) => Err(io_error(e)),
        }
    }

    fn save_settings(&self, settings: &SettingsDto) -> Result<(), StorageError> {
        let path = self.settings_path();
        let data = serde_json::to_vec_pretty(settings).map_err(serde_error)?;
        replace_file(&path, &data)?;
        debug!(path = %path.display(), bytes = data.len(), "settings saved");
        Ok(())
    }
}

/// Writes a sibling temp file and renames it over `path`, so readers never
/// see a truncated file.
fn replace_file(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).map_err(io_error)?;
    fs::rename(&tmp, path).map_err(io_error)
}

fn io_error(e: std::io::Error) -> StorageError {
    StorageError::Io(e.to_string())
}

fn serde_error(e: serde_json::Error) -> StorageError {
    StorageError::Serde(e.to_string())
}
