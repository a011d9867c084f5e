use audionotes_ports::storage::SettingsDto;
use audionotes_ports::types::Volume01;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Live parameters read by the audio thread on every block.
#[derive(Debug)]
pub struct AudioParams {
    master: AtomicU32,
    playback_enabled: AtomicBool,
}

impl AudioParams {
    pub fn new(settings: &SettingsDto) -> Self {
        Self {
            master: AtomicU32::new(settings.master_volume.get().to_bits()),
            playback_enabled: AtomicBool::new(true),
        }
    }

    pub fn set_master(&self, volume: Volume01) {
        self.master.store(volume.get().to_bits(), Ordering::Relaxed);
    }

    pub fn master(&self) -> f32 {
        f32::from_bits(self.master.load(Ordering::Relaxed))
    }

    pub fn set_playback_enabled(&self, enabled: bool) {
        self.playback_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn playback_enabled(&self) -> bool {
        self.playback_enabled.load(Ordering::Relaxed)
    }
}
