use crate::types::SampleTime;
use crate::voice::{VoiceCommand, VoiceHandle};

/// Thread model:
/// - set_sample_rate is called from the control thread (can lock internally)
/// - handle_command/render are called from the audio thread (must be realtime-safe)
pub trait SynthPort: Send + Sync {
    fn set_sample_rate(&self, sample_rate_hz: u32);

    fn handle_command(&self, command: VoiceCommand);

    /// Render frames starting at `sample_time_start`; handles of voices that
    /// finished during this block are appended to `ended`.
    fn render(
        &self,
        sample_time_start: SampleTime,
        out_l: &mut [f32],
        out_r: &mut [f32],
        ended: &mut Vec<VoiceHandle>,
    );

    fn active_voices(&self) -> usize;
}
