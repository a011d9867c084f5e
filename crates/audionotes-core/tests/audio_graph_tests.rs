use audionotes_core::{AudioClock, AudioGraph, AudioParams};
use audionotes_ports::audio::{AudioRenderCallback, DeviceClock};
use audionotes_ports::storage::SettingsDto;
use audionotes_ports::synth::SynthPort;
use audionotes_ports::types::{SampleTime, Volume01};
use audionotes_ports::voice::{
    GainAutomation, ToneSpec, VoiceCommand, VoiceError, VoiceHandle, VoicePort, Waveform,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Writes a constant level and reports killed voices as ended.
struct ConstSynth {
    level: f32,
    rate: Mutex<u32>,
    commands: Mutex<Vec<VoiceCommand>>,
    killed: Mutex<Vec<VoiceHandle>>,
}

impl ConstSynth {
    fn new(level: f32) -> Arc<Self> {
        Arc::new(Self {
            level,
            rate: Mutex::new(0),
            commands: Mutex::new(Vec::new()),
            killed: Mutex::new(Vec::new()),
        })
    }
}

impl SynthPort for ConstSynth {
    fn set_sample_rate(&self, sample_rate_hz: u32) {
        *self.rate.lock() = sample_rate_hz;
    }

    fn handle_command(&self, command: VoiceCommand) {
        if let VoiceCommand::Kill { handle } = &command {
            self.killed.lock().push(*handle);
        }
        self.commands.lock().push(command);
    }

    fn render(
        &self,
        _sample_time_start: SampleTime,
        out_l: &mut [f32],
        out_r: &mut [f32],
        ended: &mut Vec<VoiceHandle>,
    ) {
        out_l.fill(self.level);
        out_r.fill(self.level);
        ended.append(&mut self.killed.lock());
    }

    fn active_voices(&self) -> usize {
        0
    }
}

fn params(master: f32) -> Arc<AudioParams> {
    Arc::new(AudioParams::new(&SettingsDto {
        master_volume: Volume01::new(master),
        ..SettingsDto::default()
    }))
}

fn tone() -> ToneSpec {
    ToneSpec {
        frequency_hz: 440.0,
        waveform: Waveform::Triangle,
        gain: GainAutomation::new(0.0),
        start_at: 0.0,
        stop_at: 1.0,
    }
}

fn block(graph: &mut AudioGraph, at: SampleTime, frames: usize) -> Vec<f32> {
    let mut left = vec![0.0; frames];
    let mut right = vec![0.0; frames];
    graph.render(at, &mut left, &mut right);
    assert_eq!(left, right);
    left
}

#[test]
fn master_volume_scales_output_and_clock_advances() {
    let clock = Arc::new(AudioClock::new(48_000));
    let (mut graph, _link) =
        AudioGraph::new(ConstSynth::new(0.4), params(0.5), clock.clone(), 16);

    let out = block(&mut graph, 0, 480);
    assert!(out.iter().all(|s| (s - 0.2).abs() < 1e-6));
    assert_eq!(clock.get(), 480);
    assert!((clock.now() - 0.01).abs() < 1e-12);
}

#[test]
fn disabled_playback_is_silent() {
    let audio_params = params(1.0);
    audio_params.set_playback_enabled(false);
    let (mut graph, _link) = AudioGraph::new(
        ConstSynth::new(0.4),
        audio_params,
        Arc::new(AudioClock::default()),
        16,
    );
    assert!(block(&mut graph, 0, 64).iter().all(|s| *s == 0.0));
}

#[test]
fn limiter_pulls_hot_signal_under_ceiling() {
    let (mut graph, _link) = AudioGraph::new(
        ConstSynth::new(2.0),
        params(1.0),
        Arc::new(AudioClock::default()),
        16,
    );

    let mut previous = f32::MAX;
    let mut last = 0.0;
    for i in 0..60 {
        last = block(&mut graph, i * 64, 64)[0];
        assert!(last <= previous);
        previous = last;
    }
    assert!(last < 0.99, "settled at {last}");
    assert!(last > 0.9);
}

#[test]
fn prepare_sets_negotiated_rate() {
    let synth = ConstSynth::new(0.0);
    let clock = Arc::new(AudioClock::new(48_000));
    let (mut graph, _link) = AudioGraph::new(synth.clone(), params(1.0), clock.clone(), 16);

    graph.prepare(44_100);
    assert_eq!(*synth.rate.lock(), 44_100);
    assert_eq!(clock.sample_rate_hz(), 44_100);
    block(&mut graph, 0, 441);
    assert!((clock.now() - 0.01).abs() < 1e-12);
}

#[test]
fn voice_commands_cross_to_the_render_side_and_ended_handles_return() {
    let synth = ConstSynth::new(0.0);
    let (mut graph, mut link) = AudioGraph::new(
        synth.clone(),
        params(1.0),
        Arc::new(AudioClock::default()),
        16,
    );

    let first = link.start(tone()).expect("queued");
    let second = link.start(tone()).expect("queued");
    assert_eq!((first, second), (VoiceHandle(1), VoiceHandle(2)));
    link.kill(first).expect("queued");
    assert!(synth.commands.lock().is_empty());

    block(&mut graph, 0, 32);
    assert_eq!(synth.commands.lock().len(), 3);

    let mut ended = Vec::new();
    link.drain_ended(&mut ended);
    assert_eq!(ended, vec![first]);
}

#[test]
fn full_command_ring_reports_queue_full() {
    let (_graph, mut link) = AudioGraph::new(
        ConstSynth::new(0.0),
        params(1.0),
        Arc::new(AudioClock::default()),
        2,
    );
    link.start(tone()).expect("queued");
    link.start(tone()).expect("queued");
    assert!(matches!(link.start(tone()), Err(VoiceError::QueueFull)));
}
