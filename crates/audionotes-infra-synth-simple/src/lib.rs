use audionotes_ports::synth::SynthPort;
use audionotes_ports::types::{DeviceTime, SampleTime};
use audionotes_ports::voice::{GainAutomation, VoiceCommand, VoiceHandle, Waveform};
use parking_lot::Mutex;
use std::f32::consts::TAU;

const AMPLITUDE: f32 = 0.2;
const RELEASE_FLOOR: f32 = 0.0001;

/// Oscillator voices with sample-accurate gain automation.
pub struct SimpleSynth {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    sample_rate_hz: f64,
    max_voices: usize,
    voices: Vec<Voice>,
    ended: Vec<VoiceHandle>,
    counter: u64,
}

#[derive(Clone, Debug)]
struct Voice {
    handle: VoiceHandle,
    freq: f32,
    waveform: Waveform,
    phase: f32,
    gain: GainAutomation,
    start_at: DeviceTime,
    stop_at: DeviceTime,
    age: u64,
}

impl SimpleSynth {
    pub fn new(sample_rate_hz: u32, max_voices: usize) -> Self {
        let max_voices = max_voices.max(8);
        Self {
            inner: Mutex::new(Inner {
                sample_rate_hz: sample_rate_hz.max(1) as f64,
                max_voices,
                voices: Vec::with_capacity(max_voices),
                ended: Vec::with_capacity(max_voices),
                counter: 0,
            }),
        }
    }
}

impl Default for SimpleSynth {
    fn default() -> Self {
        Self::new(48_000, 128)
    }
}

impl Inner {
    fn apply(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::Start { handle, spec } => {
                if self.voices.len() >= self.max_voices {
                    if let Some((idx, _)) = self
                        .voices
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, voice)| voice.age)
                    {
                        let stolen = self.voices.swap_remove(idx);
                        self.ended.push(stolen.handle);
                    }
                }
                self.counter = self.counter.wrapping_add(1);
                self.voices.push(Voice {
                    handle,
                    freq: spec.frequency_hz,
                    waveform: spec.waveform,
                    phase: 0.0,
                    gain: spec.gain,
                    start_at: spec.start_at,
                    stop_at: spec.stop_at,
                    age: self.counter,
                });
            }
            VoiceCommand::Release {
                handle,
                at,
                ramp_s,
                stop_at,
            } => {
                if let Some(voice) = self.voices.iter_mut().find(|v| v.handle == handle) {
                    voice.gain.cancel_and_hold(at);
                    voice.gain.linear_ramp_to(RELEASE_FLOOR, at + ramp_s.max(0.0));
                    voice.stop_at = voice.stop_at.min(stop_at);
                }
            }
            VoiceCommand::Kill { handle } => {
                if let Some(idx) = self.voices.iter().position(|v| v.handle == handle) {
                    self.voices.swap_remove(idx);
                    self.ended.push(handle);
                }
            }
        }
    }

    fn render(
        &mut self,
        sample_time_start: SampleTime,
        out_l: &mut [f32],
        out_r: &mut [f32],
        ended: &mut Vec<VoiceHandle>,
    ) {
        let frames = out_l.len().min(out_r.len());
        for value in out_l.iter_mut() {
            *value = 0.0;
        }
        for value in out_r.iter_mut() {
            *value = 0.0;
        }

        let sample_rate = self.sample_rate_hz;
        for voice in &mut self.voices {
            let phase_step = voice.freq / sample_rate as f32;
            for i in 0..frames {
                let t = (sample_time_start + i as u64) as f64 / sample_rate;
                if t < voice.start_at {
                    continue;
                }
                if t >= voice.stop_at {
                    break;
                }
                let sample = oscillator(voice.waveform, voice.phase)
                    * voice.gain.value_at(t)
                    * AMPLITUDE;
                out_l[i] += sample;
                out_r[i] += sample;
                voice.phase += phase_step;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }
            }
        }

        let block_end = (sample_time_start + frames as u64) as f64 / sample_rate;
        let finished = &mut self.ended;
        self.voices.retain(|voice| {
            let alive = voice.stop_at > block_end;
            if !alive {
                finished.push(voice.handle);
            }
            alive
        });
        ended.append(&mut self.ended);
    }
}

/// One cycle of `waveform` at normalized phase `p` in [0, 1).
fn oscillator(waveform: Waveform, p: f32) -> f32 {
    match waveform {
        Waveform::Sine => (TAU * p).sin(),
        Waveform::Triangle => 1.0 - 4.0 * ((p + 0.25).fract() - 0.5).abs(),
        Waveform::Square => {
            if p < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => 2.0 * (p + 0.5).fract() - 1.0,
    }
}

impl SynthPort for SimpleSynth {
    fn set_sample_rate(&self, sample_rate_hz: u32) {
        let mut inner = self.inner.lock();
        inner.sample_rate_hz = sample_rate_hz.max(1) as f64;
    }

    fn handle_command(&self, command: VoiceCommand) {
        self.inner.lock().apply(command);
    }

    fn render(
        &self,
        sample_time_start: SampleTime,
        out_l: &mut [f32],
        out_r: &mut [f32],
        ended: &mut Vec<VoiceHandle>,
    ) {
        let mut inner = self.inner.lock();
        inner.render(sample_time_start, out_l, out_r, ended);
    }

    fn active_voices(&self) -> usize {
        self.inner.lock().voices.len()
    }
}
