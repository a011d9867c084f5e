use crate::audio_params::AudioParams;
use audionotes_ports::audio::{AudioRenderCallback, DeviceClock};
use audionotes_ports::synth::SynthPort;
use audionotes_ports::types::{DeviceTime, SampleTime};
use audionotes_ports::voice::{
    ToneSpec, VoiceCommand, VoiceError, VoiceHandle, VoicePort,
};
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
};

pub const VOICE_COMMAND_CAPACITY: usize = 4096;
const ENDED_CAPACITY: usize = 4096;

/// Device clock driven by the audio callback: samples rendered so far.
pub struct AudioClock {
    sample_time: AtomicU64,
    sample_rate_hz: AtomicU32,
}

impl AudioClock {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            sample_time: AtomicU64::new(0),
            sample_rate_hz: AtomicU32::new(sample_rate_hz.max(1)),
        }
    }

    pub fn set(&self, sample_time: SampleTime) {
        self.sample_time.store(sample_time, Ordering::Relaxed);
    }

    pub fn get(&self) -> SampleTime {
        self.sample_time.load(Ordering::Relaxed)
    }

    pub fn set_sample_rate(&self, sample_rate_hz: u32) {
        self.sample_rate_hz
            .store(sample_rate_hz.max(1), Ordering::Relaxed);
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz.load(Ordering::Relaxed)
    }
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new(48_000)
    }
}

impl DeviceClock for AudioClock {
    fn now(&self) -> DeviceTime {
        self.get() as f64 / self.sample_rate_hz() as f64
    }
}

/// Control-thread end of the voice rings.
pub struct VoiceLink {
    commands: Producer<VoiceCommand>,
    ended: Consumer<VoiceHandle>,
    next_handle: u64,
}

impl VoiceLink {
    fn push(&mut self, command: VoiceCommand) -> Result<(), VoiceError> {
        match self.commands.push(command) {
            Ok(()) => Ok(()),
            Err(PushError::Full(_)) => Err(VoiceError::QueueFull),
        }
    }
}

impl VoicePort for VoiceLink {
    fn start(&mut self, spec: ToneSpec) -> Result<VoiceHandle, VoiceError> {
        let handle = VoiceHandle(self.next_handle);
        self.push(VoiceCommand::Start { handle, spec })?;
        self.next_handle += 1;
        Ok(handle)
    }

    fn release(
        &mut self,
        handle: VoiceHandle,
        at: DeviceTime,
        ramp_s: f64,
        stop_at: DeviceTime,
    ) -> Result<(), VoiceError> {
        self.push(VoiceCommand::Release {
            handle,
            at,
            ramp_s,
            stop_at,
        })
    }

    fn kill(&mut self, handle: VoiceHandle) -> Result<(), VoiceError> {
        self.push(VoiceCommand::Kill { handle })
    }

    fn drain_ended(&mut self, out: &mut Vec<VoiceHandle>) {
        while let Ok(handle) = self.ended.pop() {
            out.push(handle);
        }
    }
}

/// Audio-thread end: applies voice commands, renders the synth, then master
/// volume and a soft limiter.
pub struct AudioGraph {
    synth: Arc<dyn SynthPort>,
    params: Arc<AudioParams>,
    clock: Arc<AudioClock>,
    commands: Consumer<VoiceCommand>,
    ended_tx: Producer<VoiceHandle>,
    ended: Vec<VoiceHandle>,
    limiter_gain: f32,
}

impl AudioGraph {
    pub fn new(
        synth: Arc<dyn SynthPort>,
        params: Arc<AudioParams>,
        clock: Arc<AudioClock>,
        capacity: usize,
    ) -> (Self, VoiceLink) {
        let (commands_tx, commands) = RingBuffer::new(capacity.max(1));
        let (ended_tx, ended_rx) = RingBuffer::new(ENDED_CAPACITY.max(capacity));
        let graph = Self {
            synth,
            params,
            clock,
            commands,
            ended_tx,
            ended: Vec::with_capacity(256),
            limiter_gain: 1.0,
        };
        let link = VoiceLink {
            commands: commands_tx,
            ended: ended_rx,
            next_handle: 1,
        };
        (graph, link)
    }

    fn apply_master(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let master = if self.params.playback_enabled() {
            self.params.master()
        } else {
            0.0
        };
        let mut peak = 0.0_f32;
        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            *l *= master;
            *r *= master;
            peak = peak.max(l.abs()).max(r.abs());
        }

        let limit = 0.98_f32;
        let target_gain = if peak > limit { limit / peak } else { 1.0 };
        let current_gain = self.limiter_gain;
        let coeff = if target_gain < current_gain {
            0.25
        } else {
            0.01
        };
        let new_gain = (current_gain + coeff * (target_gain - current_gain)).clamp(0.0, 1.0);
        self.limiter_gain = new_gain;

        if new_gain < 0.999 {
            for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
                *l *= new_gain;
                *r *= new_gain;
            }
        }
    }
}

impl AudioRenderCallback for AudioGraph {
    fn prepare(&mut self, sample_rate_hz: u32) {
        self.synth.set_sample_rate(sample_rate_hz);
        self.clock.set_sample_rate(sample_rate_hz);
    }

    fn render(&mut self, sample_time_start: SampleTime, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = out_l.len().min(out_r.len());
        let (out_l, out_r) = (&mut out_l[..frames], &mut out_r[..frames]);

        // Commands carry absolute device times, so applying them at block
        // start keeps envelopes sample-accurate.
        while let Ok(command) = self.commands.pop() {
            self.synth.handle_command(command);
        }

        self.ended.clear();
        self.synth
            .render(sample_time_start, out_l, out_r, &mut self.ended);
        self.apply_master(out_l, out_r);

        for handle in self.ended.drain(..) {
            if self.ended_tx.push(handle).is_err() {
                break;
            }
        }

        self.clock
            .set(sample_time_start.saturating_add(frames as u64));
    }
}
