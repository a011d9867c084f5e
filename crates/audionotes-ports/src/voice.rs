use crate::types::DeviceTime;
use serde::{Deserialize, Serialize};

/// Renderer-side identity of one sounding tone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Waveform {
    Sine,
    #[default]
    Triangle,
    Square,
    Sawtooth,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GainEvent {
    SetValue { at: DeviceTime, value: f32 },
    /// Ramps linearly from the previous event's value and time.
    LinearRamp { end_at: DeviceTime, value: f32 },
}

impl GainEvent {
    pub fn time(&self) -> DeviceTime {
        match *self {
            GainEvent::SetValue { at, .. } => at,
            GainEvent::LinearRamp { end_at, .. } => end_at,
        }
    }
}

/// Gain automation timeline in absolute device time.
///
/// Events are kept ordered by time; a ramp starts at the event preceding it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GainAutomation {
    initial: f32,
    events: Vec<GainEvent>,
}

impl GainAutomation {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::with_capacity(6),
        }
    }

    pub fn events(&self) -> &[GainEvent] {
        &self.events
    }

    pub fn set_value_at(&mut self, value: f32, at: DeviceTime) {
        self.insert(GainEvent::SetValue { at, value });
    }

    pub fn linear_ramp_to(&mut self, value: f32, end_at: DeviceTime) {
        self.insert(GainEvent::LinearRamp { end_at, value });
    }

    /// Drops every event at or after `at` and holds the value the timeline had there.
    pub fn cancel_and_hold(&mut self, at: DeviceTime) {
        let held = self.value_at(at);
        self.events.retain(|event| event.time() < at);
        self.events.push(GainEvent::SetValue { at, value: held });
    }

    pub fn end_time(&self) -> Option<DeviceTime> {
        self.events.last().map(GainEvent::time)
    }

    pub fn value_at(&self, t: DeviceTime) -> f32 {
        let mut value = self.initial;
        let mut last_time: Option<DeviceTime> = None;

        for event in &self.events {
            match *event {
                GainEvent::SetValue { at, value: next } => {
                    if t < at {
                        return value;
                    }
                    value = next;
                    last_time = Some(at);
                }
                GainEvent::LinearRamp { end_at, value: target } => {
                    if t < end_at {
                        let Some(start) = last_time else {
                            return value;
                        };
                        let span = end_at - start;
                        if span <= 0.0 {
                            return target;
                        }
                        let frac = ((t - start) / span).clamp(0.0, 1.0) as f32;
                        return value + (target - value) * frac;
                    }
                    value = target;
                    last_time = Some(end_at);
                }
            }
        }

        value
    }

    fn insert(&mut self, event: GainEvent) {
        let time = event.time();
        let index = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(index, event);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    pub waveform: Waveform,
    pub gain: GainAutomation,
    pub start_at: DeviceTime,
    pub stop_at: DeviceTime,
}

#[derive(Clone, Debug, PartialEq)]
pub enum VoiceCommand {
    Start {
        handle: VoiceHandle,
        spec: ToneSpec,
    },
    /// Abbreviated release: ramp to near silence over `ramp_s`, then stop.
    Release {
        handle: VoiceHandle,
        at: DeviceTime,
        ramp_s: f64,
        stop_at: DeviceTime,
    },
    Kill {
        handle: VoiceHandle,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VoiceError {
    #[error("voice queue full")]
    QueueFull,
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Control side of the voice renderer, used by the scheduler.
pub trait VoicePort: Send {
    fn start(&mut self, spec: ToneSpec) -> Result<VoiceHandle, VoiceError>;

    fn release(
        &mut self,
        handle: VoiceHandle,
        at: DeviceTime,
        ramp_s: f64,
        stop_at: DeviceTime,
    ) -> Result<(), VoiceError>;

    fn kill(&mut self, handle: VoiceHandle) -> Result<(), VoiceError>;

    /// Completion reports for voices the renderer has torn down.
    fn drain_ended(&mut self, out: &mut Vec<VoiceHandle>);
}
