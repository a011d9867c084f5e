#![allow(dead_code)]

use audionotes_domain_song::{Note, NoteOrigin};
use audionotes_ports::audio::DeviceClock;
use audionotes_ports::types::DeviceTime;
use audionotes_ports::voice::{ToneSpec, VoiceError, VoiceHandle, VoicePort};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct ManualClock {
    now: Mutex<DeviceTime>,
}

impl ManualClock {
    pub fn new(now: DeviceTime) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: DeviceTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, dt: DeviceTime) {
        *self.now.lock() += dt;
    }
}

impl DeviceClock for ManualClock {
    fn now(&self) -> DeviceTime {
        *self.now.lock()
    }
}

#[derive(Debug, Default)]
pub struct VoiceLog {
    pub started: Vec<(VoiceHandle, ToneSpec)>,
    pub released: Vec<(VoiceHandle, DeviceTime, f64, DeviceTime)>,
    pub killed: Vec<VoiceHandle>,
    pub pending_ended: Vec<VoiceHandle>,
    /// Starts beyond this many are refused with a full queue.
    pub queue_limit: Option<usize>,
}

/// Voice port that records every call instead of sounding.
pub struct FakeVoices {
    log: Arc<Mutex<VoiceLog>>,
    next: u64,
    fail_after: Option<usize>,
}

impl FakeVoices {
    pub fn new() -> (Self, Arc<Mutex<VoiceLog>>) {
        let log = Arc::new(Mutex::new(VoiceLog::default()));
        (
            Self {
                log: log.clone(),
                next: 1,
                fail_after: None,
            },
            log,
        )
    }

    pub fn failing_after(accepted: usize) -> (Self, Arc<Mutex<VoiceLog>>) {
        let (mut voices, log) = Self::new();
        voices.fail_after = Some(accepted);
        (voices, log)
    }
}

impl VoicePort for FakeVoices {
    fn start(&mut self, spec: ToneSpec) -> Result<VoiceHandle, VoiceError> {
        let mut log = self.log.lock();
        if self.fail_after.is_some_and(|limit| log.started.len() >= limit) {
            return Err(VoiceError::DeviceUnavailable("unplugged".to_string()));
        }
        if log.queue_limit.is_some_and(|limit| log.started.len() >= limit) {
            return Err(VoiceError::QueueFull);
        }
        let handle = VoiceHandle(self.next);
        self.next += 1;
        log.started.push((handle, spec));
        Ok(handle)
    }

    fn release(
        &mut self,
        handle: VoiceHandle,
        at: DeviceTime,
        ramp_s: f64,
        stop_at: DeviceTime,
    ) -> Result<(), VoiceError> {
        self.log.lock().released.push((handle, at, ramp_s, stop_at));
        Ok(())
    }

    fn kill(&mut self, handle: VoiceHandle) -> Result<(), VoiceError> {
        self.log.lock().killed.push(handle);
        Ok(())
    }

    fn drain_ended(&mut self, out: &mut Vec<VoiceHandle>) {
        out.append(&mut self.log.lock().pending_ended);
    }
}

pub fn note(pitch: u8, start: f64, duration: f64) -> Note {
    Note::new(pitch, start, duration, 100, NoteOrigin::Captured).expect("valid note")
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}
