use audionotes_ports::audio::{AudioError, AudioOutputPort, AudioRenderCallback, AudioStreamHandle};
use audionotes_ports::types::{AudioConfig, AudioOutputDevice, DeviceId, SampleTime};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedStreamConfigRange,
};
use std::sync::mpsc;
use std::thread;
use tracing::{error, warn};

/// Audio output over the default cpal host. Each stream lives on its own
/// thread, since cpal streams are not `Send` on every platform.
pub struct CpalAudioOutputPort {
    host: cpal::Host,
}

impl CpalAudioOutputPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn list_devices_from_host(
        host: &cpal::Host,
    ) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
        let host_id = format!("{:?}", host.id());
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| {
                let name = device_name(&device);
                (DeviceId(format!("cpal:{host_id}:{index}:{name}")), device)
            })
            .collect())
    }

    fn describe(id: DeviceId, device: &cpal::Device) -> Option<AudioOutputDevice> {
        let default_config = device.default_output_config().ok()?;
        Some(AudioOutputDevice {
            id,
            name: device_name(device),
            default_config: AudioConfig {
                sample_rate_hz: default_config.sample_rate().0,
                channels: default_config.channels(),
                buffer_size_frames: None,
            },
        })
    }
}

impl Default for CpalAudioOutputPort {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CpalAudioStreamHandle {
    config: AudioConfig,
    stop_tx: mpsc::Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl AudioStreamHandle for CpalAudioStreamHandle {
    fn config(&self) -> AudioConfig {
        self.config
    }

    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioOutputPort for CpalAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        Ok(Self::list_devices_from_host(&self.host)?
            .into_iter()
            .filter_map(|(id, device)| Self::describe(id, &device))
            .collect())
    }

    /// The host's default device comes first, unlike plain enumeration order.
    fn default_output(&self) -> Result<Option<AudioOutputDevice>, AudioError> {
        let Some(default) = self.host.default_output_device() else {
            return Ok(None);
        };
        let name = device_name(&default);
        let devices = Self::list_devices_from_host(&self.host)?;
        Ok(devices
            .into_iter()
            .find(|(_, device)| device_name(device) == name)
            .and_then(|(id, device)| Self::describe(id, &device)))
    }

    fn open_output(
        &self,
        device_id: &DeviceId,
        config: AudioConfig,
        mut cb: Box<dyn AudioRenderCallback>,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        let device_id = device_id.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join_handle = thread::spawn(move || {
            let host = cpal::default_host();
            let device = match Self::list_devices_from_host(&host).and_then(|devices| {
                devices
                    .into_iter()
                    .find(|(id, _)| id == &device_id)
                    .map(|(_, device)| device)
                    .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))
            }) {
                Ok(device) => device,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            let (stream_config, sample_format) = match select_stream_config(&device, config) {
                Ok(selected) => selected,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            let opened = AudioConfig {
                sample_rate_hz: stream_config.sample_rate.0,
                channels: stream_config.channels,
                buffer_size_frames: match stream_config.buffer_size {
                    BufferSize::Fixed(frames) => Some(frames),
                    BufferSize::Default => None,
                },
            };
            cb.prepare(opened.sample_rate_hz);

            let stream = match sample_format {
                SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, cb),
                SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, cb),
                SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, cb),
                SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, cb),
                other => {
                    let _ = ready_tx.send(Err(AudioError::UnsupportedConfig(format!(
                        "sample format {other:?}"
                    ))));
                    return;
                }
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(AudioError::Backend(err.to_string())));
                    return;
                }
            };

            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::Backend(err.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(opened));
            let _ = stop_rx.recv();
            drop(stream);
        });

        let opened = ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))??;
        Ok(Box::new(CpalAudioStreamHandle {
            config: opened,
            stop_tx,
            join_handle: Some(join_handle),
        }))
    }
}

fn device_name(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| "Unknown Output".to_string())
}

/// Exact rate and channel match first; otherwise the device default.
fn select_stream_config(
    device: &cpal::Device,
    desired: AudioConfig,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::Backend(e.to_string()))?;

    let chosen = match select_supported_config(&mut supported, desired) {
        Some(chosen) => chosen,
        None => {
            let fallback = device
                .default_output_config()
                .map_err(|e| AudioError::UnsupportedConfig(e.to_string()))?;
            warn!(
                requested = desired.sample_rate_hz,
                using = fallback.sample_rate().0,
                "requested output config unsupported, using device default"
            );
            fallback
        }
    };

    let sample_format = chosen.sample_format();
    let mut config = chosen.config();
    config.buffer_size = match desired.buffer_size_frames {
        Some(frames) => BufferSize::Fixed(frames),
        None => BufferSize::Default,
    };
    Ok((config, sample_format))
}

fn select_supported_config(
    supported: &mut dyn Iterator<Item = SupportedStreamConfigRange>,
    desired: AudioConfig,
) -> Option<cpal::SupportedStreamConfig> {
    supported
        .filter(|range| range.channels() == desired.channels)
        .filter(|range| {
            (range.min_sample_rate().0..=range.max_sample_rate().0)
                .contains(&desired.sample_rate_hz)
        })
        .max_by_key(|range| format_rank(range.sample_format()))
        .map(|range| range.with_sample_rate(SampleRate(desired.sample_rate_hz)))
}

fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::F32 => 4,
        SampleFormat::I32 => 3,
        SampleFormat::I16 => 2,
        SampleFormat::U16 => 1,
        _ => 0,
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut cb: Box<dyn AudioRenderCallback>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    let initial_frames = match config.buffer_size {
        BufferSize::Fixed(frames) => frames as usize,
        BufferSize::Default => 8192,
    };
    let mut left = vec![0.0_f32; initial_frames];
    let mut right = vec![0.0_f32; initial_frames];
    let mut sample_time: SampleTime = 0;

    device.build_output_stream(
        config,
        move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            if frames > left.len() {
                left.resize(frames, 0.0);
                right.resize(frames, 0.0);
            }
            cb.render(sample_time, &mut left[..frames], &mut right[..frames]);
            write_interleaved(data, channels, &left[..frames], &right[..frames]);
            sample_time = sample_time.saturating_add(frames as u64);
        },
        |err| error!("cpal stream error: {err}"),
        None,
    )
}

/// Stereo into the first two channels, mono as the average, extra
/// channels silent.
fn write_interleaved<T>(data: &mut [T], channels: usize, left: &[f32], right: &[f32])
where
    T: Sample + FromSample<f32>,
{
    for (frame, chunk) in data.chunks_mut(channels.max(1)).enumerate() {
        let l = left.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        let r = right.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        match chunk {
            [] => {}
            [mono] => *mono = T::from_sample((l + r) * 0.5),
            [first, second, rest @ ..] => {
                *first = T::from_sample(l);
                *second = T::from_sample(r);
                for sample in rest {
                    *sample = T::EQUILIBRIUM;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_frames_are_interleaved() {
        let mut data = [0.0_f32; 6];
        write_interleaved(&mut data, 2, &[0.1, 0.2, 0.3], &[-0.1, -0.2, -0.3]);
        assert_eq!(data, [0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn mono_output_averages_channels() {
        let mut data = [1.0_f32; 2];
        write_interleaved(&mut data, 1, &[0.5, 1.0], &[0.1, 0.0]);
        assert!((data[0] - 0.3).abs() < 1e-6);
        assert!((data[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn surround_extras_are_silent_and_clipped() {
        let mut data = [7_i16; 4];
        write_interleaved(&mut data, 4, &[2.0], &[-2.0]);
        assert_eq!(data[0], i16::MAX);
        assert!(data[1] <= -i16::MAX);
        assert_eq!(&data[2..], &[0, 0]);
    }

    #[test]
    fn config_selection_prefers_float_at_requested_rate() {
        use cpal::SupportedBufferSize;
        let ranges = vec![
            SupportedStreamConfigRange::new(
                2,
                SampleRate(44_100),
                SampleRate(48_000),
                SupportedBufferSize::Unknown,
                SampleFormat::I16,
            ),
            SupportedStreamConfigRange::new(
                2,
                SampleRate(44_100),
                SampleRate(96_000),
                SupportedBufferSize::Unknown,
                SampleFormat::F32,
            ),
            SupportedStreamConfigRange::new(
                1,
                SampleRate(48_000),
                SampleRate(48_000),
                SupportedBufferSize::Unknown,
                SampleFormat::F32,
            ),
        ];
        let chosen = select_supported_config(&mut ranges.into_iter(), AudioConfig::default())
            .expect("a match");
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
        assert_eq!(chosen.channels(), 2);
        assert_eq!(chosen.sample_rate(), SampleRate(48_000));
    }
}
