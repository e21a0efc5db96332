//! Input capture through cpal.
//!
//! Each opened stream pushes interleaved `f32` samples into its own ring
//! buffer; the control thread drains it with [`CpalInputStream::read`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::{
    FromSample, Sample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};

/// Seconds of audio the capture ring buffer can hold between reads.
const RING_SECONDS: usize = 4;

pub const DEFAULT_DEVICE_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: String,
    pub label: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("input device '{0}' not found")]
    NotFound(String),

    #[error("access to input device '{0}' was denied")]
    PermissionDenied(String),

    #[error("input device '{device}': {message}")]
    Backend { device: String, message: String },
}

pub struct CpalCapture {
    host: cpal::Host,
}

impl Default for CpalCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalCapture {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// All capture devices, with the system default listed first under the
    /// `default` id. cpal has no stable device ids, so names stand in for them.
    pub fn input_devices(&self) -> anyhow::Result<Vec<InputDevice>> {
        let mut devices = Vec::new();
        if let Some(device) = self.host.default_input_device() {
            devices.push(InputDevice {
                id: DEFAULT_DEVICE_ID.to_string(),
                label: device.name().unwrap_or_default(),
            });
        }
        for device in self.host.input_devices()? {
            let Ok(name) = device.name() else {
                continue;
            };
            devices.push(InputDevice {
                id: name.clone(),
                label: name,
            });
        }
        Ok(devices)
    }

    pub fn open(&self, device_id: &str) -> Result<CpalInputStream, OpenError> {
        let device = self
            .find_device(device_id)
            .ok_or_else(|| OpenError::NotFound(device_id.to_string()))?;

        let config = device.default_input_config().map_err(|err| match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                OpenError::NotFound(device_id.to_string())
            }
            other => classify(device_id, other.to_string()),
        })?;

        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels;

        let capacity = sample_rate as usize * channels as usize * RING_SECONDS;
        let (producer, consumer) = rtrb::RingBuffer::<f32>::new(capacity);
        let failed = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_input::<f32>(&device, &stream_config, producer, failed.clone())
            }
            cpal::SampleFormat::I16 => {
                build_input::<i16>(&device, &stream_config, producer, failed.clone())
            }
            cpal::SampleFormat::U16 => {
                build_input::<u16>(&device, &stream_config, producer, failed.clone())
            }
            other => {
                return Err(OpenError::Backend {
                    device: device_id.to_string(),
                    message: format!("unsupported sample format '{other}'"),
                });
            }
        }
        .map_err(|err| match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                OpenError::NotFound(device_id.to_string())
            }
            other => classify(device_id, other.to_string()),
        })?;

        stream
            .play()
            .map_err(|err| classify(device_id, err.to_string()))?;

        log::info!("capturing from '{device_id}' at {sample_rate} Hz, {channels} channels");

        Ok(CpalInputStream {
            device_id: device_id.to_string(),
            stream: Some(stream),
            samples: consumer,
            sample_rate,
            channels,
            failed,
        })
    }

    fn find_device(&self, device_id: &str) -> Option<cpal::Device> {
        if device_id == DEFAULT_DEVICE_ID {
            return self.host.default_input_device();
        }
        self.host
            .input_devices()
            .ok()?
            .find(|d| d.name().is_ok_and(|name| name == device_id))
    }
}

fn classify(device_id: &str, message: String) -> OpenError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        OpenError::PermissionDenied(device_id.to_string())
    } else {
        OpenError::Backend {
            device: device_id.to_string(),
            message,
        }
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: rtrb::Producer<f32>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                // overflow means the control thread stopped reading; drop
                if producer.push(f32::from_sample(sample)).is_err() {
                    break;
                }
            }
        },
        move |err| {
            log::error!("input stream error: {err}");
            failed.store(true, Ordering::Relaxed);
        },
        None,
    )
}

/// A live capture from one input device.
pub struct CpalInputStream {
    device_id: String,
    stream: Option<cpal::Stream>,
    samples: rtrb::Consumer<f32>,
    sample_rate: u32,
    channels: u16,
    failed: Arc<AtomicBool>,
}

impl CpalInputStream {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Move everything captured since the last call into `out`.
    pub fn read(&mut self, out: &mut Vec<f32>) {
        let available = self.samples.slots();
        out.reserve(available);
        while let Ok(sample) = self.samples.pop() {
            out.push(sample);
        }
    }

    /// Stop the hardware stream. Samples still buffered can be read afterwards.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::debug!("pausing input '{}' failed: {err}", self.device_id);
            }
            log::info!("closed input '{}'", self.device_id);
        }
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_some() && !self.failed.load(Ordering::Relaxed)
    }
}

impl Drop for CpalInputStream {
    fn drop(&mut self) {
        self.stop();
    }
}
