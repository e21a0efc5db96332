//! Seams between the session and the outside world: capture devices, the
//! decoder, the playback engine and the clock.
//!
//! The session only talks to these traits. The implementations here wire them
//! to cpal (through `studio_engine`) and symphonia (through `studio_codec`);
//! tests use the in-memory fakes in `crate::testing`.

use std::time::{Duration, Instant};

use basedrop::Shared;
use studio_codec::{DecodeError, EncodedBlob, decode_blob};
use studio_engine::capture::{CpalCapture, CpalInputStream, OpenError};
use studio_engine::{AudioEngineHandle, Command, Status};
use studio_transport::{AudioArc, ClipId, TrackId};

use crate::devices::DeviceId;
use crate::error::CaptureError;

/// An input device as the capture backend reports it. `label` is the raw
/// name and may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    pub id: DeviceId,
    pub label: String,
}

pub trait CaptureStream {
    fn device_id(&self) -> &str;
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    /// Append every interleaved sample captured since the last read.
    fn read(&mut self, out: &mut Vec<f32>);
    fn stop(&mut self);
    /// False once stopped or once the device reported an error.
    fn is_live(&self) -> bool;
}

pub trait CaptureService {
    fn input_devices(&self) -> Vec<InputDeviceInfo>;
    fn acquire(&mut self, device: &DeviceId) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

pub trait AudioDecoder {
    fn decode(&self, blob: &EncodedBlob) -> Result<AudioArc, DecodeError>;
}

/// Per-clip playback voices. Positions are seconds into the clip's buffer.
pub trait PlaybackSink {
    fn load(&mut self, clip: ClipId, track: TrackId, audio: &AudioArc) -> anyhow::Result<()>;
    fn assign_track(&mut self, clip: ClipId, track: TrackId);
    fn play(&mut self, clip: ClipId, position_secs: f64);
    fn pause(&mut self, clip: ClipId);
    fn set_track_gain(&mut self, track: TrackId, gain: f32);
    /// Periodic housekeeping on the control thread.
    fn poll(&mut self) {}
}

pub trait Clock {
    /// Monotonic time since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, blob: &EncodedBlob) -> Result<AudioArc, DecodeError> {
        decode_blob(blob)
    }
}

impl PlaybackSink for AudioEngineHandle {
    fn load(&mut self, clip: ClipId, track: TrackId, audio: &AudioArc) -> anyhow::Result<()> {
        let audio = if audio.sample_rate() == self.sample_rate() {
            audio.clone()
        } else {
            audio.resample(self.sample_rate())?
        };
        let audio = Shared::new(self.handle(), audio);
        if !self.send(Command::Load { clip, track, audio }) {
            anyhow::bail!("engine did not accept {clip}");
        }
        Ok(())
    }

    fn assign_track(&mut self, clip: ClipId, track: TrackId) {
        self.send(Command::AssignTrack { clip, track });
    }

    fn play(&mut self, clip: ClipId, position_secs: f64) {
        self.send(Command::Play {
            clip,
            position_secs,
        });
    }

    fn pause(&mut self, clip: ClipId) {
        self.send(Command::Pause { clip });
    }

    fn set_track_gain(&mut self, track: TrackId, gain: f32) {
        self.send(Command::SetGain { track, gain });
    }

    fn poll(&mut self) {
        while let Some(status) = self.poll_status() {
            match status {
                Status::Finished(clip) => log::debug!("{clip} reached the end of its buffer"),
            }
        }
        self.collect();
    }
}

impl CaptureStream for CpalInputStream {
    fn device_id(&self) -> &str {
        CpalInputStream::device_id(self)
    }

    fn sample_rate(&self) -> u32 {
        CpalInputStream::sample_rate(self)
    }

    fn channels(&self) -> u16 {
        CpalInputStream::channels(self)
    }

    fn read(&mut self, out: &mut Vec<f32>) {
        CpalInputStream::read(self, out)
    }

    fn stop(&mut self) {
        CpalInputStream::stop(self)
    }

    fn is_live(&self) -> bool {
        CpalInputStream::is_live(self)
    }
}

impl CaptureService for CpalCapture {
    fn input_devices(&self) -> Vec<InputDeviceInfo> {
        match CpalCapture::input_devices(self) {
            Ok(devices) => devices
                .into_iter()
                .map(|device| InputDeviceInfo {
                    id: DeviceId::new(device.id),
                    label: device.label,
                })
                .collect(),
            Err(err) => {
                log::error!("listing input devices failed: {err}");
                Vec::new()
            }
        }
    }

    fn acquire(&mut self, device: &DeviceId) -> Result<Box<dyn CaptureStream>, CaptureError> {
        match self.open(device.as_str()) {
            Ok(stream) => Ok(Box::new(stream)),
            Err(OpenError::NotFound(_)) => Err(CaptureError::DeviceNotFound(device.clone())),
            Err(OpenError::PermissionDenied(_)) => Err(CaptureError::PermissionDenied(device.clone())),
            Err(OpenError::Backend { message, .. }) => Err(CaptureError::Backend {
                device: device.clone(),
                message,
            }),
        }
    }
}
