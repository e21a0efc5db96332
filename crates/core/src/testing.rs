//! In-memory stand-ins for the backend traits.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use studio_codec::{DecodeError, EncodedBlob};
use studio_transport::{AudioArc, ClipId, TrackId};

use crate::backend::{AudioDecoder, CaptureService, CaptureStream, Clock, InputDeviceInfo, PlaybackSink};
use crate::devices::DeviceId;
use crate::error::CaptureError;

pub const FAKE_SAMPLE_RATE: u32 = 8000;

#[derive(Debug, Default)]
struct StreamInner {
    device: String,
    pending: Vec<f32>,
    stopped: bool,
    failed: bool,
}

/// Shared view of a fake stream, kept by the test after the stream itself
/// has been handed to the code under test.
#[derive(Debug, Clone, Default)]
pub struct FakeStreamState(Rc<RefCell<StreamInner>>);

impl FakeStreamState {
    pub fn push(&self, samples: &[f32]) {
        self.0.borrow_mut().pending.extend_from_slice(samples);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.borrow().stopped
    }

    pub fn device(&self) -> String {
        self.0.borrow().device.clone()
    }

    pub fn fail(&self) {
        self.0.borrow_mut().failed = true;
    }
}

struct FakeStream {
    device: String,
    channels: u16,
    state: FakeStreamState,
}

impl CaptureStream for FakeStream {
    fn device_id(&self) -> &str {
        &self.device
    }

    fn sample_rate(&self) -> u32 {
        FAKE_SAMPLE_RATE
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, out: &mut Vec<f32>) {
        out.append(&mut self.state.0.borrow_mut().pending);
    }

    fn stop(&mut self) {
        self.state.0.borrow_mut().stopped = true;
    }

    fn is_live(&self) -> bool {
        let inner = self.state.0.borrow();
        !inner.stopped && !inner.failed
    }
}

#[derive(Debug, Default)]
struct CaptureInner {
    devices: Vec<InputDeviceInfo>,
    denied: Vec<DeviceId>,
    streams: Vec<FakeStreamState>,
}

/// Device list and stream factory. Clones share state, so a test can keep a
/// handle after boxing one into a session.
#[derive(Debug, Clone, Default)]
pub struct FakeCapture(Rc<RefCell<CaptureInner>>);

impl FakeCapture {
    pub fn with_devices(ids: &[&str]) -> Self {
        let capture = Self::default();
        capture.0.borrow_mut().devices = ids
            .iter()
            .map(|id| InputDeviceInfo {
                id: DeviceId::new(*id),
                label: format!("{id} mic"),
            })
            .collect();
        capture
    }

    pub fn deny(&self, device: DeviceId) {
        self.0.borrow_mut().denied.push(device);
    }

    pub fn plug(&self, id: &str) {
        self.0.borrow_mut().devices.push(InputDeviceInfo {
            id: DeviceId::new(id),
            label: format!("{id} mic"),
        });
    }

    /// Remove a device; streams already open on it stop delivering.
    pub fn unplug(&self, device: &DeviceId) {
        let mut inner = self.0.borrow_mut();
        inner.devices.retain(|d| &d.id != device);
        for state in &inner.streams {
            if state.device() == device.as_str() {
                state.fail();
            }
        }
    }

    /// Drop `device` from the list while its open streams keep delivering.
    pub fn vanish(&self, device: &DeviceId) {
        self.0.borrow_mut().devices.retain(|d| &d.id != device);
    }

    /// Every stream handed out, in acquisition order.
    pub fn stream_states(&self) -> Vec<FakeStreamState> {
        self.0.borrow().streams.clone()
    }

    pub fn last_stream_state(&self) -> Option<FakeStreamState> {
        self.0.borrow().streams.last().cloned()
    }

    pub fn live_streams(&self) -> usize {
        self.0
            .borrow()
            .streams
            .iter()
            .filter(|s| !s.is_stopped() && !s.0.borrow().failed)
            .count()
    }
}

impl CaptureService for FakeCapture {
    fn input_devices(&self) -> Vec<InputDeviceInfo> {
        self.0.borrow().devices.clone()
    }

    fn acquire(&mut self, device: &DeviceId) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let mut inner = self.0.borrow_mut();
        if !inner.devices.iter().any(|d| &d.id == device) {
            return Err(CaptureError::DeviceNotFound(device.clone()));
        }
        if inner.denied.contains(device) {
            return Err(CaptureError::PermissionDenied(device.clone()));
        }

        let state = FakeStreamState::default();
        state.0.borrow_mut().device = device.as_str().to_string();
        inner.streams.push(state.clone());
        Ok(Box::new(FakeStream {
            device: device.as_str().to_string(),
            channels: 1,
            state,
        }))
    }
}

/// Rejects every blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingDecoder;

impl AudioDecoder for FailingDecoder {
    fn decode(&self, _blob: &EncodedBlob) -> Result<AudioArc, DecodeError> {
        Err(DecodeError::NoTrack)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Load { clip: ClipId, track: TrackId },
    Assign { clip: ClipId, track: TrackId },
    Play { clip: ClipId, position_secs: f64 },
    Pause(ClipId),
    Gain { track: TrackId, gain: f32 },
}

#[derive(Debug, Default)]
struct SinkInner {
    events: Vec<SinkEvent>,
    loaded: BTreeMap<ClipId, TrackId>,
    reject_loads: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSink(Rc<RefCell<SinkInner>>);

impl FakeSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.0.borrow().events.clone()
    }

    pub fn take_events(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut self.0.borrow_mut().events)
    }

    pub fn is_loaded(&self, clip: ClipId) -> bool {
        self.0.borrow().loaded.contains_key(&clip)
    }

    pub fn track_of(&self, clip: ClipId) -> Option<TrackId> {
        self.0.borrow().loaded.get(&clip).copied()
    }

    /// Fail every later `load`, as an engine with a full queue would.
    pub fn reject_loads(&self) {
        self.0.borrow_mut().reject_loads = true;
    }

    fn push(&self, event: SinkEvent) {
        self.0.borrow_mut().events.push(event);
    }
}

impl PlaybackSink for FakeSink {
    fn load(&mut self, clip: ClipId, track: TrackId, _audio: &AudioArc) -> anyhow::Result<()> {
        if self.0.borrow().reject_loads {
            anyhow::bail!("engine did not accept {clip}");
        }
        self.0.borrow_mut().loaded.insert(clip, track);
        self.push(SinkEvent::Load { clip, track });
        Ok(())
    }

    fn assign_track(&mut self, clip: ClipId, track: TrackId) {
        if let Some(owner) = self.0.borrow_mut().loaded.get_mut(&clip) {
            *owner = track;
        }
        self.push(SinkEvent::Assign { clip, track });
    }

    fn play(&mut self, clip: ClipId, position_secs: f64) {
        self.push(SinkEvent::Play {
            clip,
            position_secs,
        });
    }

    fn pause(&mut self, clip: ClipId) {
        self.push(SinkEvent::Pause(clip));
    }

    fn set_track_gain(&mut self, track: TrackId, gain: f32) {
        self.push(SinkEvent::Gain { track, gain });
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeClock(Rc<Cell<Duration>>);

impl FakeClock {
    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }

    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    pub fn set(&self, at: Duration) {
        self.0.set(at);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.0.get()
    }
}

/// Mono test signal at [`FAKE_SAMPLE_RATE`].
pub fn tone(duration_secs: f64) -> Vec<f32> {
    let frames = (duration_secs * FAKE_SAMPLE_RATE as f64).round() as usize;
    (0..frames)
        .map(|i| (i as f32 * 0.05).sin() * 0.5)
        .collect()
}

pub fn audio(duration_secs: f64) -> AudioArc {
    AudioArc::new(tone(duration_secs), FAKE_SAMPLE_RATE, 1)
}
