//! Input devices, per-track input assignment and the live capture streams
//! that back monitoring and recording.

use std::collections::BTreeMap;
use std::fmt;

use studio_transport::TrackId;

use crate::backend::{CaptureService, CaptureStream, InputDeviceInfo};
use crate::error::CaptureError;

const DEFAULT_DEVICE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The system default input.
    pub fn system_default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_system_default(&self) -> bool {
        self.0 == DEFAULT_DEVICE
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: DeviceId,
    /// Human readable, see [`display_label`].
    pub label: String,
}

/// Name shown for a device. Vendor suffixes and USB `(vid:pid)` ids are
/// stripped; unnamed devices get a positional `Input N`.
pub fn display_label(device: &InputDeviceInfo, index: usize) -> String {
    if device.id.is_system_default() {
        return "System Default".to_string();
    }
    if device.label.is_empty() {
        return format!("Input {}", index + 1);
    }

    let label = device.label.replacen(" (Built-in)", "", 1).replacen(" (Default)", "", 1);
    strip_usb_id(&label).trim().to_string()
}

/// Remove the first `(xxxx:xxxx)` hex id.
fn strip_usb_id(label: &str) -> String {
    let bytes = label.as_bytes();
    for start in label.match_indices('(').map(|(i, _)| i) {
        let Some(candidate) = bytes.get(start..start + 11) else {
            break;
        };
        let is_id = candidate[10] == b')'
            && candidate[5] == b':'
            && candidate[1..5].iter().all(u8::is_ascii_hexdigit)
            && candidate[6..10].iter().all(u8::is_ascii_hexdigit);
        if is_id {
            return format!("{}{}", &label[..start], &label[start + 11..]);
        }
    }
    label.to_string()
}

/// Meter reading in percent: `min(100, round(rms * 150))`.
pub fn input_level(samples: &[f32]) -> u8 {
    if samples.is_empty() {
        return 0;
    }
    let sum: f64 = samples.iter().map(|s| (*s as f64).powi(2)).sum();
    let rms = (sum / samples.len() as f64).sqrt();
    (rms * 150.0).round().min(100.0) as u8
}

/// At most one live capture stream per track.
#[derive(Default)]
pub struct StreamRegistry {
    streams: BTreeMap<TrackId, Box<dyn CaptureStream>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `stream` for `track`, stopping whatever was there before.
    pub fn insert(&mut self, track: TrackId, stream: Box<dyn CaptureStream>) {
        self.release(track);
        self.streams.insert(track, stream);
    }

    pub fn get_mut(&mut self, track: TrackId) -> Option<&mut Box<dyn CaptureStream>> {
        self.streams.get_mut(&track)
    }

    pub fn contains(&self, track: TrackId) -> bool {
        self.streams.contains_key(&track)
    }

    /// Stop and drop the stream for `track`. Returns whether there was one.
    pub fn release(&mut self, track: TrackId) -> bool {
        match self.streams.remove(&track) {
            Some(mut stream) => {
                stream.stop();
                log::debug!("released capture stream of {track} ({})", stream.device_id());
                true
            }
            None => false,
        }
    }

    pub fn release_all(&mut self) {
        let tracks: Vec<_> = self.streams.keys().copied().collect();
        for track in tracks {
            self.release(track);
        }
    }

    pub fn tracks(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.streams.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.streams.iter().map(|(track, stream)| (track, stream.device_id())))
            .finish()
    }
}

/// Which device feeds which track, plus the monitoring streams, meter levels
/// and device errors that go with those assignments.
#[derive(Debug, Default)]
pub struct InputRouting {
    devices: Vec<InputDevice>,
    assignments: BTreeMap<TrackId, DeviceId>,
    errors: BTreeMap<TrackId, CaptureError>,
    levels: BTreeMap<TrackId, u8>,
    streams: StreamRegistry,
}

impl InputRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> &[InputDevice] {
        &self.devices
    }

    /// Re-read the device list from the backend.
    pub fn refresh(&mut self, service: &dyn CaptureService) -> &[InputDevice] {
        self.devices = service
            .input_devices()
            .iter()
            .enumerate()
            .map(|(index, info)| InputDevice {
                id: info.id.clone(),
                label: display_label(info, index),
            })
            .collect();
        &self.devices
    }

    pub fn input(&self, track: TrackId) -> Option<&DeviceId> {
        self.assignments.get(&track)
    }

    /// The device a recording on `track` captures from.
    pub fn recording_input(&self, track: TrackId) -> DeviceId {
        self.input(track).cloned().unwrap_or_else(DeviceId::system_default)
    }

    pub fn error(&self, track: TrackId) -> Option<&CaptureError> {
        self.errors.get(&track)
    }

    /// Tracks whose input failed cannot be armed until it works again.
    pub fn can_arm(&self, track: TrackId) -> bool {
        !self.errors.contains_key(&track)
    }

    pub fn level(&self, track: TrackId) -> u8 {
        self.levels.get(&track).copied().unwrap_or(0)
    }

    pub fn set_level(&mut self, track: TrackId, level: u8) {
        self.levels.insert(track, level);
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    pub fn streams_mut(&mut self) -> &mut StreamRegistry {
        &mut self.streams
    }

    /// Route `device` to `track` and open a monitoring stream for it, or
    /// disconnect the track when `device` is `None`.
    ///
    /// On failure the assignment is kept but the error is remembered, which
    /// disables arming for the track.
    pub fn assign(
        &mut self,
        track: TrackId,
        device: Option<DeviceId>,
        service: &mut dyn CaptureService,
    ) -> Result<(), CaptureError> {
        self.cleanup(track);
        let Some(device) = device else {
            self.assignments.remove(&track);
            self.errors.remove(&track);
            return Ok(());
        };

        self.assignments.insert(track, device.clone());
        match service.acquire(&device) {
            Ok(stream) => {
                log::info!("monitoring '{device}' on {track}");
                self.streams.insert(track, stream);
                self.errors.remove(&track);
                Ok(())
            }
            Err(err) => {
                log::warn!("{track}: {err}");
                self.errors.insert(track, err.clone());
                Err(err)
            }
        }
    }

    /// Record a failure for `track` without touching its assignment.
    pub fn set_error(&mut self, track: TrackId, error: CaptureError) {
        self.errors.insert(track, error);
    }

    /// Drop the monitoring stream and meter of `track`.
    pub fn cleanup(&mut self, track: TrackId) {
        self.streams.release(track);
        self.levels.remove(&track);
    }

    /// Drain every monitoring stream that nothing else is reading and update
    /// the meters. Tracks in `skip` are being recorded and metered elsewhere.
    pub fn update_levels(&mut self, skip: &[TrackId]) {
        let mut buffer = Vec::new();
        let tracks: Vec<_> = self.streams.tracks().filter(|t| !skip.contains(t)).collect();
        for track in tracks {
            let Some(stream) = self.streams.get_mut(track) else {
                continue;
            };
            buffer.clear();
            stream.read(&mut buffer);
            let level = input_level(&buffer);
            self.levels.insert(track, level);
        }
    }

    /// Reconcile assignments with the devices now present. Tracks whose
    /// device vanished are switched to no input and their streams torn down.
    /// Returns the affected tracks with the device they lost.
    pub fn handle_device_change(&mut self, service: &dyn CaptureService) -> Vec<(TrackId, DeviceId)> {
        self.refresh(service);

        let vanished: Vec<(TrackId, DeviceId)> = self
            .assignments
            .iter()
            .filter(|(_, device)| !self.devices.iter().any(|d| &d.id == *device))
            .map(|(track, device)| (*track, device.clone()))
            .collect();

        for (track, device) in &vanished {
            log::warn!("input '{device}' of {track} disappeared");
            self.assignments.remove(track);
            self.errors.remove(track);
            self.cleanup(*track);
        }
        vanished
    }
}
