//! Multi-track recording.
//!
//! ```text
//! Idle ──arm──> Armed ──start──> Recording ──stop──> Finalizing ──> Armed / Idle
//! ```
//!
//! Every armed track contributes one slot: a capture stream, an encoder and a
//! provisional clip placed on the first free track at the playhead. Slots are
//! finalized independently, so one bad capture never costs the others.

use std::collections::BTreeSet;
use std::time::Duration;

use studio_codec::{ChunkEncoder, EncodedChunk};
use studio_transport::{Clip, ClipId, Track, TrackId};

use crate::backend::{AudioDecoder, CaptureService, PlaybackSink};
use crate::devices::{DeviceId, InputRouting, input_level};
use crate::error::{CaptureError, StudioError};
use crate::metrics::{MetricsSnapshot, RecordingMonitor};
use crate::placement::find_available_track;

/// Encoded size above which a recording is reported as large.
pub const DEFAULT_LARGE_RECORDING_BYTES: usize = 100 * 1024 * 1024;

/// Provisional clips grow by one pixel per this many milliseconds.
const MS_PER_PROVISIONAL_PX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Armed,
    Recording,
    Finalizing,
}

struct RecordingSlot {
    /// The armed track whose input feeds this slot.
    source: TrackId,
    /// The track the clip was placed on.
    track: TrackId,
    /// The input recorded from, fixed when the pass starts.
    device: DeviceId,
    clip: ClipId,
    encoder: ChunkEncoder,
    chunks: Vec<EncodedChunk>,
    bytes: usize,
    /// The stream was opened for this recording rather than borrowed from
    /// monitoring, so it is closed when the recording ends.
    owns_stream: bool,
    /// The input went away; the slot keeps what it captured so far.
    frozen: bool,
    warned_large: bool,
}

/// Outcome of one recording pass.
#[derive(Debug, Default)]
pub struct RecordingReport {
    pub populated: Vec<ClipId>,
    pub discarded: Vec<(ClipId, StudioError)>,
    /// Populated clips the playback backend refused. They stay on the
    /// timeline but stay silent.
    pub unplayable: Vec<(ClipId, StudioError)>,
    pub metrics: Vec<(TrackId, MetricsSnapshot)>,
}

pub struct RecordingPipeline {
    state: RecordingState,
    armed: BTreeSet<TrackId>,
    slots: Vec<RecordingSlot>,
    started_at: Duration,
    /// Number used in the name of the next pass's clips.
    pass: u64,
    monitor: RecordingMonitor,
    large_recording_bytes: usize,
    buffer: Vec<f32>,
}

impl Default for RecordingPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_LARGE_RECORDING_BYTES)
    }
}

impl RecordingPipeline {
    pub fn new(large_recording_bytes: usize) -> Self {
        Self {
            state: RecordingState::Idle,
            armed: BTreeSet::new(),
            slots: Vec::new(),
            started_at: Duration::ZERO,
            pass: 1,
            monitor: RecordingMonitor::new(),
            large_recording_bytes,
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub fn armed(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.armed.iter().copied()
    }

    pub fn is_armed(&self, track: TrackId) -> bool {
        self.armed.contains(&track)
    }

    /// Armed tracks whose input is currently being recorded.
    pub fn recording_sources(&self) -> Vec<TrackId> {
        self.slots.iter().map(|slot| slot.source).collect()
    }

    /// Clips being recorded, with the track each one was placed on.
    pub fn recording_clips(&self) -> Vec<(ClipId, TrackId)> {
        self.slots.iter().map(|slot| (slot.clip, slot.track)).collect()
    }

    pub fn metrics(&self, track: TrackId, now: Duration) -> Option<MetricsSnapshot> {
        self.monitor.snapshot(track, now)
    }

    /// Arm `track`. Arming takes effect from the next recording pass.
    pub fn arm(&mut self, track: TrackId, routing: &InputRouting) -> Result<(), StudioError> {
        if !routing.can_arm(track) {
            return Err(StudioError::DeviceUnavailable(track));
        }
        self.armed.insert(track);
        self.refresh_state();
        Ok(())
    }

    pub fn disarm(&mut self, track: TrackId) {
        self.armed.remove(&track);
        self.refresh_state();
    }

    fn refresh_state(&mut self) {
        if matches!(self.state, RecordingState::Idle | RecordingState::Armed) {
            self.state = if self.armed.is_empty() {
                RecordingState::Idle
            } else {
                RecordingState::Armed
            };
        }
    }

    /// Open a capture stream for every armed track and place a provisional
    /// clip for each at the playhead. Returns the new clips.
    ///
    /// If any stream cannot be opened, the streams opened by this call are
    /// closed again and nothing else changes.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        now: Duration,
        playhead_px: f64,
        pixels_per_second: f64,
        tracks: &mut [Track],
        routing: &mut InputRouting,
        service: &mut dyn CaptureService,
        next_clip_id: &mut u64,
    ) -> Result<Vec<ClipId>, StudioError> {
        match self.state {
            RecordingState::Recording | RecordingState::Finalizing => {
                return Err(StudioError::RecordingInProgress);
            }
            RecordingState::Idle | RecordingState::Armed => {}
        }
        if self.armed.is_empty() {
            return Err(StudioError::NoArmedTracks);
        }

        let mut opened = Vec::new();
        for &source in &self.armed {
            let reusable = routing
                .streams_mut()
                .get_mut(source)
                .is_some_and(|stream| stream.is_live());
            if reusable {
                continue;
            }

            let device = routing.recording_input(source);
            match service.acquire(&device) {
                Ok(stream) => {
                    routing.streams_mut().insert(source, stream);
                    opened.push(source);
                }
                Err(err) => {
                    log::warn!("cannot record {source} from '{device}': {err}");
                    for track in opened {
                        routing.streams_mut().release(track);
                    }
                    return Err(err.into());
                }
            }
        }

        let at_secs = playhead_px / pixels_per_second;
        let name = format!("Recording {}", self.pass);
        let sources: Vec<TrackId> = self.armed.iter().copied().collect();
        for source in sources {
            let owns_stream = opened.contains(&source);
            let Some(destination) = find_available_track(tracks, at_secs, pixels_per_second) else {
                log::warn!("no free track at {at_secs:.2}s for the input of {source}");
                if owns_stream {
                    routing.streams_mut().release(source);
                }
                continue;
            };
            let Some(stream) = routing.streams_mut().get_mut(source) else {
                continue;
            };
            let encoder = ChunkEncoder::new(stream.sample_rate(), stream.channels());

            let clip = ClipId(*next_clip_id);
            *next_clip_id += 1;
            if let Some(track) = tracks.iter_mut().find(|t| t.id == destination) {
                track.add_clip(Clip::recording(clip, name.clone(), destination, playhead_px));
            }
            self.monitor.start(source, now);
            let device = DeviceId::new(stream.device_id());
            self.slots.push(RecordingSlot {
                source,
                track: destination,
                device,
                clip,
                encoder,
                chunks: Vec::new(),
                bytes: 0,
                owns_stream,
                frozen: false,
                warned_large: false,
            });
        }

        if self.slots.is_empty() {
            return Err(StudioError::NoAvailableTrack { at_secs });
        }

        self.state = RecordingState::Recording;
        self.started_at = now;
        let clips: Vec<ClipId> = self.slots.iter().map(|slot| slot.clip).collect();
        log::info!("recording {} clip(s) at {at_secs:.2}s", clips.len());
        Ok(clips)
    }

    /// Move captured audio into the encoders and grow the provisional clips.
    /// Returns errors for inputs lost since the last call.
    pub fn tick(&mut self, now: Duration, tracks: &mut [Track], routing: &mut InputRouting) -> Vec<CaptureError> {
        if !self.is_recording() {
            return Vec::new();
        }

        let elapsed_ms = now.saturating_sub(self.started_at).as_secs_f64() * 1000.0;
        let width_px = elapsed_ms / MS_PER_PROVISIONAL_PX;
        for slot in &self.slots {
            if let Some(clip) = find_clip(tracks, slot.track, slot.clip) {
                clip.set_provisional_width_px(width_px);
            }
        }

        let mut lost = Vec::new();
        for slot in &mut self.slots {
            if slot.frozen {
                continue;
            }
            let Some(stream) = routing.streams_mut().get_mut(slot.source) else {
                slot.frozen = true;
                log::warn!("input '{}' of {} went away mid-recording", slot.device, slot.source);
                lost.push(CaptureError::DeviceDisconnected(slot.device.clone()));
                continue;
            };

            self.buffer.clear();
            stream.read(&mut self.buffer);
            let live = stream.is_live();

            routing.set_level(slot.source, input_level(&self.buffer));
            if let Some(chunk) = slot.encoder.encode(&self.buffer) {
                slot.bytes += chunk.len();
                self.monitor.record_chunk(slot.source, chunk.len(), now);
                slot.chunks.push(chunk);
            }
            if slot.bytes > self.large_recording_bytes && !slot.warned_large {
                slot.warned_large = true;
                log::warn!("recording on {} is getting large ({} bytes)", slot.source, slot.bytes);
            }

            if !live {
                // keep what was captured, the pass goes on without this input
                slot.frozen = true;
                log::warn!("input '{}' of {} stopped mid-recording", slot.device, slot.source);
                lost.push(CaptureError::DeviceDisconnected(slot.device.clone()));
            }
        }
        lost
    }

    /// End the pass: encode, decode and attach each slot's audio, or remove
    /// its clip when that fails. Returns `None` when not recording.
    pub fn stop(
        &mut self,
        now: Duration,
        tracks: &mut [Track],
        routing: &mut InputRouting,
        decoder: &dyn AudioDecoder,
        sink: &mut dyn PlaybackSink,
    ) -> Option<RecordingReport> {
        if !self.is_recording() {
            return None;
        }
        self.tick(now, tracks, routing);
        self.state = RecordingState::Finalizing;

        let mut report = RecordingReport::default();
        for slot in std::mem::take(&mut self.slots) {
            if slot.owns_stream {
                routing.streams_mut().release(slot.source);
            }
            if let Some(metrics) = self.monitor.finish(slot.source, now) {
                report.metrics.push((slot.source, metrics));
            }

            match finalize_slot(&slot, decoder) {
                Ok(audio) => {
                    let Some(clip) = find_clip(tracks, slot.track, slot.clip) else {
                        continue;
                    };
                    clip.populate(audio.clone());
                    if let Err(err) = sink.load(slot.clip, slot.track, &audio) {
                        log::error!("{} cannot be played: {err}", slot.clip);
                        report.unplayable.push((slot.clip, StudioError::Playback(err)));
                    }
                    log::info!("{} ready: {:.2}s on {}", slot.clip, audio.duration_secs(), slot.track);
                    report.populated.push(slot.clip);
                }
                Err(err) => {
                    log::warn!("discarding {}: {err}", slot.clip);
                    if let Some(track) = tracks.iter_mut().find(|t| t.id == slot.track) {
                        track.remove_clip(slot.clip);
                    }
                    report.discarded.push((slot.clip, err));
                }
            }
        }

        self.pass += 1;
        self.state = RecordingState::Idle;
        self.refresh_state();
        Some(report)
    }
}

fn finalize_slot(
    slot: &RecordingSlot,
    decoder: &dyn AudioDecoder,
) -> Result<studio_transport::AudioArc, StudioError> {
    let decode_error = |source| StudioError::Decode {
        clip: slot.clip,
        source,
    };
    let blob = slot
        .encoder
        .finalize(&slot.chunks)
        .map_err(|err| decode_error(err.into()))?;
    decoder.decode(&blob).map_err(decode_error)
}

fn find_clip(tracks: &mut [Track], track: TrackId, clip: ClipId) -> Option<&mut Clip> {
    tracks.iter_mut().find(|t| t.id == track)?.clip_mut(clip)
}
