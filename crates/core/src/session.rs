use std::sync::Arc;

use studio_transport::{Clip, ClipId, Surface, Track, TrackId, TrimWindow, WaveformView};

use crate::backend::{AudioDecoder, CaptureService, Clock, PlaybackSink};
use crate::devices::{DeviceId, InputDevice, InputRouting};
use crate::drag::{DragEngine, DropOutcome};
use crate::error::{CaptureError, Result, StudioError};
use crate::grid::{GridLine, GridSettings, grid_lines};
use crate::metrics::MetricsSnapshot;
use crate::recording::{DEFAULT_LARGE_RECORDING_BYTES, RecordingPipeline, RecordingReport, RecordingState};
use crate::scheduler::{CancelToken, PlaybackScheduler, TransportState};
use crate::time::{DEFAULT_BPM, DEFAULT_PIXELS_PER_SECOND, DisplayMode, TimeContext, TimeSignature};
use crate::trim::{TrimEngine, TrimSide};

pub const DEFAULT_TRACK_COUNT: usize = 4;
pub const DEFAULT_WAVEFORM_HEIGHT_PX: u32 = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub bpm: f64,
    pub pixels_per_second: f64,
    pub grid: GridSettings,
    pub track_count: usize,
    pub waveform_height_px: u32,
    pub large_recording_bytes: usize,
    pub display_mode: DisplayMode,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            pixels_per_second: DEFAULT_PIXELS_PER_SECOND,
            grid: GridSettings::default(),
            track_count: DEFAULT_TRACK_COUNT,
            waveform_height_px: DEFAULT_WAVEFORM_HEIGHT_PX,
            large_recording_bytes: DEFAULT_LARGE_RECORDING_BYTES,
            display_mode: DisplayMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PlayheadDrag {
    /// Pointer position minus playhead position at press time.
    anchor_px: f64,
}

/// One editing session: tracks, transport, grid and the recording pipeline,
/// wired to a set of backends.
pub struct Session {
    tracks: Vec<Track>,
    time_context: TimeContext,
    grid: GridSettings,
    display_mode: DisplayMode,
    waveform_height_px: u32,
    next_clip_id: u64,

    scheduler: PlaybackScheduler,
    recording: RecordingPipeline,
    routing: InputRouting,
    trim: TrimEngine,
    drag: DragEngine,
    playhead_drag: Option<PlayheadDrag>,

    capture: Box<dyn CaptureService>,
    decoder: Box<dyn AudioDecoder>,
    sink: Box<dyn PlaybackSink>,
    clock: Box<dyn Clock>,
}

impl Session {
    pub fn new(
        settings: SessionSettings,
        capture: Box<dyn CaptureService>,
        decoder: Box<dyn AudioDecoder>,
        sink: Box<dyn PlaybackSink>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let tracks = (0..settings.track_count)
            .map(|i| Track::new(TrackId(i as u64), format!("Track {}", i + 1)))
            .collect();

        let mut routing = InputRouting::new();
        routing.refresh(capture.as_ref());

        Self {
            tracks,
            time_context: TimeContext::new(settings.bpm, TimeSignature::default(), settings.pixels_per_second),
            grid: settings.grid,
            display_mode: settings.display_mode,
            waveform_height_px: settings.waveform_height_px,
            next_clip_id: 1,
            scheduler: PlaybackScheduler::new(),
            recording: RecordingPipeline::new(settings.large_recording_bytes),
            routing,
            trim: TrimEngine::new(),
            drag: DragEngine::new(),
            playhead_drag: None,
            capture,
            decoder,
            sink,
            clock,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        find_clip(&self.tracks, id)
    }

    pub fn time_context(&self) -> &TimeContext {
        &self.time_context
    }

    pub fn grid(&self) -> &GridSettings {
        &self.grid
    }

    pub fn pixels_per_second(&self) -> f64 {
        self.time_context.pixels_per_second()
    }

    // Transport

    pub fn transport_state(&self) -> TransportState {
        self.scheduler.state()
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    pub fn playhead_px(&self) -> f64 {
        self.scheduler.playhead_px()
    }

    /// Start playback. The returned token is cancelled when playback halts;
    /// `None` means playback was already running.
    pub fn play(&mut self) -> Option<CancelToken> {
        let now = self.clock.now();
        let pps = self.pixels_per_second();
        self.scheduler.play(now, &self.tracks, pps, self.sink.as_mut())
    }

    pub fn pause(&mut self) {
        let now = self.clock.now();
        let pps = self.pixels_per_second();
        self.scheduler.pause(now, pps, self.sink.as_mut());
    }

    pub fn stop(&mut self) {
        self.playhead_drag = None;
        self.scheduler.stop(self.sink.as_mut());
    }

    /// Periodic work: advance the playhead, fire due clip actions, pull
    /// captured audio and refresh input meters. Returns the playhead.
    pub fn tick(&mut self) -> f64 {
        let now = self.clock.now();
        let pps = self.pixels_per_second();
        let playhead = self.scheduler.tick(now, pps, self.sink.as_mut());

        for err in self.recording.tick(now, &mut self.tracks, &mut self.routing) {
            log::warn!("{err}");
        }
        self.routing.update_levels(&self.recording.recording_sources());
        self.sink.poll();
        playhead
    }

    /// Move the playhead to a clicked timeline position. Returns where it landed.
    pub fn click_timeline(&mut self, x_px: f64) -> f64 {
        let target = self.grid.quantize(&self.time_context, x_px).max(0.0);
        self.seek(target);
        target
    }

    pub fn begin_playhead_drag(&mut self, pointer_x: f64) {
        self.playhead_drag = Some(PlayheadDrag {
            anchor_px: pointer_x - self.playhead_px(),
        });
    }

    /// Returns the new playhead, or `None` when no playhead drag is active.
    pub fn drag_playhead(&mut self, pointer_x: f64) -> Option<f64> {
        let drag = self.playhead_drag?;
        let raw = (pointer_x - drag.anchor_px).max(0.0);
        let target = self.grid.quantize(&self.time_context, raw).max(0.0);
        self.seek(target);
        Some(target)
    }

    pub fn end_playhead_drag(&mut self) {
        self.playhead_drag = None;
    }

    fn seek(&mut self, playhead_px: f64) {
        let now = self.clock.now();
        let pps = self.pixels_per_second();
        self.scheduler
            .seek(now, playhead_px, &self.tracks, pps, self.sink.as_mut());
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.display_mode = mode;
    }

    /// The transport readout for the current playhead.
    pub fn display_text(&self) -> String {
        self.time_context.display(self.playhead_px(), self.display_mode)
    }

    // Grid

    /// Returns the tempo actually applied. Clips keep their pixel positions.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        let applied = self.time_context.set_bpm(bpm);
        log::info!("tempo set to {applied} BPM");
        applied
    }

    pub fn set_bpm_from_input(&mut self, input: &str) -> f64 {
        let applied = self.time_context.set_bpm_from_input(input);
        log::info!("tempo set to {applied} BPM");
        applied
    }

    pub fn set_snap_enabled(&mut self, enabled: bool) {
        self.grid.snap_enabled = enabled;
    }

    pub fn set_snap_resolution(&mut self, beats: f64) {
        if beats.is_finite() && beats > 0.0 {
            self.grid.snap_resolution = beats;
        }
    }

    pub fn set_snap_tolerance_px(&mut self, tolerance_px: f64) {
        self.grid.snap_tolerance_px = tolerance_px.max(0.0);
    }

    pub fn grid_lines(&self, width_px: f64) -> Vec<GridLine> {
        grid_lines(&self.time_context, width_px)
    }

    // Inputs

    pub fn input_devices(&self) -> &[InputDevice] {
        self.routing.devices()
    }

    pub fn refresh_devices(&mut self) -> &[InputDevice] {
        self.routing.refresh(self.capture.as_ref())
    }

    pub fn track_input(&self, track: TrackId) -> Option<&DeviceId> {
        self.routing.input(track)
    }

    pub fn track_input_error(&self, track: TrackId) -> Option<&CaptureError> {
        self.routing.error(track)
    }

    /// Route an input device to `track`, or none. A device that cannot be
    /// opened leaves the track disarmed until a working input is chosen.
    pub fn set_track_input(&mut self, track: TrackId, device: Option<DeviceId>) -> Result<()> {
        self.require_track(track)?;
        match self.routing.assign(track, device, self.capture.as_mut()) {
            Ok(()) => Ok(()),
            Err(err) => {
                if !self.recording.is_recording() {
                    self.recording.disarm(track);
                }
                Err(err.into())
            }
        }
    }

    /// Reconcile with the current device list. Tracks that lost their device
    /// fall back to no input; a recording on them keeps what it has so far.
    pub fn handle_device_change(&mut self) -> Vec<CaptureError> {
        let now = self.clock.now();
        // pull what the vanishing streams still hold before they are dropped
        let mut lost = self.recording.tick(now, &mut self.tracks, &mut self.routing);

        for (track, device) in self.routing.handle_device_change(self.capture.as_ref()) {
            log::warn!("{track} lost input '{device}'");
            let err = CaptureError::DeviceDisconnected(device);
            if !lost.contains(&err) {
                lost.push(err);
            }
        }
        for err in self.recording.tick(now, &mut self.tracks, &mut self.routing) {
            if !lost.contains(&err) {
                lost.push(err);
            }
        }
        lost
    }

    pub fn input_level(&self, track: TrackId) -> u8 {
        self.routing.level(track)
    }

    // Mixer

    /// Set a track's gain from a 0..=100 fader value.
    pub fn set_track_volume(&mut self, track: TrackId, percent: f64) -> Result<()> {
        let gain = (percent.clamp(0.0, 100.0) / 100.0) as f32;
        let entry = self
            .tracks
            .iter_mut()
            .find(|t| t.id == track)
            .ok_or(StudioError::UnknownTrack(track))?;
        entry.volume = gain;
        self.sink.set_track_gain(track, gain);
        Ok(())
    }

    // Recording

    pub fn recording_state(&self) -> RecordingState {
        self.recording.state()
    }

    pub fn arm(&mut self, track: TrackId) -> Result<()> {
        self.require_track(track)?;
        self.recording.arm(track, &self.routing)
    }

    pub fn disarm(&mut self, track: TrackId) -> Result<()> {
        self.require_track(track)?;
        self.recording.disarm(track);
        Ok(())
    }

    pub fn is_armed(&self, track: TrackId) -> bool {
        self.recording.is_armed(track)
    }

    pub fn start_recording(&mut self) -> Result<Vec<ClipId>> {
        let now = self.clock.now();
        let pps = self.pixels_per_second();
        let playhead = self.playhead_px();
        self.recording.start(
            now,
            playhead,
            pps,
            &mut self.tracks,
            &mut self.routing,
            self.capture.as_mut(),
            &mut self.next_clip_id,
        )
    }

    /// Finish the current recording. `None` when nothing was recording.
    pub fn stop_recording(&mut self) -> Option<RecordingReport> {
        let now = self.clock.now();
        let report = self.recording.stop(
            now,
            &mut self.tracks,
            &mut self.routing,
            self.decoder.as_ref(),
            self.sink.as_mut(),
        )?;

        let pps = self.pixels_per_second();
        let height = self.waveform_height_px;
        for clip in &report.populated {
            if let Some(clip) = self.clip_mut(*clip) {
                clip.waveform(pps, height);
            }
        }
        Some(report)
    }

    pub fn recording_metrics(&self, track: TrackId) -> Option<MetricsSnapshot> {
        self.recording.metrics(track, self.clock.now())
    }

    // Trimming

    pub fn begin_trim(&mut self, clip: ClipId, side: TrimSide, pointer_x: f64) -> Result<bool> {
        let pps = self.pixels_per_second();
        let target = find_clip(&self.tracks, clip).ok_or(StudioError::UnknownClip(clip))?;
        if !target.is_populated() {
            return Err(StudioError::ClipNotPopulated(clip));
        }
        Ok(self.trim.begin(target, side, pointer_x, pps))
    }

    /// Apply a pointer move to the active trim and re-render the clip's
    /// visible window.
    pub fn update_trim(&mut self, pointer_x: f64) -> Option<TrimWindow> {
        let id = self.trim.active_clip()?;
        let pps = self.pixels_per_second();
        let height = self.waveform_height_px;
        let ctx = self.time_context;
        let grid = self.grid;

        let clip = self.tracks.iter_mut().find_map(|t| t.clip_mut(id))?;
        let window = self.trim.update(clip, pointer_x, &ctx, &grid)?;
        clip.waveform(pps, height);
        Some(window)
    }

    pub fn end_trim(&mut self) -> Option<ClipId> {
        self.trim.end()
    }

    // Dragging

    pub fn begin_drag(&mut self, clip: ClipId, pointer_x: f64) -> Result<()> {
        let pps = self.pixels_per_second();
        let target = find_clip(&self.tracks, clip).ok_or(StudioError::UnknownClip(clip))?;
        if !self.drag.begin(target, pointer_x, pps) {
            return Err(StudioError::ClipNotPopulated(clip));
        }
        Ok(())
    }

    pub fn drag_over(&mut self, pointer_x: f64, track_left_px: f64) -> Option<f64> {
        self.drag
            .drag_over(&mut self.tracks, pointer_x, track_left_px, &self.time_context, &self.grid)
    }

    /// Release the dragged clip over `target`. Returns `None` when no drag
    /// is in progress.
    pub fn drop_clip(&mut self, pointer_x: f64, track_left_px: f64, target: TrackId) -> Option<DropOutcome> {
        let outcome = self.drag.drop(
            &mut self.tracks,
            pointer_x,
            track_left_px,
            target,
            &self.time_context,
            &self.grid,
        )?;
        if outcome.moved_track() {
            self.sink.assign_track(outcome.clip, outcome.to);
        }
        Some(outcome)
    }

    pub fn cancel_drag(&mut self) -> Option<ClipId> {
        self.drag.cancel()
    }

    // Rendering

    pub fn clip_waveform(&mut self, clip: ClipId) -> Option<Arc<WaveformView>> {
        let pps = self.pixels_per_second();
        let height = self.waveform_height_px;
        self.clip_mut(clip)?.waveform(pps, height)
    }

    pub fn draw_clip(&mut self, clip: ClipId, surface: &mut impl Surface) -> Result<()> {
        if self.clip(clip).is_none() {
            return Err(StudioError::UnknownClip(clip));
        }
        let view = self.clip_waveform(clip).ok_or(StudioError::ClipNotPopulated(clip))?;
        view.draw(surface);
        Ok(())
    }

    fn clip_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.tracks.iter_mut().find_map(|t| t.clip_mut(id))
    }

    fn require_track(&self, track: TrackId) -> Result<()> {
        match self.track(track) {
            Some(_) => Ok(()),
            None => Err(StudioError::UnknownTrack(track)),
        }
    }
}

fn find_clip(tracks: &[Track], id: ClipId) -> Option<&Clip> {
    tracks.iter().find_map(|t| t.clip(id))
}

impl Drop for Session {
    fn drop(&mut self) {
        self.scheduler.stop(self.sink.as_mut());
        self.routing.streams_mut().release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SymphoniaDecoder;
    use crate::testing::{FakeCapture, FakeClock, FakeSink, SinkEvent, tone};
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    const PPS: f64 = DEFAULT_PIXELS_PER_SECOND;

    struct Harness {
        session: Session,
        capture: FakeCapture,
        clock: FakeClock,
        sink: FakeSink,
    }

    impl Harness {
        fn new() -> Self {
            let capture = FakeCapture::with_devices(&["default", "usb"]);
            let clock = FakeClock::default();
            let sink = FakeSink::default();
            let session = Session::new(
                SessionSettings::default(),
                Box::new(capture.clone()),
                Box::new(SymphoniaDecoder),
                Box::new(sink.clone()),
                Box::new(clock.clone()),
            );
            Self {
                session,
                capture,
                clock,
                sink,
            }
        }

        /// Record `secs` of tone on `track` from the current playhead.
        fn record(&mut self, track: TrackId, secs: f64) -> ClipId {
            self.session.arm(track).unwrap();
            let clip = self.session.start_recording().unwrap()[0];
            self.capture.last_stream_state().unwrap().push(&tone(secs));
            self.clock.advance(Duration::from_secs_f64(secs));
            self.session.tick();
            let report = self.session.stop_recording().unwrap();
            assert_eq!(report.populated, vec![clip]);
            self.session.disarm(track).unwrap();
            clip
        }
    }

    struct Recorder(Vec<(f32, f32, f32, f32)>);

    impl Surface for Recorder {
        fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
            self.0.push((x, y, width, height));
        }
    }

    #[test]
    fn test_new_session() {
        let h = Harness::new();
        assert_eq!(h.session.tracks().len(), DEFAULT_TRACK_COUNT);
        assert_eq!(h.session.tracks()[2].name, "Track 3");
        assert_eq!(h.session.input_devices()[0].label, "System Default");
        assert_eq!(h.session.input_devices()[1].label, "usb mic");
        assert_eq!(h.session.display_text(), "1:1:0");
        assert_eq!(h.session.recording_state(), RecordingState::Idle);
    }

    #[test]
    fn test_click_snaps_to_bar() {
        let mut h = Harness::new();
        assert_eq!(h.session.click_timeline(205.0), 200.0);
        assert_eq!(h.session.playhead_px(), 200.0);
        assert_eq!(h.session.display_text(), "2:1:0");

        h.session.set_display_mode(DisplayMode::Time);
        assert_eq!(h.session.display_text(), "00:02:00");
    }

    #[test]
    fn test_click_off_grid_is_kept() {
        let mut h = Harness::new();
        assert_eq!(h.session.click_timeline(125.0), 125.0);
        h.session.set_snap_enabled(false);
        assert_eq!(h.session.click_timeline(205.0), 205.0);
    }

    #[test]
    fn test_playhead_drag() {
        let mut h = Harness::new();
        h.session.click_timeline(100.0);
        h.session.begin_playhead_drag(130.0);
        assert_eq!(h.session.drag_playhead(233.0), Some(200.0));
        assert_eq!(h.session.drag_playhead(-500.0), Some(0.0));
        h.session.end_playhead_drag();
        assert_eq!(h.session.drag_playhead(400.0), None);
    }

    #[test]
    fn test_play_tick_stop() {
        let mut h = Harness::new();
        let token = h.session.play().unwrap();
        assert!(h.session.play().is_none());
        h.clock.advance_ms(1500);
        assert_abs_diff_eq!(h.session.tick(), 150.0, epsilon = 1e-6);

        h.session.stop();
        assert!(token.is_cancelled());
        assert_eq!(h.session.playhead_px(), 0.0);
        assert_eq!(h.session.transport_state(), TransportState::Stopped);
    }

    #[test]
    fn test_pause_keeps_playhead() {
        let mut h = Harness::new();
        h.session.play();
        h.clock.advance_ms(800);
        h.session.pause();
        h.clock.advance_ms(800);
        assert_abs_diff_eq!(h.session.tick(), 80.0, epsilon = 1e-6);
        assert_eq!(h.session.transport_state(), TransportState::Paused);
    }

    #[test]
    fn test_click_while_playing_moves_anchor() {
        let mut h = Harness::new();
        h.session.play();
        h.clock.advance_ms(1000);
        h.session.tick();

        h.session.click_timeline(400.0);
        h.clock.advance_ms(500);
        assert_abs_diff_eq!(h.session.tick(), 450.0, epsilon = 1e-6);
    }

    #[test]
    fn test_recording_populates_clip() {
        let mut h = Harness::new();
        h.session.click_timeline(150.0);
        h.session.arm(TrackId(0)).unwrap();
        let clip = h.session.start_recording().unwrap()[0];
        assert_eq!(h.session.recording_state(), RecordingState::Recording);

        let stream = h.capture.last_stream_state().unwrap();
        assert_eq!(stream.device(), "default");
        stream.push(&tone(1.0));
        h.clock.advance_ms(1000);
        h.session.tick();

        let placeholder = h.session.clip(clip).unwrap();
        assert!(!placeholder.is_populated());
        assert_abs_diff_eq!(placeholder.width_px(PPS), 100.0, epsilon = 1e-6);
        assert!(h.session.recording_metrics(TrackId(0)).unwrap().total_bytes > 0);
        assert!(h.session.input_level(TrackId(0)) > 0);

        let report = h.session.stop_recording().unwrap();
        assert_eq!(report.populated, vec![clip]);
        assert!(h.session.stop_recording().is_none());

        let clip_ref = h.session.clip(clip).unwrap();
        assert!(clip_ref.is_populated());
        assert!(clip_ref.has_cached_waveform());
        assert_eq!(clip_ref.position_px(), 150.0);
        assert_abs_diff_eq!(clip_ref.total_duration_secs(), 1.0, epsilon = 1e-6);
        assert_eq!(h.sink.track_of(clip), Some(TrackId(0)));
        assert_eq!(h.session.recording_state(), RecordingState::Armed);
    }

    #[test]
    fn test_trimmed_clip_plays_its_window() {
        let mut h = Harness::new();
        let clip = h.record(TrackId(0), 3.0);

        assert!(h.session.begin_trim(clip, TrimSide::Left, 0.0).unwrap());
        let window = h.session.update_trim(50.0).unwrap();
        assert_eq!(h.session.end_trim(), Some(clip));
        assert_abs_diff_eq!(window.start_offset_secs, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(window.end_secs, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(h.session.clip(clip).unwrap().position_px(), 50.0, epsilon = 1e-9);
        assert_eq!(h.session.clip_waveform(clip).unwrap().width_px, 250);

        h.sink.take_events();
        h.session.click_timeline(150.0);
        h.session.play();
        assert_eq!(
            h.sink.take_events(),
            vec![SinkEvent::Play {
                clip,
                position_secs: 1.5
            }]
        );

        h.clock.advance_ms(1600);
        h.session.tick();
        assert_eq!(h.sink.take_events(), vec![SinkEvent::Pause(clip)]);
    }

    #[test]
    fn test_drag_to_other_track_is_clamped() {
        let mut h = Harness::new();
        h.session.click_timeline(100.0);
        let clip = h.record(TrackId(0), 5.0);
        h.sink.take_events();

        h.session.begin_drag(clip, 120.0).unwrap();
        assert_eq!(h.session.drag_over(420.0, 0.0), Some(400.0));
        assert_eq!(h.session.track(TrackId(0)).unwrap().clips().len(), 1);

        let outcome = h.session.drop_clip(720.0, 0.0, TrackId(1)).unwrap();
        assert_eq!(outcome.position_px, 600.0);
        assert!(outcome.moved_track());
        assert!(h.session.track(TrackId(0)).unwrap().clips().is_empty());
        assert_eq!(h.session.clip(clip).unwrap().track(), TrackId(1));
        assert_eq!(
            h.sink.events(),
            vec![SinkEvent::Assign {
                clip,
                track: TrackId(1)
            }]
        );
        assert!(h.session.drop_clip(720.0, 0.0, TrackId(1)).is_none());
    }

    #[test]
    fn test_draw_clip() {
        let mut h = Harness::new();
        let clip = h.record(TrackId(0), 0.5);
        let mut surface = Recorder(Vec::new());
        h.session.draw_clip(clip, &mut surface).unwrap();
        assert!(!surface.0.is_empty());
        assert!(surface.0.iter().all(|&(x, _, w, _)| x < 50.0 && w == 1.0));
    }

    #[test]
    fn test_bpm_change_keeps_clip_positions() {
        let mut h = Harness::new();
        h.session.click_timeline(200.0);
        let clip = h.record(TrackId(0), 0.5);

        assert_eq!(h.session.set_bpm(90.0), 90.0);
        assert_eq!(h.session.set_bpm_from_input("abc"), 120.0);
        assert_eq!(h.session.clip(clip).unwrap().position_px(), 200.0);
        assert_eq!(h.session.grid_lines(200.0).len(), 4);
    }

    #[test]
    fn test_volume_percent_to_gain() {
        let mut h = Harness::new();
        h.session.set_track_volume(TrackId(1), 40.0).unwrap();
        assert_abs_diff_eq!(h.session.track(TrackId(1)).unwrap().volume, 0.4);
        assert_eq!(
            h.sink.events(),
            vec![SinkEvent::Gain {
                track: TrackId(1),
                gain: 0.4
            }]
        );
        h.session.set_track_volume(TrackId(1), 250.0).unwrap();
        assert_eq!(h.session.track(TrackId(1)).unwrap().volume, 1.0);
        assert!(matches!(
            h.session.set_track_volume(TrackId(9), 50.0),
            Err(StudioError::UnknownTrack(TrackId(9)))
        ));
    }

    #[test]
    fn test_unknown_track_and_clip() {
        let mut h = Harness::new();
        assert!(matches!(h.session.arm(TrackId(17)), Err(StudioError::UnknownTrack(_))));
        assert!(matches!(
            h.session.begin_trim(ClipId(3), TrimSide::Left, 0.0),
            Err(StudioError::UnknownClip(_))
        ));
        assert!(matches!(h.session.begin_drag(ClipId(3), 0.0), Err(StudioError::UnknownClip(_))));
        assert!(matches!(h.session.start_recording(), Err(StudioError::NoArmedTracks)));
    }

    #[test]
    fn test_recording_clip_rejects_edits() {
        let mut h = Harness::new();
        h.session.arm(TrackId(0)).unwrap();
        let clip = h.session.start_recording().unwrap()[0];
        assert!(matches!(
            h.session.begin_trim(clip, TrimSide::Right, 0.0),
            Err(StudioError::ClipNotPopulated(_))
        ));
        assert!(matches!(h.session.begin_drag(clip, 0.0), Err(StudioError::ClipNotPopulated(_))));
        assert!(matches!(
            h.session.draw_clip(clip, &mut Recorder(Vec::new())),
            Err(StudioError::ClipNotPopulated(_))
        ));
        assert!(matches!(h.session.start_recording(), Err(StudioError::RecordingInProgress)));
    }

    #[test]
    fn test_failed_input_disarms_track() {
        let mut h = Harness::new();
        h.capture.deny(DeviceId::new("usb"));

        h.session.arm(TrackId(0)).unwrap();
        let err = h
            .session
            .set_track_input(TrackId(0), Some(DeviceId::new("usb")))
            .unwrap_err();
        assert!(matches!(err, StudioError::Capture(CaptureError::PermissionDenied(_))));
        assert!(!h.session.is_armed(TrackId(0)));
        assert!(matches!(h.session.arm(TrackId(0)), Err(StudioError::DeviceUnavailable(_))));
        assert!(h.session.track_input_error(TrackId(0)).is_some());

        h.session.set_track_input(TrackId(0), None).unwrap();
        h.session.arm(TrackId(0)).unwrap();
    }

    #[test]
    fn test_monitoring_levels() {
        let mut h = Harness::new();
        h.session
            .set_track_input(TrackId(2), Some(DeviceId::new("usb")))
            .unwrap();
        h.capture.last_stream_state().unwrap().push(&[0.5, -0.5, 0.5, -0.5]);
        h.session.tick();
        assert_eq!(h.session.input_level(TrackId(2)), 75);
        h.session.tick();
        assert_eq!(h.session.input_level(TrackId(2)), 0);
    }

    #[test]
    fn test_unplugged_input_mid_recording() {
        let mut h = Harness::new();
        let usb = DeviceId::new("usb");
        h.session.set_track_input(TrackId(1), Some(usb.clone())).unwrap();
        h.session.arm(TrackId(1)).unwrap();
        let clip = h.session.start_recording().unwrap()[0];

        h.capture.last_stream_state().unwrap().push(&tone(0.5));
        h.clock.advance_ms(500);
        h.capture.unplug(&usb);
        assert_eq!(
            h.session.handle_device_change(),
            vec![CaptureError::DeviceDisconnected(usb)]
        );
        assert_eq!(h.session.track_input(TrackId(1)), None);
        assert_eq!(h.session.input_devices().len(), 1);

        h.clock.advance_ms(500);
        let report = h.session.stop_recording().unwrap();
        assert_eq!(report.populated, vec![clip]);
        assert_abs_diff_eq!(
            h.session.clip(clip).unwrap().total_duration_secs(),
            0.5,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_input_leaves_list_with_stream_still_live() {
        let mut h = Harness::new();
        let usb = DeviceId::new("usb");
        h.session.set_track_input(TrackId(0), Some(usb.clone())).unwrap();
        h.session.arm(TrackId(0)).unwrap();
        let clip = h.session.start_recording().unwrap()[0];

        h.capture.last_stream_state().unwrap().push(&tone(0.5));
        h.clock.advance_ms(500);
        h.capture.vanish(&usb);
        assert_eq!(
            h.session.handle_device_change(),
            vec![CaptureError::DeviceDisconnected(usb)]
        );
        assert_eq!(h.session.track_input(TrackId(0)), None);

        h.clock.advance_ms(500);
        let report = h.session.stop_recording().unwrap();
        assert_eq!(report.populated, vec![clip]);
        assert_abs_diff_eq!(
            h.session.clip(clip).unwrap().total_duration_secs(),
            0.5,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_new_device_appears_after_refresh() {
        let mut h = Harness::new();
        h.capture.plug("interface");
        assert_eq!(h.session.input_devices().len(), 2);
        assert_eq!(h.session.refresh_devices().len(), 3);
    }
}
