use std::sync::Arc;

use crate::waveform::{WaveformView, render_waveform};
use crate::{AudioArc, ClipId, MIN_CLIP_WIDTH_PX, TrackId};

/// The audible part of a clip's buffer, `[start_offset_secs, end_secs)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrimWindow {
    pub start_offset_secs: f64,
    pub end_secs: f64,
}

impl TrimWindow {
    pub fn new(start_offset_secs: f64, end_secs: f64) -> Self {
        Self {
            start_offset_secs,
            end_secs,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_offset_secs
    }
}

/// A time-ranged, trimmable reference to decoded audio placed on a track.
///
/// The left edge lives in pixel space because that is what pointer gestures
/// move; the width is always derived from the trim window so the two can never
/// disagree. A clip starts out empty while it is being recorded and becomes
/// playable once [`Clip::populate`] attaches its buffer.
#[derive(Debug, Clone)]
pub struct Clip {
    id: ClipId,
    name: String,
    track: TrackId,
    position_px: f64,
    original_left_px: f64,
    audio: Option<AudioArc>,
    window: TrimWindow,
    /// Visual stand-in for elapsed time while recording; unused once populated.
    provisional_width_px: f64,
    waveform: Option<Arc<WaveformView>>,
}

impl Clip {
    /// An empty clip anchored at `position_px`, as created when recording starts.
    pub fn recording(id: ClipId, name: impl Into<String>, track: TrackId, position_px: f64) -> Self {
        let position_px = position_px.max(0.0);
        Self {
            id,
            name: name.into(),
            track,
            position_px,
            original_left_px: position_px,
            audio: None,
            window: TrimWindow::default(),
            provisional_width_px: 0.0,
            waveform: None,
        }
    }

    /// A clip that already owns its buffer, trimmed to the full duration.
    pub fn with_audio(
        id: ClipId,
        name: impl Into<String>,
        track: TrackId,
        position_px: f64,
        audio: AudioArc,
    ) -> Self {
        let mut clip = Self::recording(id, name, track, position_px);
        clip.populate(audio);
        clip
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning track. Lookup only: [`Track`] decides membership.
    pub fn track(&self) -> TrackId {
        self.track
    }

    pub fn position_px(&self) -> f64 {
        self.position_px
    }

    pub fn set_position_px(&mut self, position_px: f64) {
        self.position_px = position_px.max(0.0);
    }

    pub fn original_left_px(&self) -> f64 {
        self.original_left_px
    }

    pub fn audio(&self) -> Option<&AudioArc> {
        self.audio.as_ref()
    }

    pub fn is_populated(&self) -> bool {
        self.audio.is_some()
    }

    /// Attach the decoded buffer and open the trim window over all of it.
    ///
    /// The buffer is set once; returns `false` and leaves the clip untouched
    /// if it already has one.
    pub fn populate(&mut self, audio: AudioArc) -> bool {
        if self.audio.is_some() {
            return false;
        }
        self.window = TrimWindow::new(0.0, audio.duration_secs());
        self.audio = Some(audio);
        self.provisional_width_px = 0.0;
        self.waveform = None;
        true
    }

    pub fn total_duration_secs(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, AudioArc::duration_secs)
    }

    pub fn window(&self) -> TrimWindow {
        self.window
    }

    /// Replace the trim window. Rejects windows outside
    /// `0 <= start < end <= total_duration` and clips without audio.
    pub fn set_window(&mut self, window: TrimWindow) -> bool {
        let total = self.total_duration_secs();
        let valid = self.audio.is_some()
            && window.start_offset_secs >= 0.0
            && window.start_offset_secs < window.end_secs
            && window.end_secs <= total;
        if !valid {
            return false;
        }
        if window != self.window {
            self.window = window;
            self.waveform = None;
        }
        true
    }

    pub fn min_duration_secs(pixels_per_second: f64) -> f64 {
        MIN_CLIP_WIDTH_PX / pixels_per_second
    }

    pub fn start_time_secs(&self, pixels_per_second: f64) -> f64 {
        self.position_px / pixels_per_second
    }

    /// Width on screen. Derived from the trim window once populated.
    pub fn width_px(&self, pixels_per_second: f64) -> f64 {
        if self.audio.is_some() {
            self.window.duration_secs() * pixels_per_second
        } else {
            self.provisional_width_px
        }
    }

    pub fn visible_duration_secs(&self, pixels_per_second: f64) -> f64 {
        self.width_px(pixels_per_second) / pixels_per_second
    }

    /// Grow the placeholder of a clip that is still recording. Ignored once
    /// the clip has audio.
    pub fn set_provisional_width_px(&mut self, width_px: f64) {
        if self.audio.is_none() {
            self.provisional_width_px = width_px.max(0.0);
        }
    }

    /// The min/max envelope of the visible window, rendered on demand and
    /// cached until the window or the on-screen size changes.
    pub fn waveform(&mut self, pixels_per_second: f64, height_px: u32) -> Option<Arc<WaveformView>> {
        let audio = self.audio.as_ref()?;
        let width_px = self.width_px(pixels_per_second).round().max(1.0) as u32;

        let stale = match &self.waveform {
            Some(view) => view.width_px != width_px || view.height_px != height_px,
            None => true,
        };
        if stale {
            let view = render_waveform(
                audio,
                width_px,
                height_px,
                self.window.start_offset_secs,
                self.window.end_secs,
            );
            self.waveform = Some(Arc::new(view));
        }
        self.waveform.clone()
    }

    pub fn has_cached_waveform(&self) -> bool {
        self.waveform.is_some()
    }

    pub(crate) fn set_track(&mut self, track: TrackId) {
        self.track = track;
    }
}

/// An ordered lane of clips.
///
/// Tracks do not prevent overlap; avoiding it is the placement resolver's job.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    clips: Vec<Clip>,
    /// Linear gain, 0.0..=1.0.
    pub volume: f32,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            clips: Vec::new(),
            volume: 1.0,
        }
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn clips_mut(&mut self) -> impl Iterator<Item = &mut Clip> {
        self.clips.iter_mut()
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn clip_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ClipId) -> bool {
        self.clips.iter().any(|c| c.id == id)
    }

    /// Append a clip and take ownership of it.
    pub fn add_clip(&mut self, mut clip: Clip) {
        clip.set_track(self.id);
        self.clips.push(clip);
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<Clip> {
        let index = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(index))
    }

    /// True when some clip's visible range `[start, end]` contains `at_secs`.
    /// Both ends are inclusive, so a clip ending exactly at `at_secs` conflicts.
    pub fn has_clip_at(&self, at_secs: f64, pixels_per_second: f64) -> bool {
        self.clips.iter().any(|clip| {
            let start = clip.start_time_secs(pixels_per_second);
            let end = start + clip.visible_duration_secs(pixels_per_second);
            at_secs >= start && at_secs <= end
        })
    }

    /// Pairs of clips whose visible ranges overlap.
    pub fn overlapping_clips(&self, pixels_per_second: f64) -> Vec<(ClipId, ClipId)> {
        let mut pairs = Vec::new();
        for (i, a) in self.clips.iter().enumerate() {
            let a_start = a.position_px;
            let a_end = a_start + a.width_px(pixels_per_second);
            for b in &self.clips[i + 1..] {
                let b_start = b.position_px;
                let b_end = b_start + b.width_px(pixels_per_second);
                if a_start < b_end && b_start < a_end {
                    pairs.push((a.id, b.id));
                }
            }
        }
        pairs
    }
}
