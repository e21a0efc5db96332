//! Transport state and clip start/stop scheduling.
//!
//! While playing, the playhead is a function of the wall clock:
//! `playhead = (now - wall_clock_start) * pixels_per_second`. Starting
//! playback plans every clip once; clips that begin later are started by
//! deferred actions that fire from [`PlaybackScheduler::tick`]. Each play,
//! pause, stop or seek starts a new generation so actions planned for an
//! earlier one are discarded instead of fired.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use studio_transport::{ClipId, Track, TrimWindow};

use crate::backend::PlaybackSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Lets the playhead refresh loop know when to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a clip should do when playback starts at `current_secs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipPlan {
    /// The playhead is inside the clip.
    PlayNow { position_secs: f64, stop_after_secs: f64 },
    /// The clip starts later. `stop_after_secs` counts from the deferred start.
    Deferred {
        delay_secs: f64,
        position_secs: f64,
        stop_after_secs: f64,
    },
    /// The playhead is past the clip's audible window.
    Silent,
}

pub fn plan_clip(clip_start_secs: f64, window: TrimWindow, current_secs: f64) -> ClipPlan {
    if current_secs < clip_start_secs {
        return ClipPlan::Deferred {
            delay_secs: clip_start_secs - current_secs,
            position_secs: window.start_offset_secs,
            stop_after_secs: window.duration_secs(),
        };
    }

    let position_secs = window.start_offset_secs + (current_secs - clip_start_secs);
    if position_secs >= window.end_secs {
        ClipPlan::Silent
    } else {
        ClipPlan::PlayNow {
            position_secs,
            stop_after_secs: window.end_secs - position_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Start { position_secs: f64 },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScheduledAction {
    due: Duration,
    clip: ClipId,
    action: Action,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    state: TransportState,
    playhead_px: f64,
    /// Wall-clock time, in seconds, at which the playhead was at zero.
    /// Negative when playback started past the elapsed clock time.
    wall_clock_start_secs: f64,
    generation: u64,
    pending: Vec<ScheduledAction>,
    active: BTreeSet<ClipId>,
    cancel: Option<CancelToken>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn playhead_px(&self) -> f64 {
        self.playhead_px
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Clips currently told to play.
    pub fn active_clips(&self) -> impl Iterator<Item = ClipId> + '_ {
        self.active.iter().copied()
    }

    pub fn pending_actions(&self) -> usize {
        self.pending.len()
    }

    /// Start playback from the current playhead. Returns the token for the
    /// playhead refresh loop, or `None` if already playing.
    pub fn play(
        &mut self,
        now: Duration,
        tracks: &[Track],
        pixels_per_second: f64,
        sink: &mut dyn PlaybackSink,
    ) -> Option<CancelToken> {
        if self.is_playing() {
            return None;
        }
        self.state = TransportState::Playing;
        self.wall_clock_start_secs = now.as_secs_f64() - self.playhead_px / pixels_per_second;
        self.generation += 1;
        self.plan_all(now, tracks, pixels_per_second, sink);

        let token = CancelToken::default();
        self.cancel = Some(token.clone());
        log::info!("playing from {:.3}s", self.playhead_px / pixels_per_second);
        Some(token)
    }

    /// Halt playback and keep the playhead where it is.
    pub fn pause(&mut self, now: Duration, pixels_per_second: f64, sink: &mut dyn PlaybackSink) {
        if !self.is_playing() {
            return;
        }
        self.update_playhead(now, pixels_per_second);
        self.state = TransportState::Paused;
        self.halt(sink);
        log::info!("paused at {:.3}s", self.playhead_px / pixels_per_second);
    }

    /// Halt playback and rewind to zero.
    pub fn stop(&mut self, sink: &mut dyn PlaybackSink) {
        self.state = TransportState::Stopped;
        self.playhead_px = 0.0;
        self.wall_clock_start_secs = 0.0;
        self.halt(sink);
        log::info!("stopped");
    }

    /// Move the playhead. While playing, the wall clock anchor moves with it
    /// and every clip is planned again from the new position.
    pub fn seek(
        &mut self,
        now: Duration,
        playhead_px: f64,
        tracks: &[Track],
        pixels_per_second: f64,
        sink: &mut dyn PlaybackSink,
    ) {
        self.playhead_px = playhead_px.max(0.0);
        if !self.is_playing() {
            return;
        }

        self.wall_clock_start_secs = now.as_secs_f64() - self.playhead_px / pixels_per_second;
        self.pause_active(sink);
        self.pending.clear();
        self.generation += 1;
        self.plan_all(now, tracks, pixels_per_second, sink);
    }

    /// Advance the playhead and fire due actions. Returns the playhead.
    pub fn tick(&mut self, now: Duration, pixels_per_second: f64, sink: &mut dyn PlaybackSink) -> f64 {
        if self.is_playing() {
            self.update_playhead(now, pixels_per_second);
        }

        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|action| action.due <= now);
        self.pending = rest;
        due.sort_by_key(|action| action.due);

        for scheduled in due {
            if !self.is_playing() || scheduled.generation != self.generation {
                log::debug!("dropping stale action for {}", scheduled.clip);
                continue;
            }
            match scheduled.action {
                Action::Start { position_secs } => {
                    sink.play(scheduled.clip, position_secs);
                    self.active.insert(scheduled.clip);
                }
                Action::Stop => {
                    sink.pause(scheduled.clip);
                    self.active.remove(&scheduled.clip);
                }
            }
        }
        self.playhead_px
    }

    fn update_playhead(&mut self, now: Duration, pixels_per_second: f64) {
        let elapsed = now.as_secs_f64() - self.wall_clock_start_secs;
        self.playhead_px = (elapsed * pixels_per_second).max(0.0);
    }

    fn halt(&mut self, sink: &mut dyn PlaybackSink) {
        self.pause_active(sink);
        self.pending.clear();
        self.generation += 1;
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    fn pause_active(&mut self, sink: &mut dyn PlaybackSink) {
        for clip in std::mem::take(&mut self.active) {
            sink.pause(clip);
        }
    }

    fn plan_all(&mut self, now: Duration, tracks: &[Track], pixels_per_second: f64, sink: &mut dyn PlaybackSink) {
        let current_secs = self.playhead_px / pixels_per_second;

        for clip in tracks.iter().flat_map(Track::clips) {
            if !clip.is_populated() {
                continue;
            }
            let plan = plan_clip(clip.start_time_secs(pixels_per_second), clip.window(), current_secs);
            log::debug!("{}: {plan:?}", clip.id());

            match plan {
                ClipPlan::PlayNow {
                    position_secs,
                    stop_after_secs,
                } => {
                    sink.play(clip.id(), position_secs);
                    self.active.insert(clip.id());
                    self.schedule(now + secs(stop_after_secs), clip.id(), Action::Stop);
                }
                ClipPlan::Deferred {
                    delay_secs,
                    position_secs,
                    stop_after_secs,
                } => {
                    let start = now + secs(delay_secs);
                    self.schedule(start, clip.id(), Action::Start { position_secs });
                    self.schedule(start + secs(stop_after_secs), clip.id(), Action::Stop);
                }
                ClipPlan::Silent => {}
            }
        }
    }

    fn schedule(&mut self, due: Duration, clip: ClipId, action: Action) {
        self.pending.push(ScheduledAction {
            due,
            clip,
            action,
            generation: self.generation,
        });
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
