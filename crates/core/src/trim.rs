//! Edge trimming of clips.
//!
//! A trim gesture works on the values captured when the handle was grabbed,
//! not on the clip's current state, so every pointer position maps to exactly
//! one trim window regardless of how many moves came before it.

use studio_transport::{Clip, ClipId, MIN_CLIP_WIDTH_PX, TrimWindow};

use crate::grid::GridSettings;
use crate::time::TimeContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimSide {
    Left,
    Right,
}

/// Clip geometry at the moment the trim handle was pressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimOrigin {
    pub clip: ClipId,
    pub pointer_x: f64,
    pub width_px: f64,
    pub left_px: f64,
    pub window: TrimWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TrimState {
    #[default]
    Idle,
    TrimmingLeft(TrimOrigin),
    TrimmingRight(TrimOrigin),
}

#[derive(Debug, Default)]
pub struct TrimEngine {
    state: TrimState,
}

impl TrimEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TrimState {
        self.state
    }

    pub fn is_trimming(&self) -> bool {
        !matches!(self.state, TrimState::Idle)
    }

    pub fn active_clip(&self) -> Option<ClipId> {
        match self.state {
            TrimState::Idle => None,
            TrimState::TrimmingLeft(origin) | TrimState::TrimmingRight(origin) => Some(origin.clip),
        }
    }

    /// Start trimming `clip` from `side`. Clips without audio, and clips
    /// already narrower than the minimum width, cannot be trimmed.
    pub fn begin(&mut self, clip: &Clip, side: TrimSide, pointer_x: f64, pixels_per_second: f64) -> bool {
        if !clip.is_populated() {
            log::debug!("{} has no audio yet, ignoring trim", clip.id());
            return false;
        }
        let width_px = clip.width_px(pixels_per_second);
        if width_px + 1e-9 < MIN_CLIP_WIDTH_PX {
            log::debug!("{} is {width_px:.1}px wide, too narrow to trim", clip.id());
            return false;
        }

        let origin = TrimOrigin {
            clip: clip.id(),
            pointer_x,
            width_px,
            left_px: clip.position_px(),
            window: clip.window(),
        };
        self.state = match side {
            TrimSide::Left => TrimState::TrimmingLeft(origin),
            TrimSide::Right => TrimState::TrimmingRight(origin),
        };
        true
    }

    /// Apply a pointer move to the clip being trimmed. Returns the new window,
    /// or `None` when idle or when `clip` is not the one being trimmed.
    pub fn update(
        &mut self,
        clip: &mut Clip,
        pointer_x: f64,
        ctx: &TimeContext,
        grid: &GridSettings,
    ) -> Option<TrimWindow> {
        let (origin, side) = match self.state {
            TrimState::Idle => return None,
            TrimState::TrimmingLeft(origin) => (origin, TrimSide::Left),
            TrimState::TrimmingRight(origin) => (origin, TrimSide::Right),
        };
        if origin.clip != clip.id() {
            return None;
        }

        let pps = ctx.pixels_per_second();
        let delta_px = grid.quantize(ctx, pointer_x - origin.pointer_x);
        let (window, left_px) = match side {
            TrimSide::Left => trim_left(&origin, delta_px, pps),
            TrimSide::Right => (trim_right(&origin, delta_px, pps, clip.total_duration_secs()), origin.left_px),
        };

        if !clip.set_window(window) {
            log::warn!("{} rejected trim window {window:?}", clip.id());
            return None;
        }
        clip.set_position_px(left_px);
        Some(window)
    }

    /// Release the handle. Returns the clip that was being trimmed, if any.
    pub fn end(&mut self) -> Option<ClipId> {
        let clip = self.active_clip();
        self.state = TrimState::Idle;
        clip
    }
}

fn trim_left(origin: &TrimOrigin, delta_px: f64, pps: f64) -> (TrimWindow, f64) {
    let min_duration = Clip::min_duration_secs(pps);
    let TrimWindow {
        start_offset_secs: start,
        end_secs: end,
    } = origin.window;

    let delta_px = delta_px
        .min(origin.width_px - MIN_CLIP_WIDTH_PX)
        .max(-start * pps);
    let new_start = (start + delta_px / pps).min(end - min_duration).max(0.0);
    let new_width = (end - new_start) * pps;
    let left_px = origin.left_px + (origin.width_px - new_width);

    (TrimWindow::new(new_start, end), left_px)
}

fn trim_right(origin: &TrimOrigin, delta_px: f64, pps: f64, total_secs: f64) -> TrimWindow {
    let start = origin.window.start_offset_secs;
    let max_width = (total_secs - start) * pps;
    let new_width = (origin.width_px + delta_px)
        .max(MIN_CLIP_WIDTH_PX)
        .min(max_width);
    let end = (start + new_width / pps).min(total_secs);

    TrimWindow::new(start, end)
}
