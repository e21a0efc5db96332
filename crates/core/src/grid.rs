//! Beat grid snapping and ruler lines.

use crate::time::TimeContext;

pub const DEFAULT_SNAP_TOLERANCE_PX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSettings {
    pub snap_enabled: bool,
    /// Fraction of a beat between snap lines (1.0 = quarter notes).
    pub snap_resolution: f64,
    /// How far a position may be from a grid line and still snap to it.
    pub snap_tolerance_px: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            snap_enabled: true,
            snap_resolution: 1.0,
            snap_tolerance_px: DEFAULT_SNAP_TOLERANCE_PX,
        }
    }
}

impl GridSettings {
    pub fn snap_interval_px(&self, ctx: &TimeContext) -> f64 {
        ctx.pixels_per_beat() * self.snap_resolution
    }

    /// Snap `px` to the nearest grid line if it lies within the tolerance
    /// (inclusive). Positions further away are returned unchanged, so a free
    /// drag is never pulled across a large gap.
    pub fn quantize(&self, ctx: &TimeContext, px: f64) -> f64 {
        if !self.snap_enabled {
            return px;
        }
        let interval = self.snap_interval_px(ctx);
        if !interval.is_finite() || interval <= 0.0 {
            return px;
        }

        let candidate = (px / interval).round() * interval;
        if (px - candidate).abs() <= self.snap_tolerance_px {
            candidate
        } else {
            px
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridLineKind {
    /// One-based bar number.
    Bar(u32),
    /// One-based beat number within its bar; beat 1 coincides with the bar line.
    Beat(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLine {
    pub x: f64,
    pub kind: GridLineKind,
}

/// Ruler lines covering `[0, width_px)`.
pub fn grid_lines(ctx: &TimeContext, width_px: f64) -> Vec<GridLine> {
    let pixels_per_beat = ctx.pixels_per_beat();
    let pixels_per_bar = ctx.pixels_per_bar();
    let beats_per_bar = ctx.beats_per_bar();
    if !(pixels_per_bar.is_finite() && pixels_per_bar > 0.0) {
        return Vec::new();
    }

    let mut lines = Vec::new();
    let mut bar = 0u32;
    loop {
        let x = bar as f64 * pixels_per_bar;
        if x >= width_px {
            break;
        }
        lines.push(GridLine {
            x,
            kind: GridLineKind::Bar(bar + 1),
        });
        for beat in 1..beats_per_bar {
            let beat_x = x + beat as f64 * pixels_per_beat;
            if beat_x >= width_px {
                break;
            }
            lines.push(GridLine {
                x: beat_x,
                kind: GridLineKind::Beat(beat + 1),
            });
        }
        bar += 1;
    }
    lines
}
