//! Moving clips along the timeline and between tracks.

use studio_transport::{Clip, ClipId, Track, TrackId};

use crate::grid::GridSettings;
use crate::time::TimeContext;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragOrigin {
    pub clip: ClipId,
    pub source_track: TrackId,
    /// Distance from the clip's left edge to the pointer at press time.
    pub drag_offset_px: f64,
    pub original_left_px: f64,
    /// Furthest the clip may travel from `original_left_px` in either direction.
    pub max_travel_px: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropOutcome {
    pub clip: ClipId,
    pub position_px: f64,
    pub from: TrackId,
    pub to: TrackId,
    /// Overlapping pairs left on the destination track.
    pub overlaps: Vec<(ClipId, ClipId)>,
}

impl DropOutcome {
    pub fn moved_track(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Default)]
pub struct DragEngine {
    active: Option<DragOrigin>,
}

impl DragEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&DragOrigin> {
        self.active.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    /// Pick up `clip`. Clips that are still recording stay put.
    pub fn begin(&mut self, clip: &Clip, pointer_x: f64, pixels_per_second: f64) -> bool {
        if !clip.is_populated() {
            return false;
        }
        self.active = Some(DragOrigin {
            clip: clip.id(),
            source_track: clip.track(),
            drag_offset_px: pointer_x - clip.position_px(),
            original_left_px: clip.original_left_px(),
            max_travel_px: clip.visible_duration_secs(pixels_per_second) * pixels_per_second,
        });
        true
    }

    /// Where the clip's left edge lands for a pointer at `pointer_x` over a
    /// track whose content starts at `track_left_px`.
    pub fn target_position(
        origin: &DragOrigin,
        pointer_x: f64,
        track_left_px: f64,
        ctx: &TimeContext,
        grid: &GridSettings,
    ) -> f64 {
        let raw = pointer_x - track_left_px - origin.drag_offset_px;
        let snapped = grid.quantize(ctx, raw);
        let lowest = origin.original_left_px - origin.max_travel_px;
        let highest = origin.original_left_px + origin.max_travel_px;
        snapped.max(lowest).min(highest).max(0.0)
    }

    /// Follow the pointer. The clip stays on its source track until dropped.
    pub fn drag_over(
        &mut self,
        tracks: &mut [Track],
        pointer_x: f64,
        track_left_px: f64,
        ctx: &TimeContext,
        grid: &GridSettings,
    ) -> Option<f64> {
        let origin = self.active?;
        let position = Self::target_position(&origin, pointer_x, track_left_px, ctx, grid);
        let clip = find_clip_mut(tracks, origin.source_track, origin.clip)?;
        clip.set_position_px(position);
        Some(position)
    }

    /// Finish the gesture: place the clip and hand it to `target` if that is a
    /// different track. An unknown target leaves the clip on its source track.
    pub fn drop(
        &mut self,
        tracks: &mut [Track],
        pointer_x: f64,
        track_left_px: f64,
        target: TrackId,
        ctx: &TimeContext,
        grid: &GridSettings,
    ) -> Option<DropOutcome> {
        let origin = self.active.take()?;
        let position = Self::target_position(&origin, pointer_x, track_left_px, ctx, grid);

        let source_index = tracks.iter().position(|t| t.id == origin.source_track)?;
        let mut destination = target;
        if target != origin.source_track {
            if let Some(target_index) = tracks.iter().position(|t| t.id == target) {
                let mut clip = tracks[source_index].remove_clip(origin.clip)?;
                clip.set_position_px(position);
                tracks[target_index].add_clip(clip);
            } else {
                log::warn!("drop target {target} does not exist, keeping {} on {}", origin.clip, origin.source_track);
                destination = origin.source_track;
            }
        }
        if destination == origin.source_track {
            tracks[source_index].clip_mut(origin.clip)?.set_position_px(position);
        }

        let pps = ctx.pixels_per_second();
        let overlaps = tracks
            .iter()
            .find(|t| t.id == destination)
            .map(|t| t.overlapping_clips(pps))
            .unwrap_or_default()
            .into_iter()
            .filter(|(a, b)| *a == origin.clip || *b == origin.clip)
            .collect::<Vec<_>>();
        if !overlaps.is_empty() {
            log::warn!("{} now overlaps {} clip(s) on {destination}", origin.clip, overlaps.len());
        }

        log::debug!("dropped {} at {position:.1}px on {destination}", origin.clip);
        Some(DropOutcome {
            clip: origin.clip,
            position_px: position,
            from: origin.source_track,
            to: destination,
            overlaps,
        })
    }

    /// Abandon the gesture, leaving the clip wherever the last move put it.
    pub fn cancel(&mut self) -> Option<ClipId> {
        self.active.take().map(|origin| origin.clip)
    }
}

fn find_clip_mut(tracks: &mut [Track], track: TrackId, clip: ClipId) -> Option<&mut Clip> {
    tracks.iter_mut().find(|t| t.id == track)?.clip_mut(clip)
}
