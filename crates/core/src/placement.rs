//! Choosing a free lane for new recordings.

use studio_transport::{Track, TrackId};

/// The first track, in declaration order, with no clip covering `at_secs`.
///
/// A clip covers the closed range `[start, start + visible_duration]`, so a
/// clip that ends exactly at `at_secs` still counts as a conflict.
pub fn find_available_track(tracks: &[Track], at_secs: f64, pixels_per_second: f64) -> Option<TrackId> {
    tracks
        .iter()
        .find(|track| !track.has_clip_at(at_secs, pixels_per_second))
        .map(|track| track.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_transport::{AudioArc, Clip, ClipId};

    const PPS: f64 = 100.0;

    fn tracks(count: u64) -> Vec<Track> {
        (0..count)
            .map(|i| Track::new(TrackId(i), format!("Track {}", i + 1)))
            .collect()
    }

    fn one_second_clip(id: u64, position_px: f64) -> Clip {
        let audio = AudioArc::new(vec![0.0; 1000], 1000, 1);
        Clip::with_audio(ClipId(id), "clip", TrackId(0), position_px, audio)
    }

    #[test]
    fn test_first_empty_track_wins() {
        let tracks = tracks(3);
        assert_eq!(find_available_track(&tracks, 1.5, PPS), Some(TrackId(0)));
    }

    #[test]
    fn test_occupied_track_is_skipped() {
        let mut tracks = tracks(3);
        tracks[0].add_clip(one_second_clip(1, 100.0));
        assert_eq!(find_available_track(&tracks, 1.5, PPS), Some(TrackId(1)));
        assert_eq!(find_available_track(&tracks, 2.5, PPS), Some(TrackId(0)));
    }

    #[test]
    fn test_clip_ending_at_the_playhead_conflicts() {
        let mut tracks = tracks(2);
        tracks[0].add_clip(one_second_clip(1, 0.0));
        assert_eq!(find_available_track(&tracks, 1.0, PPS), Some(TrackId(1)));
    }

    #[test]
    fn test_no_track_available() {
        let mut tracks = tracks(2);
        tracks[0].add_clip(one_second_clip(1, 0.0));
        tracks[1].add_clip(one_second_clip(2, 50.0));
        assert_eq!(find_available_track(&tracks, 0.75, PPS), None);
        assert_eq!(find_available_track(&[], 0.0, PPS), None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let mut tracks = tracks(4);
        tracks[0].add_clip(one_second_clip(1, 0.0));
        tracks[2].add_clip(one_second_clip(2, 0.0));

        let first = find_available_track(&tracks, 0.5, PPS);
        for _ in 0..10 {
            assert_eq!(find_available_track(&tracks, 0.5, PPS), first);
        }
        assert_eq!(first, Some(TrackId(1)));
    }
}
