use studio_codec::DecodeError;
use studio_transport::{ClipId, TrackId};

use crate::devices::DeviceId;

/// Why an input device could not deliver audio.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("permission to use input '{0}' was denied")]
    PermissionDenied(DeviceId),

    #[error("input device '{0}' not found")]
    DeviceNotFound(DeviceId),

    #[error("input device '{0}' was disconnected")]
    DeviceDisconnected(DeviceId),

    #[error("input device '{device}' failed: {message}")]
    Backend { device: DeviceId, message: String },
}

/// Errors surfaced by [`crate::Session`]. None of them leave the session in
/// an unusable state.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("could not decode recording for {clip}: {source}")]
    Decode {
        clip: ClipId,
        #[source]
        source: DecodeError,
    },

    #[error("no tracks are armed for recording")]
    NoArmedTracks,

    #[error("no track is free at {at_secs:.2}s")]
    NoAvailableTrack { at_secs: f64 },

    #[error("unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("unknown clip {0}")]
    UnknownClip(ClipId),

    #[error("{0} has no audio yet")]
    ClipNotPopulated(ClipId),

    #[error("{0} cannot be armed while its input is unavailable")]
    DeviceUnavailable(TrackId),

    #[error("a recording is already in progress")]
    RecordingInProgress,

    #[error("playback backend: {0}")]
    Playback(anyhow::Error),
}

pub type Result<T, E = StudioError> = std::result::Result<T, E>;
