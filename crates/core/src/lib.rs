pub mod backend;
pub mod devices;
pub mod drag;
pub mod error;
pub mod grid;
pub mod metrics;
pub mod placement;
pub mod recording;
pub mod scheduler;
pub mod session;
pub mod time;
pub mod trim;

#[cfg(test)]
mod testing;

pub use backend::{
    AudioDecoder, CaptureService, CaptureStream, Clock, InputDeviceInfo, PlaybackSink, SymphoniaDecoder, SystemClock,
};
pub use devices::{DeviceId, InputDevice};
pub use drag::DropOutcome;
pub use error::{CaptureError, Result, StudioError};
pub use grid::{GridLine, GridLineKind, GridSettings};
pub use metrics::MetricsSnapshot;
pub use recording::{RecordingReport, RecordingState};
pub use scheduler::{CancelToken, TransportState};
pub use session::{Session, SessionSettings};
pub use time::{DisplayMode, MusicalPosition, TimeContext, TimeSignature};
pub use trim::TrimSide;

pub use studio_transport::{AudioArc, Clip, ClipId, Surface, Track, TrackId, TrimWindow, WaveformView};
