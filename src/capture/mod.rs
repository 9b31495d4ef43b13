//! Device capture
//!
//! The device boundary (backends and their tracks), the stream handle built
//! from an acquisition, and the manager that owns the stream's lifetime.

pub mod manager;
pub mod stream;
pub mod synthetic;
pub mod traits;

#[cfg(feature = "native")]
pub mod native;

pub use manager::DeviceStreamManager;
pub use stream::{MediaStream, MediaTrack};
pub use synthetic::{SyntheticBackend, SyntheticConfig, SyntheticPermission};
pub use traits::{
    CaptureBackend, CaptureRequest, DeviceTrack, FacingMode, FrameSource, TrackKind,
    TrackSettings, VideoConstraints, VideoFrame, VideoRequest,
};
