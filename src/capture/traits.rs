//! Capture trait definitions
//!
//! Platform-agnostic types for the device boundary: the capture request, the
//! per-track capability a backend hands back, and the frames it produces.

use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which way a camera points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the user
    User,
    /// Rear camera, facing away from the user
    Environment,
    Left,
    Right,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::User => write!(f, "user"),
            FacingMode::Environment => write!(f, "environment"),
            FacingMode::Left => write!(f, "left"),
            FacingMode::Right => write!(f, "right"),
        }
    }
}

/// Constraints applied to the video track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing_mode: Option<FacingMode>,

    /// Preferred width in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Preferred height in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Video half of a capture request: `true`/`false` or a constraint object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VideoRequest {
    Enabled(bool),
    Constrained(VideoConstraints),
}

impl VideoRequest {
    pub fn is_enabled(&self) -> bool {
        match self {
            VideoRequest::Enabled(enabled) => *enabled,
            VideoRequest::Constrained(_) => true,
        }
    }

    pub fn facing_mode(&self) -> Option<FacingMode> {
        match self {
            VideoRequest::Enabled(_) => None,
            VideoRequest::Constrained(c) => c.facing_mode,
        }
    }

    pub fn constraints(&self) -> Option<&VideoConstraints> {
        match self {
            VideoRequest::Enabled(_) => None,
            VideoRequest::Constrained(c) => Some(c),
        }
    }
}

impl Default for VideoRequest {
    fn default() -> Self {
        VideoRequest::Enabled(false)
    }
}

/// Media kinds and constraints requested from the platform
///
/// Supplied once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    #[serde(default)]
    pub audio: bool,

    #[serde(default)]
    pub video: VideoRequest,
}

impl CaptureRequest {
    /// Microphone plus the rear camera
    pub fn environment_camera() -> Self {
        Self {
            audio: true,
            video: VideoRequest::Constrained(VideoConstraints {
                facing_mode: Some(FacingMode::Environment),
                ..Default::default()
            }),
        }
    }

    pub fn wants_audio(&self) -> bool {
        self.audio
    }

    pub fn wants_video(&self) -> bool {
        self.video.is_enabled()
    }

    /// A request must ask for at least one media kind
    pub fn validate(&self) -> AppResult<()> {
        if !self.wants_audio() && !self.wants_video() {
            return Err(AppError::InvalidRequest(
                "request must enable audio, video or both".to_string(),
            ));
        }

        if let Some(c) = self.video.constraints() {
            if c.width == Some(0) || c.height == Some(0) {
                return Err(AppError::InvalidRequest(
                    "video width and height must be positive".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self::environment_camera()
    }
}

/// Kind of a live track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Settings the platform actually applied to a track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<u32>,
    pub facing_mode: Option<FacingMode>,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
}

/// One decoded frame from a video track
#[derive(Clone)]
pub struct VideoFrame {
    /// Tightly packed RGBA8 pixels
    pub data: Arc<Vec<u8>>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Timestamp in milliseconds since the track started
    pub timestamp_ms: f64,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ms: f64) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
            timestamp_ms,
        }
    }

    /// Byte length of a full RGBA8 frame at these dimensions
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    /// Whether the frame has a decodable, non-empty extent
    pub fn has_extent(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() >= Self::expected_len(self.width, self.height)
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Anything presenting a current video frame
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Option<VideoFrame>;
}

/// A single device track opened by a backend
///
/// `stop` releases the underlying device. `MediaTrack` guarantees it is
/// called at most once.
pub trait DeviceTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    fn settings(&self) -> TrackSettings;

    /// Latest frame for video tracks, `None` for audio
    fn latest_frame(&self) -> Option<VideoFrame>;

    fn stop(&self);
}

/// The platform capability that opens capture devices
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Backend identifier (e.g., "synthetic", "native")
    fn name(&self) -> &str;

    /// Open tracks satisfying the request
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`; never returns a
    /// partial set of tracks.
    async fn open(&self, request: &CaptureRequest) -> AppResult<Vec<Box<dyn DeviceTrack>>>;
}
