//! Synthetic capture backend
//!
//! A software camera and microphone. The camera renders a moving test pattern
//! so previews, recordings and stills work without hardware.

use super::traits::{
    CaptureBackend, CaptureRequest, DeviceTrack, FacingMode, TrackKind, TrackSettings, VideoFrame,
};
use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of the simulated permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntheticPermission {
    Granted,
    Denied,
}

/// Synthetic device description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyntheticConfig {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Frames per second
    pub fps: u32,

    /// Cameras present on the simulated device
    pub facing_modes: Vec<FacingMode>,

    /// Whether a microphone is present
    pub microphone: bool,

    pub permission: SyntheticPermission,

    /// Simulated time the platform takes to resolve an acquisition
    pub open_delay_ms: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            facing_modes: vec![FacingMode::User, FacingMode::Environment],
            microphone: true,
            permission: SyntheticPermission::Granted,
            open_delay_ms: 0,
        }
    }
}

/// Backend producing synthetic tracks
pub struct SyntheticBackend {
    config: SyntheticConfig,
    opens: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl SyntheticBackend {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            opens: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of acquisitions that reached the device
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of tracks stopped so far
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn pick_facing(&self, requested: Option<FacingMode>) -> AppResult<FacingMode> {
        match requested {
            Some(facing) if self.config.facing_modes.contains(&facing) => Ok(facing),
            Some(facing) => Err(AppError::DeviceUnavailable(format!(
                "no camera facing {facing}"
            ))),
            None => self
                .config
                .facing_modes
                .first()
                .copied()
                .ok_or_else(|| AppError::DeviceUnavailable("no camera present".to_string())),
        }
    }
}

#[async_trait]
impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn open(&self, request: &CaptureRequest) -> AppResult<Vec<Box<dyn DeviceTrack>>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.config.open_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.open_delay_ms)).await;
        }

        if self.config.permission == SyntheticPermission::Denied {
            return Err(AppError::PermissionDenied(
                "user dismissed the capture prompt".to_string(),
            ));
        }

        let mut tracks: Vec<Box<dyn DeviceTrack>> = Vec::new();

        if request.wants_audio() {
            if !self.config.microphone {
                return Err(AppError::DeviceUnavailable("no microphone present".to_string()));
            }
            tracks.push(Box::new(SyntheticAudioTrack {
                stops: self.stops.clone(),
            }));
        }

        if request.wants_video() {
            let facing = self.pick_facing(request.video.facing_mode())?;
            let constraints = request.video.constraints();
            let width = constraints.and_then(|c| c.width).unwrap_or(self.config.width);
            let height = constraints.and_then(|c| c.height).unwrap_or(self.config.height);

            tracks.push(Box::new(SyntheticVideoTrack {
                label: format!("Synthetic Camera ({facing})"),
                width,
                height,
                fps: self.config.fps.max(1),
                facing,
                started: Instant::now(),
                last: Mutex::new(None),
                stops: self.stops.clone(),
            }));
        }

        tracing::debug!("Synthetic backend opened {} track(s)", tracks.len());
        Ok(tracks)
    }
}

struct SyntheticAudioTrack {
    stops: Arc<AtomicUsize>,
}

impl DeviceTrack for SyntheticAudioTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        "Synthetic Microphone"
    }

    fn settings(&self) -> TrackSettings {
        TrackSettings {
            sample_rate: Some(48_000),
            channel_count: Some(1),
            ..Default::default()
        }
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        None
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct SyntheticVideoTrack {
    label: String,
    width: u32,
    height: u32,
    fps: u32,
    facing: FacingMode,
    started: Instant,
    /// Last rendered frame and its index
    last: Mutex<Option<(u64, VideoFrame)>>,
    stops: Arc<AtomicUsize>,
}

impl DeviceTrack for SyntheticVideoTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn settings(&self) -> TrackSettings {
        TrackSettings {
            width: Some(self.width),
            height: Some(self.height),
            frame_rate: Some(self.fps),
            facing_mode: Some(self.facing),
            ..Default::default()
        }
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        let index = (self.started.elapsed().as_secs_f64() * self.fps as f64) as u64;

        let mut last = self.last.lock();
        if let Some((last_index, frame)) = last.as_ref() {
            if *last_index == index {
                return Some(frame.clone());
            }
        }

        let timestamp_ms = index as f64 * 1000.0 / self.fps as f64;
        let frame = render_test_pattern(self.width, self.height, index, timestamp_ms);
        *last = Some((index, frame.clone()));
        Some(frame)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Gradient background with a bright bar sweeping left to right
fn render_test_pattern(width: u32, height: u32, index: u64, timestamp_ms: f64) -> VideoFrame {
    let mut data = Vec::with_capacity(VideoFrame::expected_len(width, height));
    let bar_width = (width / 16).max(1);
    let bar_x = ((index * 8) % width.max(1) as u64) as u32;

    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            let b = if x >= bar_x && x < bar_x + bar_width { 255 } else { 64 };
            data.extend_from_slice(&[r, g, b, 255]);
        }
    }

    VideoFrame::new(data, width, height, timestamp_ms)
}
