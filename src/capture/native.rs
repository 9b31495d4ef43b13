//! Native capture backend using nokhwa and cpal
//!
//! The webcam runs on a dedicated thread that keeps the latest decoded frame;
//! the microphone is held open by a cpal input stream on its own thread.

use super::traits::{
    CaptureBackend, CaptureRequest, DeviceTrack, FacingMode, TrackKind, TrackSettings, VideoFrame,
};
use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::oneshot;

/// A camera reported by the platform
#[derive(Debug, Clone)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub name: String,
    pub description: String,
}

impl CameraDevice {
    /// Best guess at the facing mode from the platform's naming
    pub fn facing_mode(&self) -> Option<FacingMode> {
        let text = format!("{} {}", self.name, self.description).to_lowercase();
        if ["back", "rear", "environment", "world"]
            .iter()
            .any(|k| text.contains(k))
        {
            Some(FacingMode::Environment)
        } else if ["front", "user", "facetime", "integrated"]
            .iter()
            .any(|k| text.contains(k))
        {
            Some(FacingMode::User)
        } else {
            None
        }
    }
}

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraDevice> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| CameraDevice {
                index: info.index().clone(),
                name: info.human_name(),
                description: info.description().to_string(),
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Pick the camera for a facing mode
///
/// Without a facing mode the first camera wins. A requested mode that no
/// camera advertises is unavailable; single unlabelled cameras count as
/// user-facing.
fn select_camera(cameras: &[CameraDevice], facing: Option<FacingMode>) -> AppResult<CameraDevice> {
    let Some(wanted) = facing else {
        return cameras
            .first()
            .cloned()
            .ok_or_else(|| AppError::DeviceUnavailable("no cameras found".to_string()));
    };

    cameras
        .iter()
        .find(|c| c.facing_mode() == Some(wanted))
        .or_else(|| {
            (wanted == FacingMode::User)
                .then(|| cameras.iter().find(|c| c.facing_mode().is_none()))
                .flatten()
        })
        .cloned()
        .ok_or_else(|| AppError::DeviceUnavailable(format!("no camera facing {wanted}")))
}

/// Capture backend backed by the platform's devices
#[derive(Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    async fn open(&self, request: &CaptureRequest) -> AppResult<Vec<Box<dyn DeviceTrack>>> {
        let mut tracks: Vec<Box<dyn DeviceTrack>> = Vec::new();

        if request.wants_video() {
            let cameras = tokio::task::spawn_blocking(get_cameras)
                .await
                .map_err(|e| AppError::DeviceUnavailable(format!("camera query task: {e}")))?;
            let camera = select_camera(&cameras, request.video.facing_mode())?;
            let facing = request.video.facing_mode().or_else(|| camera.facing_mode());
            tracks.push(Box::new(NativeVideoTrack::open(camera, facing).await?));
        }

        if request.wants_audio() {
            match NativeAudioTrack::open().await {
                Ok(track) => tracks.push(Box::new(track)),
                Err(e) => {
                    for track in &tracks {
                        track.stop();
                    }
                    return Err(e);
                }
            }
        }

        Ok(tracks)
    }
}

/// Webcam track fed by a capture thread
struct NativeVideoTrack {
    label: String,
    settings: TrackSettings,
    running: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl NativeVideoTrack {
    async fn open(camera: CameraDevice, facing: Option<FacingMode>) -> AppResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let latest = Arc::new(Mutex::new(None));
        let (opened_tx, opened_rx) = oneshot::channel::<Result<(u32, u32, u32), String>>();

        let thread = {
            let running = running.clone();
            let latest = latest.clone();
            let index = camera.index.clone();
            std::thread::spawn(move || {
                let format =
                    RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

                let mut camera = match Camera::new(index.clone(), format) {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = opened_tx.send(Err(format!("open camera {index:?}: {e}")));
                        return;
                    }
                };

                if let Err(e) = camera.open_stream() {
                    let _ = opened_tx.send(Err(format!("open camera stream: {e}")));
                    return;
                }

                let camera_format = camera.camera_format();
                let width = camera_format.resolution().width();
                let height = camera_format.resolution().height();
                let fps = camera_format.frame_rate();
                let _ = opened_tx.send(Ok((width, height, fps)));

                let capture_start = std::time::Instant::now();
                let mut frame_count: u64 = 0;

                while running.load(Ordering::SeqCst) {
                    // Blocks until the camera delivers the next frame
                    match camera.frame() {
                        Ok(buffer) => match buffer.decode_image::<RgbAFormat>() {
                            Ok(image) => {
                                let (w, h) = (image.width(), image.height());
                                let timestamp_ms = capture_start.elapsed().as_secs_f64() * 1000.0;
                                *latest.lock() =
                                    Some(VideoFrame::new(image.into_raw(), w, h, timestamp_ms));
                                frame_count += 1;
                            }
                            Err(e) => tracing::debug!("Failed to decode frame: {:?}", e),
                        },
                        Err(e) => tracing::debug!("Failed to capture frame: {:?}", e),
                    }
                }

                if let Err(e) = camera.stop_stream() {
                    tracing::warn!("Error stopping camera stream: {:?}", e);
                }
                tracing::info!(
                    "Webcam thread stopped after {} frames in {:.2}s",
                    frame_count,
                    capture_start.elapsed().as_secs_f64()
                );
            })
        };

        let (width, height, fps) = match opened_rx.await {
            Ok(Ok(opened)) => opened,
            Ok(Err(message)) => {
                let _ = thread.join();
                return Err(AppError::DeviceUnavailable(message));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AppError::DeviceUnavailable(
                    "camera thread exited before opening".to_string(),
                ));
            }
        };

        tracing::info!(
            "Webcam '{}' opened: {}x{} @ {}fps",
            camera.name,
            width,
            height,
            fps
        );

        Ok(Self {
            label: camera.name,
            settings: TrackSettings {
                width: Some(width),
                height: Some(height),
                frame_rate: Some(fps),
                facing_mode: facing,
                ..Default::default()
            },
            running,
            latest,
            thread: Mutex::new(Some(thread)),
        })
    }
}

impl DeviceTrack for NativeVideoTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.latest.lock().clone()
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().take() {
            join_capture_thread(handle, "webcam");
        }
        self.latest.lock().take();
    }
}

/// Microphone track; the input stream lives on its own thread
struct NativeAudioTrack {
    label: String,
    settings: TrackSettings,
    /// Peak level of the last callback, as f32 bits
    peak: Arc<AtomicU32>,
    stop_tx: Mutex<Option<std::sync::mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl NativeAudioTrack {
    async fn open() -> AppResult<Self> {
        let peak = Arc::new(AtomicU32::new(0));
        let (opened_tx, opened_rx) = oneshot::channel::<Result<(String, u32, u16), String>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let thread = {
            let peak = peak.clone();
            std::thread::spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_input_device() else {
                    let _ = opened_tx.send(Err("no microphone present".to_string()));
                    return;
                };
                let name = device
                    .name()
                    .unwrap_or_else(|_| "Default Microphone".to_string());

                let supported = match device.default_input_config() {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = opened_tx.send(Err(format!("microphone config: {e}")));
                        return;
                    }
                };
                let sample_rate = supported.sample_rate().0;
                let channels = supported.channels();
                let config: cpal::StreamConfig = supported.config();
                let err_fn = |e: cpal::StreamError| tracing::warn!("Microphone stream error: {}", e);

                let stream = match supported.sample_format() {
                    cpal::SampleFormat::F32 => {
                        let peak = peak.clone();
                        device.build_input_stream(
                            &config,
                            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                                let level = data.iter().fold(0.0f32, |m, s| m.max(s.abs()));
                                peak.store(level.to_bits(), Ordering::Relaxed);
                            },
                            err_fn,
                            None,
                        )
                    }
                    cpal::SampleFormat::I16 => {
                        let peak = peak.clone();
                        device.build_input_stream(
                            &config,
                            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                                let level = data
                                    .iter()
                                    .fold(0.0f32, |m, s| m.max((*s as f32 / i16::MAX as f32).abs()));
                                peak.store(level.to_bits(), Ordering::Relaxed);
                            },
                            err_fn,
                            None,
                        )
                    }
                    other => {
                        let _ = opened_tx.send(Err(format!("unsupported sample format {other:?}")));
                        return;
                    }
                };

                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = opened_tx.send(Err(format!("build microphone stream: {e}")));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = opened_tx.send(Err(format!("start microphone stream: {e}")));
                    return;
                }

                let _ = opened_tx.send(Ok((name, sample_rate, channels)));

                // Hold the device until stopped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::info!("Microphone thread stopped");
            })
        };

        let (label, sample_rate, channels) = match opened_rx.await {
            Ok(Ok(opened)) => opened,
            Ok(Err(message)) => {
                let _ = thread.join();
                return Err(AppError::DeviceUnavailable(message));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AppError::DeviceUnavailable(
                    "microphone thread exited before opening".to_string(),
                ));
            }
        };

        tracing::info!(
            "Microphone '{}' opened: {}Hz, {} channel(s)",
            label,
            sample_rate,
            channels
        );

        Ok(Self {
            label,
            settings: TrackSettings {
                sample_rate: Some(sample_rate),
                channel_count: Some(channels),
                ..Default::default()
            },
            peak,
            stop_tx: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Peak amplitude of the most recent audio callback (0.0-1.0)
    fn peak_level(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }
}

impl DeviceTrack for NativeAudioTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        None
    }

    fn stop(&self) {
        tracing::debug!("Stopping microphone (last peak {:.3})", self.peak_level());
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.lock().take() {
            join_capture_thread(handle, "microphone");
        }
    }
}

/// Wait for a device thread to exit
///
/// Track stops are reached from async code; on a multi-threaded runtime the
/// worker is handed off while the camera finishes its current frame.
fn join_capture_thread(handle: JoinHandle<()>, name: &str) {
    let join = move || handle.join();
    let result = match tokio::runtime::Handle::try_current() {
        Ok(runtime) if runtime.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(join)
        }
        _ => join(),
    };
    if result.is_err() {
        tracing::warn!("{} capture thread panicked", name);
    }
}
