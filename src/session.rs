//! Capture session
//!
//! Wires the stream manager, binder, recorder and photo pipeline together and
//! exposes the two user commands: toggle recording and capture a photo.

use crate::capture::{CaptureBackend, DeviceStreamManager, MediaStream, SyntheticBackend, TrackKind};
use crate::config::{AppConfig, BackendKind};
use crate::photo::{CaptureOutcome, CaptureTicket, PhotoPipeline, PngEncoder};
use crate::recorder::{FrameChunkProducer, Recorder, RecordingEvent, RecordingState};
use crate::surface::{Binder, ResourceLocator, ResourceRegistry};
use crate::utils::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Build the capture backend named in the config
pub fn backend_for(config: &AppConfig) -> AppResult<Arc<dyn CaptureBackend>> {
    match config.backend {
        BackendKind::Synthetic => Ok(Arc::new(SyntheticBackend::new(config.synthetic.clone()))),
        #[cfg(feature = "native")]
        BackendKind::Native => Ok(Arc::new(crate::capture::native::NativeBackend::new())),
        #[cfg(not(feature = "native"))]
        BackendKind::Native => Err(AppError::Config(
            "native backend requires building with the `native` feature".to_string(),
        )),
    }
}

/// Snapshot of one track
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStatus {
    pub kind: TrackKind,
    pub label: String,
    pub live: bool,
}

/// Snapshot of the whole session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub stream_id: Uuid,
    pub stream_acquired_at: DateTime<Utc>,
    pub stream_active: bool,
    pub tracks: Vec<TrackStatus>,
    pub preview_ready: bool,
    pub recording_state: RecordingState,
    pub recording_duration_ms: f64,
    /// Completed recordings
    pub recordings: usize,
    pub playback: Option<ResourceLocator>,
    pub photo: Option<ResourceLocator>,
    pub live_resources: usize,
}

/// One live capture component
pub struct CaptureSession {
    registry: Arc<ResourceRegistry>,
    manager: DeviceStreamManager,
    binder: Binder,
    recorder: Mutex<Recorder>,
    photos: PhotoPipeline,
    stream: MediaStream,
}

impl CaptureSession {
    /// Acquire the stream, attach the preview and arm the recorder
    ///
    /// Acquisition errors are returned as-is and nothing is attached. The
    /// recorder is only bound once the preview shows its first frame.
    pub async fn start(config: AppConfig, backend: Arc<dyn CaptureBackend>) -> AppResult<Self> {
        config.validate()?;

        let registry = Arc::new(ResourceRegistry::new());
        let manager = DeviceStreamManager::new(backend);
        let stream = manager.acquire(&config.capture).await?;

        let binder = Binder::new(registry.clone());
        binder.attach_preview(&stream);

        let mut recorder = Recorder::new(
            Arc::new(FrameChunkProducer),
            &config.recording,
            registry.clone(),
        );

        if stream.video_track().is_some() {
            let timeout = Duration::from_millis(config.preview_ready_timeout_ms);
            if let Err(e) = binder.wait_preview_ready(timeout).await {
                tracing::error!("Preview never became ready: {}", e);
                binder.detach_preview();
                manager.release(&stream);
                return Err(e);
            }
            recorder.bind(stream.clone())?;
        } else {
            tracing::warn!("Stream has no video track; recording is unavailable");
        }

        let photos = PhotoPipeline::new(
            Arc::new(PngEncoder::new(config.photo.compression)),
            registry.clone(),
        )
        .with_display(binder.photo_display().clone());

        tracing::info!(
            "Capture session ready on {} backend (stream {})",
            manager.backend_name(),
            stream.id()
        );

        Ok(Self {
            registry,
            manager,
            binder,
            recorder: Mutex::new(recorder),
            photos,
            stream,
        })
    }

    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    pub fn binder(&self) -> &Binder {
        &self.binder
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub async fn recording_state(&self) -> RecordingState {
        self.recorder.lock().await.state()
    }

    /// Recording lifecycle events, including each finished artifact
    pub async fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.recorder.lock().await.subscribe()
    }

    /// Start recording; errors are returned, not swallowed
    pub async fn start_recording(&self) -> AppResult<RecordingState> {
        let mut recorder = self.recorder.lock().await;
        recorder.start()?;
        Ok(recorder.state())
    }

    /// Stop recording and push the artifact to playback
    pub async fn stop_recording(&self) -> AppResult<RecordingState> {
        let mut recorder = self.recorder.lock().await;
        let artifact = recorder.stop().await?;
        self.binder.show_recording(&artifact);
        Ok(recorder.state())
    }

    /// Start when idle, stop when recording
    ///
    /// Out-of-order transitions are logged by the recorder and ignored here.
    pub async fn toggle_recording(&self) -> AppResult<RecordingState> {
        let result = if self.recording_state().await == RecordingState::Recording {
            self.stop_recording().await
        } else {
            self.start_recording().await
        };

        match result {
            Err(e) if e.is_contract_violation() => Ok(self.recording_state().await),
            other => other,
        }
    }

    /// Begin a still capture from the live preview
    pub fn request_photo(&self) -> AppResult<CaptureTicket> {
        self.photos.capture(&**self.binder.preview()).inspect_err(|e| {
            if matches!(e, AppError::NoFrameAvailable(_)) {
                tracing::warn!("Photo not taken: {}", e);
            }
        })
    }

    /// Capture a still and wait for it to encode
    pub async fn capture_photo(&self) -> AppResult<CaptureOutcome> {
        self.request_photo()?.wait().await
    }

    pub async fn status(&self) -> SessionStatus {
        let (recording_state, recording_duration_ms, recordings) = {
            let recorder = self.recorder.lock().await;
            (
                recorder.state(),
                recorder.duration_ms(),
                recorder.artifact_count(),
            )
        };

        SessionStatus {
            stream_id: self.stream.id(),
            stream_acquired_at: self.stream.acquired_at(),
            stream_active: self.stream.is_active(),
            tracks: self
                .stream
                .tracks()
                .iter()
                .map(|t| TrackStatus {
                    kind: t.kind(),
                    label: t.label().to_string(),
                    live: t.is_live(),
                })
                .collect(),
            preview_ready: self.binder.preview().is_ready(),
            recording_state,
            recording_duration_ms,
            recordings,
            playback: self.binder.playback().locator(),
            photo: self.binder.photo_display().locator(),
            live_resources: self.registry.len(),
        }
    }

    /// Drop any recording in progress, detach the stream everywhere and
    /// release it
    pub async fn shutdown(&self) {
        {
            let mut recorder = self.recorder.lock().await;
            recorder.abort().await;
            if let Err(e) = recorder.unbind() {
                tracing::warn!("Recorder still holds the stream: {}", e);
            }
        }
        self.binder.detach_preview();
        self.manager.release(&self.stream);
        tracing::info!("Capture session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureRequest, FacingMode, SyntheticConfig, SyntheticPermission, VideoRequest};
    use crate::capture::FrameSource;
    use crate::surface::Surface;

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.synthetic.width = 16;
        config.synthetic.height = 12;
        config.synthetic.fps = 100;
        config.recording.timeslice_ms = 10;
        config.preview_ready_timeout_ms = 500;
        config
    }

    fn backend(config: &AppConfig) -> Arc<SyntheticBackend> {
        Arc::new(SyntheticBackend::new(config.synthetic.clone()))
    }

    #[tokio::test]
    async fn test_record_twice_and_take_photo() {
        let config = small_config();
        let backend = backend(&config);
        let session = CaptureSession::start(config, backend.clone()).await.unwrap();

        let status = session.status().await;
        assert!(status.preview_ready);
        assert!(status.stream_active);
        assert_eq!(status.tracks.len(), 2);
        assert_eq!(status.recording_state, RecordingState::Idle);

        assert_eq!(
            session.toggle_recording().await.unwrap(),
            RecordingState::Recording
        );
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(session.toggle_recording().await.unwrap(), RecordingState::Idle);
        let first = session.binder().playback().locator().unwrap();
        assert!(session.binder().playback().current_frame().is_some());

        session.toggle_recording().await.unwrap();
        session.toggle_recording().await.unwrap();
        let second = session.binder().playback().locator().unwrap();
        assert_ne!(first, second);
        assert!(!session.registry().contains(&first));

        let photo = match session.capture_photo().await.unwrap() {
            CaptureOutcome::Committed(photo) => photo,
            CaptureOutcome::Superseded { .. } => panic!("single capture superseded"),
        };
        assert_eq!((photo.width, photo.height), (16, 12));
        assert_eq!(session.binder().photo_display().locator(), Some(photo.locator));

        let status = session.status().await;
        assert_eq!(status.recordings, 2);
        assert_eq!(status.live_resources, 2);

        session.shutdown().await;
        assert!(!session.stream().is_active());
        assert_eq!(backend.stop_count(), 2);
        assert!(session.binder().preview().source().is_none());
    }

    #[tokio::test]
    async fn test_status_counts_finished_recordings() {
        let config = small_config();
        let session = CaptureSession::start(config.clone(), backend(&config))
            .await
            .unwrap();
        let mut events = session.subscribe().await;

        session.toggle_recording().await.unwrap();
        assert_eq!(session.status().await.recordings, 0);
        session.toggle_recording().await.unwrap();
        session.toggle_recording().await.unwrap();

        let status = session.status().await;
        assert_eq!(status.recording_state, RecordingState::Recording);
        assert_eq!(status.recordings, 1);
        assert_eq!(status.stream_acquired_at, session.stream().acquired_at());

        let mut ready = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RecordingEvent::ArtifactReady(artifact) = event {
                ready.push(artifact);
            }
        }
        assert_eq!(ready.len(), 1);
        assert!(ready[0].chunk_count >= 1);
        assert_eq!(session.binder().playback().locator(), Some(ready[0].locator.clone()));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_misuse_is_rejected_without_side_effects() {
        let config = small_config();
        let session = CaptureSession::start(config.clone(), backend(&config))
            .await
            .unwrap();

        assert!(matches!(
            session.stop_recording().await,
            Err(AppError::InvalidTransition(_))
        ));
        assert_eq!(session.recording_state().await, RecordingState::Idle);

        session.start_recording().await.unwrap();
        assert!(matches!(
            session.start_recording().await,
            Err(AppError::InvalidTransition(_))
        ));
        assert_eq!(session.recording_state().await, RecordingState::Recording);
        assert!(session.binder().playback().locator().is_none());

        session.shutdown().await;
        assert_eq!(session.recording_state().await, RecordingState::Idle);
        assert!(session.binder().playback().locator().is_none());
    }

    #[tokio::test]
    async fn test_missing_rear_camera_attaches_nothing() {
        let mut config = small_config();
        config.synthetic = SyntheticConfig {
            facing_modes: vec![FacingMode::User],
            ..config.synthetic
        };
        let backend = backend(&config);

        let result = CaptureSession::start(config, backend.clone()).await;
        assert!(matches!(result, Err(AppError::DeviceUnavailable(_))));
        assert_eq!(backend.open_count(), 1);
        assert_eq!(backend.stop_count(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces() {
        let mut config = small_config();
        config.synthetic.permission = SyntheticPermission::Denied;
        let backend = backend(&config);

        let result = CaptureSession::start(config, backend.clone()).await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
        assert_eq!(backend.open_count(), 1);
    }

    #[tokio::test]
    async fn test_audio_only_stream_cannot_record() {
        let mut config = small_config();
        config.capture = CaptureRequest {
            audio: true,
            video: VideoRequest::Enabled(false),
        };
        let session = CaptureSession::start(config.clone(), backend(&config))
            .await
            .unwrap();

        assert_eq!(session.toggle_recording().await.unwrap(), RecordingState::Idle);
        assert!(matches!(
            session.capture_photo().await,
            Err(AppError::NoFrameAvailable(_))
        ));
        assert!(!session.status().await.preview_ready);
    }

    #[test]
    fn test_backend_selection() {
        let config = AppConfig::default();
        assert_eq!(backend_for(&config).unwrap().name(), "synthetic");

        #[cfg(not(feature = "native"))]
        {
            let config = AppConfig {
                backend: BackendKind::Native,
                ..Default::default()
            };
            assert!(matches!(backend_for(&config), Err(AppError::Config(_))));
        }
    }
}
