//! Playback/preview binder
//!
//! Pushes the live stream into the preview surface and finished recordings
//! into the playback surface, releasing locators that get replaced.

use super::registry::{ResourceLocator, ResourceRegistry};
use super::video::{Attachment, Surface, SurfaceRole, SurfaceSource, VideoSurface};
use crate::capture::MediaStream;
use crate::recorder::RecordingArtifact;
use crate::utils::error::AppResult;
use std::sync::Arc;
use std::time::Duration;

const READY_POLL: Duration = Duration::from_millis(10);

pub struct Binder {
    preview: Arc<VideoSurface>,
    playback: Arc<VideoSurface>,
    photo: Arc<VideoSurface>,
    registry: Arc<ResourceRegistry>,
}

impl Binder {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            preview: Arc::new(VideoSurface::new(SurfaceRole::Preview, registry.clone())),
            playback: Arc::new(VideoSurface::new(SurfaceRole::Playback, registry.clone())),
            photo: Arc::new(VideoSurface::new(SurfaceRole::Photo, registry.clone())),
            registry,
        }
    }

    pub fn preview(&self) -> &Arc<VideoSurface> {
        &self.preview
    }

    pub fn playback(&self) -> &Arc<VideoSurface> {
        &self.playback
    }

    pub fn photo_display(&self) -> &Arc<VideoSurface> {
        &self.photo
    }

    /// Attach the live stream to the preview
    ///
    /// Returns false when the preview already shows this stream.
    pub fn attach_preview(&self, stream: &MediaStream) -> bool {
        match self.preview.attach_source(SurfaceSource::Stream(stream.clone())) {
            Attachment::Unchanged => {
                tracing::debug!("Preview already shows stream {}", stream.id());
                false
            }
            Attachment::Attached { .. } => {
                tracing::info!("Preview attached to stream {}", stream.id());
                true
            }
        }
    }

    /// Wait for the preview's first decodable frame
    pub async fn wait_preview_ready(&self, timeout: Duration) -> AppResult<()> {
        self.preview.wait_ready(READY_POLL, timeout).await
    }

    /// Show a finished recording, revoking the one it replaces
    pub fn show_recording(&self, artifact: &RecordingArtifact) {
        self.replace_locator(&self.playback, artifact.locator.clone());
    }

    /// Take the stream off the preview so it can be released
    pub fn detach_preview(&self) -> Option<MediaStream> {
        match self.preview.detach() {
            Some(SurfaceSource::Stream(stream)) => Some(stream),
            _ => None,
        }
    }

    fn replace_locator(&self, surface: &VideoSurface, locator: ResourceLocator) {
        match surface.attach_source(SurfaceSource::Locator(locator.clone())) {
            Attachment::Unchanged => {}
            Attachment::Attached { previous } => {
                if let Some(SurfaceSource::Locator(previous)) = previous {
                    self.registry.revoke(&previous);
                }
                tracing::info!("{} surface now shows {}", surface.role(), locator);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::synthetic::{SyntheticBackend, SyntheticConfig};
    use crate::capture::{CaptureBackend, CaptureRequest};
    use crate::recorder::RAW_FRAME_MIME;
    use chrono::Utc;
    use uuid::Uuid;

    fn artifact(registry: &ResourceRegistry, data: &[u8]) -> RecordingArtifact {
        let data = Arc::new(data.to_vec());
        let now = Utc::now();
        RecordingArtifact {
            id: Uuid::new_v4(),
            session_index: 0,
            mime_type: RAW_FRAME_MIME.to_string(),
            locator: registry.register(RAW_FRAME_MIME, data.clone()),
            chunk_count: 1,
            size_bytes: data.len(),
            data,
            started_at: now,
            ended_at: now,
            duration_ms: 0.0,
        }
    }

    #[tokio::test]
    async fn test_preview_attached_once() {
        let binder = Binder::new(Arc::new(ResourceRegistry::new()));
        let backend = SyntheticBackend::new(SyntheticConfig::default());
        let stream = MediaStream::new(
            backend
                .open(&CaptureRequest::environment_camera())
                .await
                .unwrap(),
        );

        assert!(binder.attach_preview(&stream));
        assert!(!binder.attach_preview(&stream));
        binder
            .wait_preview_ready(Duration::from_millis(100))
            .await
            .unwrap();
        assert!(binder.preview().is_ready());

        assert_eq!(binder.detach_preview(), Some(stream));
        assert!(binder.detach_preview().is_none());
    }

    #[test]
    fn test_new_recording_revokes_previous_locator() {
        let registry = Arc::new(ResourceRegistry::new());
        let binder = Binder::new(registry.clone());

        let first = artifact(&registry, b"one");
        let second = artifact(&registry, b"two");

        binder.show_recording(&first);
        binder.show_recording(&first);
        assert!(registry.contains(&first.locator));

        binder.show_recording(&second);
        assert!(!registry.contains(&first.locator));
        assert!(registry.contains(&second.locator));
        assert_eq!(binder.playback().locator(), Some(second.locator.clone()));
    }
}
