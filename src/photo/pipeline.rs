//! Still-capture pipeline
//!
//! `capture` copies the current frame synchronously, then encodes it on a
//! blocking worker. Results are committed last-writer-wins by request order:
//! an older encode that finishes late never replaces a newer photo.

use super::encoding::ImageEncoder;
use super::raster::Raster;
use crate::capture::FrameSource;
use crate::surface::{ResourceLocator, ResourceRegistry, Surface, SurfaceSource};
use crate::utils::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Encoded still, referenced by its locator
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoArtifact {
    pub id: Uuid,

    /// Request order of the capture that produced it
    pub sequence: u64,

    pub width: u32,

    pub height: u32,

    pub mime_type: String,

    #[serde(skip)]
    pub data: Arc<Vec<u8>>,

    pub captured_at: DateTime<Utc>,

    pub locator: ResourceLocator,
}

/// How a finished capture ended
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Became the current photo
    Committed(PhotoArtifact),
    /// A later request already committed; this result was dropped
    Superseded { sequence: u64 },
}

/// In-flight capture
pub struct CaptureTicket {
    sequence: u64,
    handle: JoinHandle<AppResult<CaptureOutcome>>,
}

impl CaptureTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wait for the encode to finish
    pub async fn wait(self) -> AppResult<CaptureOutcome> {
        self.handle
            .await
            .map_err(|e| AppError::EncodeFailure(format!("encode task failed: {e}")))?
    }
}

#[derive(Default)]
struct PipelineState {
    /// Last sequence handed out
    issued: u64,
    /// Sequence of the current photo
    committed: u64,
    current: Option<PhotoArtifact>,
}

/// Everything a capture task needs once it leaves the caller
struct CommitTarget {
    state: Arc<Mutex<PipelineState>>,
    registry: Arc<ResourceRegistry>,
    display: Option<Arc<dyn Surface>>,
}

impl CommitTarget {
    fn commit(&self, sequence: u64, mime_type: &str, raster_size: (u32, u32), data: Vec<u8>) -> CaptureOutcome {
        let mut state = self.state.lock();
        if sequence <= state.committed {
            tracing::debug!(
                "Photo {} superseded by {}; discarding result",
                sequence,
                state.committed
            );
            return CaptureOutcome::Superseded { sequence };
        }

        let data = Arc::new(data);
        let locator = self.registry.register(mime_type, data.clone());
        let artifact = PhotoArtifact {
            id: Uuid::new_v4(),
            sequence,
            width: raster_size.0,
            height: raster_size.1,
            mime_type: mime_type.to_string(),
            data,
            captured_at: Utc::now(),
            locator: locator.clone(),
        };

        if let Some(previous) = state.current.replace(artifact.clone()) {
            self.registry.revoke(&previous.locator);
        }
        state.committed = sequence;

        if let Some(display) = &self.display {
            display.attach_source(SurfaceSource::Locator(locator));
        }

        tracing::info!(
            "Photo {} ready: {}x{} at {}",
            sequence,
            artifact.width,
            artifact.height,
            artifact.locator
        );
        CaptureOutcome::Committed(artifact)
    }
}

/// Grabs, rasterizes and encodes stills
pub struct PhotoPipeline {
    encoder: Arc<dyn ImageEncoder>,
    registry: Arc<ResourceRegistry>,
    display: Option<Arc<dyn Surface>>,
    state: Arc<Mutex<PipelineState>>,
}

impl PhotoPipeline {
    pub fn new(encoder: Arc<dyn ImageEncoder>, registry: Arc<ResourceRegistry>) -> Self {
        Self {
            encoder,
            registry,
            display: None,
            state: Arc::new(Mutex::new(PipelineState::default())),
        }
    }

    /// Surface the current photo is pushed into
    pub fn with_display(mut self, display: Arc<dyn Surface>) -> Self {
        self.display = Some(display);
        self
    }

    /// Current photo, if any capture has committed
    pub fn current(&self) -> Option<PhotoArtifact> {
        self.state.lock().current.clone()
    }

    /// Capture the frame the source is presenting right now
    ///
    /// The pixels are copied before this returns; the encode finishes in the
    /// background and is observed through the ticket.
    pub fn capture(&self, source: &dyn FrameSource) -> AppResult<CaptureTicket> {
        let frame = source.current_frame().ok_or_else(|| {
            AppError::NoFrameAvailable("source is not presenting a frame".to_string())
        })?;
        let raster = Raster::from_frame(&frame)?;

        let sequence = {
            let mut state = self.state.lock();
            state.issued += 1;
            state.issued
        };
        tracing::debug!(
            "Photo {} requested ({}x{})",
            sequence,
            raster.width(),
            raster.height()
        );

        let encoder = self.encoder.clone();
        let target = CommitTarget {
            state: self.state.clone(),
            registry: self.registry.clone(),
            display: self.display.clone(),
        };

        let handle = tokio::spawn(async move {
            let size = (raster.width(), raster.height());
            let mime_type = encoder.mime_type();
            let encoded = tokio::task::spawn_blocking(move || encoder.encode(&raster))
                .await
                .map_err(|e| AppError::EncodeFailure(format!("encode task failed: {e}")))
                .and_then(|result| result);

            match encoded {
                Ok(data) => Ok(target.commit(sequence, mime_type, size, data)),
                Err(e) => {
                    tracing::error!("Photo {} failed: {}", sequence, e);
                    Err(e)
                }
            }
        });

        Ok(CaptureTicket { sequence, handle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::VideoFrame;
    use crate::config::PhotoCompression;
    use crate::photo::{decode_png, PngEncoder};
    use crate::surface::{SurfaceRole, VideoSurface};
    use std::time::Duration;

    struct StillSource(Option<VideoFrame>);

    impl StillSource {
        fn sized(width: u32, height: u32) -> Self {
            Self(Some(VideoFrame::new(
                vec![128; VideoFrame::expected_len(width, height)],
                width,
                height,
                0.0,
            )))
        }
    }

    impl FrameSource for StillSource {
        fn current_frame(&self) -> Option<VideoFrame> {
            self.0.clone()
        }
    }

    /// Slow for 8px wide rasters, fails for 13px wide ones
    struct ScriptedEncoder;

    impl ImageEncoder for ScriptedEncoder {
        fn mime_type(&self) -> &'static str {
            "image/x-test"
        }

        fn encode(&self, raster: &Raster) -> AppResult<Vec<u8>> {
            match raster.width() {
                8 => {
                    std::thread::sleep(Duration::from_millis(100));
                    Ok(b"slow".to_vec())
                }
                13 => Err(AppError::EncodeFailure("scripted failure".to_string())),
                _ => Ok(b"fast".to_vec()),
            }
        }
    }

    fn committed(outcome: CaptureOutcome) -> PhotoArtifact {
        match outcome {
            CaptureOutcome::Committed(artifact) => artifact,
            CaptureOutcome::Superseded { sequence } => panic!("photo {sequence} superseded"),
        }
    }

    #[tokio::test]
    async fn test_capture_encodes_png_and_updates_display() {
        let registry = Arc::new(ResourceRegistry::new());
        let display = Arc::new(VideoSurface::new(SurfaceRole::Photo, registry.clone()));
        let pipeline = PhotoPipeline::new(
            Arc::new(PngEncoder::new(PhotoCompression::Fast)),
            registry.clone(),
        )
        .with_display(display.clone());

        let ticket = pipeline.capture(&StillSource::sized(6, 4)).unwrap();
        let photo = committed(ticket.wait().await.unwrap());

        assert_eq!((photo.width, photo.height), (6, 4));
        assert_eq!(photo.mime_type, "image/png");
        let decoded = decode_png(&photo.data).unwrap();
        assert_eq!((decoded.width, decoded.height), (6, 4));

        assert_eq!(display.locator(), Some(photo.locator.clone()));
        assert_eq!(display.current_frame().unwrap().width, 6);
        assert_eq!(pipeline.current().unwrap().id, photo.id);
    }

    #[tokio::test]
    async fn test_empty_frame_keeps_previous_photo() {
        let registry = Arc::new(ResourceRegistry::new());
        let pipeline = PhotoPipeline::new(Arc::new(ScriptedEncoder), registry.clone());

        let first = committed(
            pipeline
                .capture(&StillSource::sized(2, 2))
                .unwrap()
                .wait()
                .await
                .unwrap(),
        );

        let zero = StillSource(Some(VideoFrame::new(Vec::new(), 0, 480, 0.0)));
        assert!(matches!(
            pipeline.capture(&zero),
            Err(AppError::NoFrameAvailable(_))
        ));
        assert!(matches!(
            pipeline.capture(&StillSource(None)),
            Err(AppError::NoFrameAvailable(_))
        ));

        assert_eq!(pipeline.current().unwrap().id, first.id);
        assert!(registry.contains(&first.locator));
    }

    #[tokio::test]
    async fn test_encode_failure_keeps_previous_photo() {
        let registry = Arc::new(ResourceRegistry::new());
        let pipeline = PhotoPipeline::new(Arc::new(ScriptedEncoder), registry.clone());

        let first = committed(
            pipeline
                .capture(&StillSource::sized(2, 2))
                .unwrap()
                .wait()
                .await
                .unwrap(),
        );

        let result = pipeline
            .capture(&StillSource::sized(13, 1))
            .unwrap()
            .wait()
            .await;
        assert!(matches!(result, Err(AppError::EncodeFailure(_))));
        assert_eq!(pipeline.current().unwrap().id, first.id);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_later_request_wins_over_slower_earlier_one() {
        let registry = Arc::new(ResourceRegistry::new());
        let pipeline = PhotoPipeline::new(Arc::new(ScriptedEncoder), registry.clone());

        let slow = pipeline.capture(&StillSource::sized(8, 1)).unwrap();
        let fast = pipeline.capture(&StillSource::sized(4, 1)).unwrap();
        assert!(slow.sequence() < fast.sequence());

        let fast_photo = committed(fast.wait().await.unwrap());
        let slow_outcome = slow.wait().await.unwrap();

        assert!(matches!(
            slow_outcome,
            CaptureOutcome::Superseded { sequence: 1 }
        ));
        let current = pipeline.current().unwrap();
        assert_eq!(current.id, fast_photo.id);
        assert_eq!(current.sequence, 2);
        assert_eq!(current.data.as_slice(), b"fast");
        assert_eq!(registry.len(), 1);
    }
}
