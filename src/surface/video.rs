//! Presentation surfaces
//!
//! Preview, playback and the photo display are all the same capability: a
//! surface a source is attached to. The preview additionally signals when its
//! first frame is decodable.

use super::registry::{ResourceLocator, ResourceRegistry};
use crate::capture::{FrameSource, MediaStream, VideoFrame};
use crate::photo::decode_png;
use crate::recorder::{decode_frame_records, RAW_FRAME_MIME};
use crate::utils::error::{AppError, AppResult};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// What a surface is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    /// Live camera view
    Preview,
    /// Finished recording
    Playback,
    /// Last captured still
    Photo,
}

impl fmt::Display for SurfaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceRole::Preview => write!(f, "preview"),
            SurfaceRole::Playback => write!(f, "playback"),
            SurfaceRole::Photo => write!(f, "photo"),
        }
    }
}

/// Something a surface can present
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceSource {
    /// A live stream
    Stream(MediaStream),
    /// A finalized artifact
    Locator(ResourceLocator),
}

/// Result of attaching a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// The surface already presented this source
    Unchanged,
    /// The source replaced whatever was attached before
    Attached { previous: Option<SurfaceSource> },
}

/// A consumer the core pushes sources into
pub trait Surface: FrameSource {
    fn role(&self) -> SurfaceRole;

    fn attach_source(&self, source: SurfaceSource) -> Attachment;

    fn source(&self) -> Option<SurfaceSource>;

    fn detach(&self) -> Option<SurfaceSource>;
}

/// In-process surface that decodes what is attached to it on demand
pub struct VideoSurface {
    role: SurfaceRole,
    source: RwLock<Option<SurfaceSource>>,
    registry: Arc<ResourceRegistry>,
    ready_tx: watch::Sender<bool>,
}

impl VideoSurface {
    pub fn new(role: SurfaceRole, registry: Arc<ResourceRegistry>) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            role,
            source: RwLock::new(None),
            registry,
            ready_tx,
        }
    }

    /// Whether the first decodable frame has been seen
    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// Locator currently attached, if the source is an artifact
    pub fn locator(&self) -> Option<ResourceLocator> {
        match self.source() {
            Some(SurfaceSource::Locator(locator)) => Some(locator),
            _ => None,
        }
    }

    /// Wait until the attached source presents a decodable frame
    ///
    /// Readiness is signalled once; later calls return immediately.
    pub async fn wait_ready(&self, poll: Duration, timeout: Duration) -> AppResult<()> {
        if self.is_ready() {
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.current_frame().is_some_and(|f| f.has_extent()) {
                if !self.ready_tx.send_replace(true) {
                    tracing::info!("{} surface ready", self.role);
                }
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::NoFrameAvailable(format!(
                    "{} surface showed no frame within {}ms",
                    self.role,
                    timeout.as_millis()
                )));
            }

            tokio::time::sleep(poll).await;
        }
    }

    fn frame_from_locator(&self, locator: &ResourceLocator) -> Option<VideoFrame> {
        let resource = self.registry.resolve(locator)?;
        match resource.mime_type.as_str() {
            RAW_FRAME_MIME => match decode_frame_records(&resource.data) {
                Ok(frames) => frames.into_iter().next(),
                Err(e) => {
                    tracing::warn!("Cannot decode {}: {}", locator, e);
                    None
                }
            },
            "image/png" => match decode_png(&resource.data) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::warn!("Cannot decode {}: {}", locator, e);
                    None
                }
            },
            other => {
                tracing::debug!("{} surface cannot decode {}", self.role, other);
                None
            }
        }
    }
}

impl FrameSource for VideoSurface {
    /// Live frame for streams, first frame (poster) for artifacts
    fn current_frame(&self) -> Option<VideoFrame> {
        match self.source() {
            Some(SurfaceSource::Stream(stream)) => stream.current_frame(),
            Some(SurfaceSource::Locator(locator)) => self.frame_from_locator(&locator),
            None => None,
        }
    }
}

impl Surface for VideoSurface {
    fn role(&self) -> SurfaceRole {
        self.role
    }

    fn attach_source(&self, source: SurfaceSource) -> Attachment {
        let mut current = self.source.write();
        if current.as_ref() == Some(&source) {
            return Attachment::Unchanged;
        }
        tracing::debug!("Attached {:?} to {} surface", source, self.role);
        Attachment::Attached {
            previous: current.replace(source),
        }
    }

    fn source(&self) -> Option<SurfaceSource> {
        self.source.read().clone()
    }

    fn detach(&self) -> Option<SurfaceSource> {
        self.source.write().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::synthetic::{SyntheticBackend, SyntheticConfig};
    use crate::capture::{CaptureBackend, CaptureRequest};
    use crate::recorder::encode_frame_record;

    async fn stream() -> MediaStream {
        let backend = SyntheticBackend::new(SyntheticConfig {
            width: 4,
            height: 4,
            ..Default::default()
        });
        MediaStream::new(
            backend
                .open(&CaptureRequest::environment_camera())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_attach_same_stream_is_unchanged() {
        let surface = VideoSurface::new(SurfaceRole::Preview, Arc::new(ResourceRegistry::new()));
        let stream = stream().await;

        assert_eq!(
            surface.attach_source(SurfaceSource::Stream(stream.clone())),
            Attachment::Attached { previous: None }
        );
        assert_eq!(
            surface.attach_source(SurfaceSource::Stream(stream.clone())),
            Attachment::Unchanged
        );
        assert_eq!(surface.current_frame().unwrap().width, 4);
    }

    #[tokio::test]
    async fn test_ready_signalled_once() {
        let surface = VideoSurface::new(SurfaceRole::Preview, Arc::new(ResourceRegistry::new()));
        let mut ready = surface.subscribe_ready();
        assert!(!surface.is_ready());

        surface.attach_source(SurfaceSource::Stream(stream().await));
        surface
            .wait_ready(Duration::from_millis(1), Duration::from_millis(100))
            .await
            .unwrap();

        assert!(surface.is_ready());
        assert!(ready.has_changed().unwrap());
        ready.borrow_and_update();
        surface
            .wait_ready(Duration::from_millis(1), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(!ready.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_ready_times_out_without_frames() {
        let surface = VideoSurface::new(SurfaceRole::Preview, Arc::new(ResourceRegistry::new()));
        let result = surface
            .wait_ready(Duration::from_millis(1), Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(AppError::NoFrameAvailable(_))));
        assert!(!surface.is_ready());
    }

    #[test]
    fn test_playback_poster_frame() {
        let registry = Arc::new(ResourceRegistry::new());
        let surface = VideoSurface::new(SurfaceRole::Playback, registry.clone());

        let frame = VideoFrame::new(vec![9; 8], 2, 1, 0.0);
        let locator = registry.register(RAW_FRAME_MIME, Arc::new(encode_frame_record(&frame)));
        surface.attach_source(SurfaceSource::Locator(locator.clone()));

        let poster = surface.current_frame().unwrap();
        assert_eq!((poster.width, poster.height), (2, 1));
        assert_eq!(surface.locator(), Some(locator.clone()));

        registry.revoke(&locator);
        assert!(surface.current_frame().is_none());
    }
}
