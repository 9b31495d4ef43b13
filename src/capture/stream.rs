//! Live media stream handle
//!
//! A `MediaStream` is a cheap, cloneable handle to the tracks one acquisition
//! opened. Clones share identity; only the stream manager stops the tracks.

use super::traits::{DeviceTrack, FrameSource, TrackKind, TrackSettings, VideoFrame};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// One live track owned by a stream
pub struct MediaTrack {
    id: Uuid,
    device: Box<dyn DeviceTrack>,
    stopped: AtomicBool,
}

impl MediaTrack {
    fn new(device: Box<dyn DeviceTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.device.kind()
    }

    pub fn label(&self) -> &str {
        self.device.label()
    }

    pub fn settings(&self) -> TrackSettings {
        self.device.settings()
    }

    pub fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Latest frame, or `None` once the track has been stopped
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        if !self.is_live() {
            return None;
        }
        self.device.latest_frame()
    }

    /// Stop the device; returns false if it was already stopped
    fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.device.stop();
        tracing::debug!("Stopped {} track '{}'", self.kind(), self.label());
        true
    }
}

struct StreamInner {
    id: Uuid,
    tracks: Vec<MediaTrack>,
    acquired_at: DateTime<Utc>,
}

impl StreamInner {
    fn stop_tracks(&self) -> usize {
        self.tracks.iter().filter(|track| track.stop()).count()
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        let leaked = self.stop_tracks();
        if leaked > 0 {
            tracing::warn!(
                "Stream {} dropped with {} live track(s); stopped them",
                self.id,
                leaked
            );
        }
    }
}

/// Handle to the tracks of one acquisition
#[derive(Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    pub(crate) fn new(devices: Vec<Box<dyn DeviceTrack>>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4(),
                tracks: devices.into_iter().map(MediaTrack::new).collect(),
                acquired_at: Utc::now(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.inner.acquired_at
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &MediaTrack> {
        self.inner.tracks.iter().filter(move |t| t.kind() == kind)
    }

    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.tracks_of(TrackKind::Video).next()
    }

    /// A stream is active while any of its tracks is live
    pub fn is_active(&self) -> bool {
        self.inner.tracks.iter().any(MediaTrack::is_live)
    }

    pub fn same_stream(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stop every track; already-stopped tracks are skipped
    ///
    /// Returns the number of tracks this call actually stopped.
    pub(crate) fn stop_tracks(&self) -> usize {
        self.inner.stop_tracks()
    }
}

impl FrameSource for MediaStream {
    fn current_frame(&self) -> Option<VideoFrame> {
        self.video_track().and_then(MediaTrack::latest_frame)
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.same_stream(other)
    }
}

impl Eq for MediaStream {}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.inner.id)
            .field("tracks", &self.inner.tracks.len())
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingTrack {
        kind: TrackKind,
        stops: Arc<AtomicUsize>,
    }

    impl DeviceTrack for CountingTrack {
        fn kind(&self) -> TrackKind {
            self.kind
        }

        fn label(&self) -> &str {
            "counting"
        }

        fn settings(&self) -> TrackSettings {
            TrackSettings::default()
        }

        fn latest_frame(&self) -> Option<VideoFrame> {
            match self.kind {
                TrackKind::Video => Some(VideoFrame::new(vec![0; 4], 1, 1, 0.0)),
                TrackKind::Audio => None,
            }
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stream_with_counter() -> (MediaStream, Arc<AtomicUsize>) {
        let stops = Arc::new(AtomicUsize::new(0));
        let tracks: Vec<Box<dyn DeviceTrack>> = vec![
            Box::new(CountingTrack {
                kind: TrackKind::Audio,
                stops: stops.clone(),
            }),
            Box::new(CountingTrack {
                kind: TrackKind::Video,
                stops: stops.clone(),
            }),
        ];
        (MediaStream::new(tracks), stops)
    }

    #[test]
    fn test_stop_tracks_once() {
        let (stream, stops) = stream_with_counter();
        assert!(stream.is_active());
        assert!(stream.current_frame().is_some());

        assert_eq!(stream.stop_tracks(), 2);
        assert_eq!(stream.stop_tracks(), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 2);
        assert!(!stream.is_active());
        assert!(stream.current_frame().is_none());
    }

    #[test]
    fn test_clones_share_identity() {
        let (stream, _) = stream_with_counter();
        let (other, _) = stream_with_counter();
        let clone = stream.clone();

        assert_eq!(stream, clone);
        assert_ne!(stream, other);

        clone.stop_tracks();
        assert!(!stream.is_active());
    }

    #[test]
    fn test_dropping_last_handle_stops_live_tracks() {
        let (stream, stops) = stream_with_counter();
        drop(stream);
        assert_eq!(stops.load(Ordering::SeqCst), 2);
    }
}
