//! Device stream manager
//!
//! Owns the single live stream for a capture request: acquires it from the
//! backend once, hands out shared handles, and stops the tracks on release.

use super::stream::MediaStream;
use super::traits::{CaptureBackend, CaptureRequest};
use crate::utils::error::{AppError, AppResult};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct ManagerState {
    /// Stream currently held
    current: Option<MediaStream>,

    /// Bumped on shutdown so in-flight acquisitions know not to adopt
    epoch: u64,
}

/// Acquires and releases the device stream
pub struct DeviceStreamManager {
    backend: Arc<dyn CaptureBackend>,
    state: Mutex<ManagerState>,
}

impl DeviceStreamManager {
    /// Create a manager on top of a capture backend
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Stream currently held, if any
    pub fn current(&self) -> Option<MediaStream> {
        self.state.lock().current.clone()
    }

    /// Acquire a live stream for the request
    ///
    /// Returns the held stream when it is still live. Failures are reported
    /// once here and never retried.
    pub async fn acquire(&self, request: &CaptureRequest) -> AppResult<MediaStream> {
        request.validate()?;

        let epoch = {
            let state = self.state.lock();
            if let Some(stream) = state.current.as_ref().filter(|s| s.is_active()) {
                tracing::debug!("Reusing live stream {}", stream.id());
                return Ok(stream.clone());
            }
            state.epoch
        };

        tracing::info!(
            "Requesting capture devices from {} backend (audio: {}, video: {})",
            self.backend.name(),
            request.wants_audio(),
            request.wants_video()
        );

        let devices = match self.backend.open(request).await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!("Device acquisition failed: {}", e);
                return Err(e);
            }
        };

        if devices.is_empty() {
            let e = AppError::DeviceUnavailable("backend returned no tracks".to_string());
            tracing::error!("Device acquisition failed: {}", e);
            return Err(e);
        }

        let stream = MediaStream::new(devices);

        let mut state = self.state.lock();
        if state.epoch != epoch {
            drop(state);
            let stopped = stream.stop_tracks();
            tracing::warn!(
                "Manager shut down during acquisition; released stream {} ({} tracks)",
                stream.id(),
                stopped
            );
            return Err(AppError::AcquisitionAborted(
                "released before acquisition resolved".to_string(),
            ));
        }

        if let Some(existing) = state.current.as_ref().filter(|s| s.is_active()) {
            // A concurrent acquire won the race; keep a single live stream.
            let existing = existing.clone();
            drop(state);
            stream.stop_tracks();
            tracing::debug!("Discarded duplicate stream, keeping {}", existing.id());
            return Ok(existing);
        }

        state.current = Some(stream.clone());
        tracing::info!(
            "Acquired stream {} with {} track(s)",
            stream.id(),
            stream.tracks().len()
        );
        Ok(stream)
    }

    /// Stop every track of the stream
    ///
    /// Releasing an already released stream is a no-op. Returns the number of
    /// tracks this call stopped.
    pub fn release(&self, stream: &MediaStream) -> usize {
        {
            let mut state = self.state.lock();
            if state.current.as_ref().is_some_and(|s| s.same_stream(stream)) {
                state.current = None;
            }
        }

        let stopped = stream.stop_tracks();
        if stopped > 0 {
            tracing::info!("Released stream {} ({} tracks stopped)", stream.id(), stopped);
        } else {
            tracing::debug!("Stream {} already released", stream.id());
        }
        stopped
    }

    /// Release the held stream and abort any acquisition still in flight
    pub fn shutdown(&self) {
        let current = {
            let mut state = self.state.lock();
            state.epoch += 1;
            state.current.take()
        };

        if let Some(stream) = current {
            self.release(&stream);
        }
    }
}

impl Drop for DeviceStreamManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
