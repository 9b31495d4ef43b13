//! Recorder state machine
//!
//! Wraps the bound stream in recording sessions. `bind`, `start` and `stop`
//! are the only ways the state or the chunk sequence change.

use super::chunk::{ChunkMessage, ChunkProducer, ChunkSink, ProducerHandle};
use super::state::{RecordingArtifact, RecordingSession, RecordingState};
use crate::capture::MediaStream;
use crate::config::RecordingSettings;
use crate::surface::{ResourceLocator, ResourceRegistry};
use crate::utils::error::{AppError, AppResult};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Events emitted by the recorder
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Recording started
    Started { session_index: usize },
    /// Recording stopped
    Stopped { session_index: usize },
    /// A finalized artifact is ready for playback
    ArtifactReady(RecordingArtifact),
}

/// Record/stop state machine bound to one stream
pub struct Recorder {
    /// Current recording state
    state: RecordingState,

    /// Stream chunks are taken from
    stream: Option<MediaStream>,

    /// Active session, present only while recording
    session: Option<RecordingSession>,

    producer: Arc<dyn ChunkProducer>,

    producer_handle: Option<ProducerHandle>,

    chunk_tx: mpsc::UnboundedSender<ChunkMessage>,

    chunk_rx: mpsc::UnboundedReceiver<ChunkMessage>,

    /// Generation of the most recent session
    generation: u64,

    /// Number of sessions started so far
    session_count: usize,

    /// Number of sessions finalized into artifacts
    artifact_count: usize,

    timeslice: Duration,

    /// Container of the producer's chunks, stamped on artifacts
    mime_type: String,

    registry: Arc<ResourceRegistry>,

    /// Locator of the most recent artifact
    last_locator: Option<ResourceLocator>,

    /// Event broadcaster
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl Recorder {
    /// Create an idle recorder
    pub fn new(
        producer: Arc<dyn ChunkProducer>,
        settings: &RecordingSettings,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(100);
        let mime_type = producer.mime_type().to_string();
        Self {
            state: RecordingState::Idle,
            stream: None,
            session: None,
            producer,
            producer_handle: None,
            chunk_tx,
            chunk_rx,
            generation: 0,
            session_count: 0,
            artifact_count: 0,
            timeslice: Duration::from_millis(settings.timeslice_ms.max(1)),
            mime_type,
            registry,
            last_locator: None,
            event_tx,
        }
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub fn bound_stream(&self) -> Option<&MediaStream> {
        self.stream.as_ref()
    }

    /// Number of sessions started so far
    pub fn session_count(&self) -> usize {
        self.session_count
    }

    /// Number of completed start/stop cycles
    pub fn artifact_count(&self) -> usize {
        self.artifact_count
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Delivery handle of the active session
    pub fn sink(&self) -> Option<ChunkSink> {
        self.session.as_ref().map(|s| s.sink.clone())
    }

    /// Elapsed time of the active session in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.session
            .as_ref()
            .map(RecordingSession::elapsed_ms)
            .unwrap_or(0.0)
    }

    /// Chunks accumulated so far in the active session
    pub fn pending_chunks(&mut self) -> usize {
        self.drain_pending();
        self.session
            .as_ref()
            .map(RecordingSession::chunk_count)
            .unwrap_or(0)
    }

    fn reject(&self, reason: &str) -> AppError {
        tracing::warn!("Rejected recorder transition in {} state: {}", self.state, reason);
        AppError::InvalidTransition(reason.to_string())
    }

    /// Attach the stream recordings are taken from
    pub fn bind(&mut self, stream: MediaStream) -> AppResult<()> {
        if self.stream.as_ref().is_some_and(|s| s.same_stream(&stream)) {
            tracing::debug!("Stream {} already bound", stream.id());
            return Ok(());
        }

        if self.is_recording() {
            return Err(self.reject("cannot rebind to a different stream while recording"));
        }

        if !stream.is_active() {
            return Err(self.reject("cannot bind a released stream"));
        }

        tracing::info!("Recorder bound to stream {}", stream.id());
        self.stream = Some(stream);
        Ok(())
    }

    /// Detach the stream so it can be released
    pub fn unbind(&mut self) -> AppResult<Option<MediaStream>> {
        if self.is_recording() {
            return Err(self.reject("cannot unbind while recording"));
        }
        Ok(self.stream.take())
    }

    /// Start recording
    pub fn start(&mut self) -> AppResult<()> {
        if self.is_recording() {
            return Err(self.reject("start() while already recording"));
        }

        let Some(stream) = self.stream.clone() else {
            return Err(self.reject("start() with no bound stream"));
        };

        if !stream.is_active() {
            return Err(self.reject("bound stream has been released"));
        }

        // Nothing left over from earlier intervals may reach the new session
        self.drain_pending();

        self.generation += 1;
        let sink = ChunkSink::new(self.generation, self.chunk_tx.clone());
        let session = RecordingSession::new(self.session_count, sink.clone());
        let session_index = session.index;
        self.session_count += 1;

        self.producer_handle = Some(self.producer.start(stream, sink, self.timeslice));
        self.session = Some(session);
        self.state = RecordingState::Recording;
        let _ = self.event_tx.send(RecordingEvent::Started { session_index });

        tracing::info!(
            "Recording session {} started (timeslice {}ms)",
            session_index,
            self.timeslice.as_millis()
        );
        Ok(())
    }

    /// Stop recording and finalize the session into an artifact
    pub async fn stop(&mut self) -> AppResult<RecordingArtifact> {
        if !self.is_recording() {
            return Err(self.reject("stop() while idle"));
        }

        self.close_interval().await;

        // Snapshot and clear in one step: the session leaves the recorder here.
        let Some(session) = self.session.take() else {
            self.state = RecordingState::Idle;
            return Err(AppError::InvalidTransition(
                "recording state without a session".to_string(),
            ));
        };
        self.state = RecordingState::Idle;

        let session_index = session.index;
        let artifact = self.finalize(session);
        let _ = self.event_tx.send(RecordingEvent::Stopped { session_index });
        let _ = self
            .event_tx
            .send(RecordingEvent::ArtifactReady(artifact.clone()));

        tracing::info!(
            "Recording session {} stopped: {} chunks, {} bytes, {:.0}ms",
            session_index,
            artifact.chunk_count,
            artifact.size_bytes,
            artifact.duration_ms
        );
        Ok(artifact)
    }

    /// Drop the active session without producing an artifact
    ///
    /// Returns the number of chunks discarded. A no-op while idle.
    pub async fn abort(&mut self) -> usize {
        if !self.is_recording() {
            return 0;
        }

        self.close_interval().await;

        let discarded = self
            .session
            .take()
            .map(|s| s.chunk_count())
            .unwrap_or(0);
        self.state = RecordingState::Idle;
        tracing::info!("Recording aborted, {} chunks discarded", discarded);
        discarded
    }

    /// End chunk production for the active interval
    ///
    /// The producer finishes first so its final sample still lands in the
    /// session; the sink closes after that and the queue is drained.
    async fn close_interval(&mut self) {
        if let Some(producer) = self.producer_handle.take() {
            producer.finish().await;
        }
        if let Some(session) = &self.session {
            session.sink.close();
        }
        self.drain_pending();
    }

    /// Move delivered chunks into the session they belong to
    fn drain_pending(&mut self) {
        while let Ok(message) = self.chunk_rx.try_recv() {
            match self.session.as_mut() {
                Some(session) if session.generation == message.generation => {
                    session.push(message.timestamp_ms, message.data);
                }
                _ => tracing::debug!(
                    "Discarded {} byte chunk from stale interval {}",
                    message.data.len(),
                    message.generation
                ),
            }
        }
    }

    fn finalize(&mut self, session: RecordingSession) -> RecordingArtifact {
        let ended_at = Utc::now();
        let chunk_count = session.chunks.len();
        let size_bytes: usize = session.chunks.iter().map(|c| c.data.len()).sum();

        let mut data = Vec::with_capacity(size_bytes);
        for chunk in session.chunks {
            data.extend_from_slice(&chunk.data);
        }
        let data = Arc::new(data);

        let locator = self.registry.register(&self.mime_type, data.clone());
        self.artifact_count += 1;
        if let Some(previous) = self.last_locator.replace(locator.clone()) {
            self.registry.revoke(&previous);
        }

        RecordingArtifact {
            id: Uuid::new_v4(),
            session_index: session.index,
            mime_type: self.mime_type.clone(),
            data,
            chunk_count,
            size_bytes,
            started_at: session.started_at,
            ended_at,
            duration_ms: (ended_at - session.started_at).num_milliseconds() as f64,
            locator,
        }
    }
}
