//! Recording state management
//!
//! Defines the recording state machine states, the live session and the
//! artifact a finished session turns into.

use super::chunk::{Chunk, ChunkSink};
use crate::surface::ResourceLocator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Current state of the recorder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Currently recording
    Recording,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "idle"),
            RecordingState::Recording => write!(f, "recording"),
        }
    }
}

/// One start→stop interval
///
/// Owns the chunk sequence for its interval; finalizing consumes it.
#[derive(Debug)]
pub struct RecordingSession {
    /// Session index (0, 1, 2, ...)
    pub index: usize,

    /// Tag carried by every chunk delivered for this session
    pub generation: u64,

    pub started_at: DateTime<Utc>,

    pub(crate) chunks: Vec<Chunk>,

    pub(crate) sink: ChunkSink,
}

impl RecordingSession {
    pub(crate) fn new(index: usize, sink: ChunkSink) -> Self {
        Self {
            index,
            generation: sink.generation(),
            started_at: Utc::now(),
            chunks: Vec::new(),
            sink,
        }
    }

    pub(crate) fn push(&mut self, timestamp_ms: f64, data: Vec<u8>) {
        let sequence = self.chunks.len() as u64;
        self.chunks.push(Chunk {
            sequence,
            timestamp_ms,
            data,
        });
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn elapsed_ms(&self) -> f64 {
        (Utc::now() - self.started_at).num_milliseconds() as f64
    }
}

/// Finalized, immutable recording
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingArtifact {
    pub id: Uuid,

    /// Index of the session that produced it
    pub session_index: usize,

    pub mime_type: String,

    /// Chunk payloads concatenated in delivery order
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,

    pub chunk_count: usize,

    pub size_bytes: usize,

    pub started_at: DateTime<Utc>,

    pub ended_at: DateTime<Utc>,

    pub duration_ms: f64,

    pub locator: ResourceLocator,
}
