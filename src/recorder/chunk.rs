//! Recording chunks and their producers
//!
//! A producer samples the bound stream on the recorder's timeslice and pushes
//! encoded chunks through a `ChunkSink`. Sinks belong to exactly one recording
//! interval; anything delivered after the interval closes is dropped.

use crate::capture::{FrameSource, MediaStream, VideoFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Container produced by `FrameChunkProducer`
pub const RAW_FRAME_MIME: &str = "video/x-raw-rgba";

const FRAME_MAGIC: [u8; 4] = *b"OCFR";
const FRAME_HEADER_LEN: usize = 24;

/// A unit of recording data, in the order the recorder received it
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position within its recording session
    pub sequence: u64,

    /// Milliseconds since the session started
    pub timestamp_ms: f64,

    pub data: Vec<u8>,
}

/// Raw delivery, tagged with the generation of the interval it belongs to
#[derive(Debug)]
pub(crate) struct ChunkMessage {
    pub generation: u64,
    pub timestamp_ms: f64,
    pub data: Vec<u8>,
}

/// Delivery handle for one recording interval
#[derive(Debug, Clone)]
pub struct ChunkSink {
    generation: u64,
    active: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<ChunkMessage>,
    started: Instant,
}

impl ChunkSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<ChunkMessage>) -> Self {
        Self {
            generation,
            active: Arc::new(AtomicBool::new(true)),
            tx,
            started: Instant::now(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Hand a chunk to the recorder
    ///
    /// Returns false once the interval has closed.
    pub fn deliver(&self, data: Vec<u8>) -> bool {
        if !self.is_active() {
            tracing::debug!(
                "Dropped {} byte chunk for closed interval {}",
                data.len(),
                self.generation
            );
            return false;
        }

        let message = ChunkMessage {
            generation: self.generation,
            timestamp_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            data,
        };
        self.tx.send(message).is_ok()
    }

    pub(crate) fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Running producer for one interval
pub struct ProducerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ProducerHandle {
    pub fn spawned(stop_tx: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Handle for producers that deliver from outside a task
    pub fn detached() -> Self {
        Self {
            stop_tx: None,
            task: None,
        }
    }

    /// Signal the producer and wait until it has delivered its last chunk
    pub async fn finish(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Chunk producer ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Source of chunks for a recording interval
pub trait ChunkProducer: Send + Sync {
    /// Mime type of the container the chunks concatenate into
    fn mime_type(&self) -> &str;

    fn start(&self, stream: MediaStream, sink: ChunkSink, timeslice: Duration) -> ProducerHandle;
}

/// Samples the stream's video track once per timeslice
///
/// Each new frame becomes one raw-frame record. A final sample is taken when
/// the interval stops, so short recordings still carry data.
#[derive(Debug, Default)]
pub struct FrameChunkProducer;

impl FrameChunkProducer {
    fn emit(stream: &MediaStream, sink: &ChunkSink, last_timestamp: &mut Option<f64>) {
        let Some(frame) = stream.current_frame().filter(VideoFrame::has_extent) else {
            return;
        };
        if *last_timestamp == Some(frame.timestamp_ms) {
            return;
        }
        *last_timestamp = Some(frame.timestamp_ms);
        sink.deliver(encode_frame_record(&frame));
    }
}

impl ChunkProducer for FrameChunkProducer {
    fn mime_type(&self) -> &str {
        RAW_FRAME_MIME
    }

    fn start(&self, stream: MediaStream, sink: ChunkSink, timeslice: Duration) -> ProducerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(timeslice);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_timestamp = None;
            let mut ticks: u64 = 0;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        ticks += 1;
                        Self::emit(&stream, &sink, &mut last_timestamp);
                    }
                }
            }

            Self::emit(&stream, &sink, &mut last_timestamp);
            tracing::debug!(
                "Frame producer for interval {} stopped after {} ticks",
                sink.generation(),
                ticks
            );
        });

        ProducerHandle::spawned(stop_tx, task)
    }
}

/// Errors reading a raw-frame container
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameRecordError {
    #[error("Bad record magic at offset {0}")]
    BadMagic(usize),

    #[error("Truncated record at offset {0}")]
    Truncated(usize),

    #[error("Payload size mismatch at offset {0}")]
    SizeMismatch(usize),
}

/// Serialize a frame as one self-describing record
///
/// Layout (little endian): magic, width u32, height u32, timestamp f64,
/// payload length u32, RGBA payload.
pub fn encode_frame_record(frame: &VideoFrame) -> Vec<u8> {
    let mut record = Vec::with_capacity(FRAME_HEADER_LEN + frame.data.len());
    record.extend_from_slice(&FRAME_MAGIC);
    record.extend_from_slice(&frame.width.to_le_bytes());
    record.extend_from_slice(&frame.height.to_le_bytes());
    record.extend_from_slice(&frame.timestamp_ms.to_le_bytes());
    record.extend_from_slice(&(frame.data.len() as u32).to_le_bytes());
    record.extend_from_slice(&frame.data);
    record
}

/// Parse a concatenation of raw-frame records
pub fn decode_frame_records(bytes: &[u8]) -> Result<Vec<VideoFrame>, FrameRecordError> {
    let mut frames = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let header = bytes
            .get(offset..offset + FRAME_HEADER_LEN)
            .ok_or(FrameRecordError::Truncated(offset))?;
        if header[0..4] != FRAME_MAGIC {
            return Err(FrameRecordError::BadMagic(offset));
        }

        let width = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let height = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&header[12..20]);
        let timestamp_ms = f64::from_le_bytes(ts);
        let len = u32::from_le_bytes([header[20], header[21], header[22], header[23]]) as usize;

        if len != VideoFrame::expected_len(width, height) {
            return Err(FrameRecordError::SizeMismatch(offset));
        }

        let start = offset + FRAME_HEADER_LEN;
        let payload = bytes
            .get(start..start + len)
            .ok_or(FrameRecordError::Truncated(offset))?;
        frames.push(VideoFrame::new(payload.to_vec(), width, height, timestamp_ms));
        offset = start + len;
    }

    Ok(frames)
}
