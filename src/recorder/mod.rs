//! Recording system module
//!
//! - `Recorder`: the record/stop state machine over a bound stream
//! - Chunk producers feeding it on a fixed timeslice
//! - The artifact a finished session is finalized into

pub mod chunk;
pub mod machine;
pub mod state;

pub use chunk::{
    decode_frame_records, encode_frame_record, Chunk, ChunkProducer, ChunkSink,
    FrameChunkProducer, FrameRecordError, ProducerHandle, RAW_FRAME_MIME,
};
pub use machine::{Recorder, RecordingEvent};
pub use state::{RecordingArtifact, RecordingSession, RecordingState};
