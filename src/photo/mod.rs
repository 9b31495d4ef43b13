//! Still photo capture
//!
//! Samples the live preview, copies the frame into a raster and encodes it
//! into an image resource.

pub mod encoding;
pub mod pipeline;
pub mod raster;

pub use encoding::{decode_png, ImageEncoder, PngEncoder};
pub use pipeline::{CaptureOutcome, CaptureTicket, PhotoArtifact, PhotoPipeline};
pub use raster::Raster;
