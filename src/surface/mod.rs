//! Presentation boundary
//!
//! Surfaces the core pushes streams and artifact locators into, and the
//! registry those locators live in.

pub mod binder;
pub mod registry;
pub mod video;

pub use binder::Binder;
pub use registry::{Resource, ResourceLocator, ResourceRegistry};
pub use video::{Attachment, Surface, SurfaceRole, SurfaceSource, VideoSurface};
