//! Command handlers
//!
//! The command set a front end drives the capture session with.

pub mod capture;

pub use capture::{capture_photo, dispatch, get_status, toggle_recording, Command, Reply};
