//! Raster surface for still capture

use crate::capture::VideoFrame;
use crate::utils::error::{AppError, AppResult};

/// Owned RGBA8 copy of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Raster {
    /// Copy the frame's full pixel extent into a raster of the same size
    pub fn from_frame(frame: &VideoFrame) -> AppResult<Self> {
        if frame.width == 0 || frame.height == 0 {
            return Err(AppError::NoFrameAvailable(format!(
                "source frame is {}x{}",
                frame.width, frame.height
            )));
        }

        let len = VideoFrame::expected_len(frame.width, frame.height);
        let pixels = frame
            .data
            .get(..len)
            .ok_or_else(|| {
                AppError::NoFrameAvailable(format!(
                    "frame buffer holds {} of {} bytes",
                    frame.data.len(),
                    len
                ))
            })?
            .to_vec();

        Ok(Self {
            width: frame.width,
            height: frame.height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}
