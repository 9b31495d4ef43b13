//! Still image encoding
//!
//! Rasters are encoded to PNG with the `png` crate. Encoding is CPU-bound and
//! is always run on a blocking worker by the pipeline.

use super::raster::Raster;
use crate::capture::VideoFrame;
use crate::config::PhotoCompression;
use crate::utils::error::{AppError, AppResult};

/// Turns a raster into an image resource
pub trait ImageEncoder: Send + Sync + 'static {
    /// Mime type of the encoded bytes
    fn mime_type(&self) -> &'static str;

    fn encode(&self, raster: &Raster) -> AppResult<Vec<u8>>;
}

/// Lossless PNG encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder {
    compression: PhotoCompression,
}

impl PngEncoder {
    pub fn new(compression: PhotoCompression) -> Self {
        Self { compression }
    }

    fn png_compression(&self) -> png::Compression {
        match self.compression {
            PhotoCompression::Fast => png::Compression::Fast,
            PhotoCompression::Default => png::Compression::Default,
            PhotoCompression::Best => png::Compression::Best,
        }
    }
}

impl ImageEncoder for PngEncoder {
    fn mime_type(&self) -> &'static str {
        "image/png"
    }

    fn encode(&self, raster: &Raster) -> AppResult<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buffer, raster.width(), raster.height());
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_compression(self.png_compression());

            let mut writer = encoder
                .write_header()
                .map_err(|e| AppError::EncodeFailure(format!("PNG header: {e}")))?;
            writer
                .write_image_data(raster.pixels())
                .map_err(|e| AppError::EncodeFailure(format!("PNG data: {e}")))?;
            writer
                .finish()
                .map_err(|e| AppError::EncodeFailure(format!("PNG finish: {e}")))?;
        }

        tracing::debug!(
            "Encoded {}x{} PNG ({} bytes)",
            raster.width(),
            raster.height(),
            buffer.len()
        );
        Ok(buffer)
    }
}

/// Decode a PNG into an RGBA frame
pub fn decode_png(bytes: &[u8]) -> AppResult<VideoFrame> {
    let decoder = png::Decoder::new(bytes);
    let mut reader = decoder
        .read_info()
        .map_err(|e| AppError::Decode(format!("PNG decode error: {e}")))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| AppError::Decode(format!("PNG frame error: {e}")))?;

    let data = match info.color_type {
        png::ColorType::Rgba => buf[..info.buffer_size()].to_vec(),
        png::ColorType::Rgb => {
            let rgb = &buf[..info.buffer_size()];
            let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
            for px in rgb.chunks(3) {
                rgba.extend_from_slice(px);
                rgba.push(255);
            }
            rgba
        }
        other => {
            return Err(AppError::Decode(format!(
                "Unsupported PNG color type: {other:?}"
            )));
        }
    };

    Ok(VideoFrame::new(data, info.width, info.height, 0.0))
}
