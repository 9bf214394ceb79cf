//! Image cropping and encoding utilities.
//!
//! This module extracts the selected region from a captured frame and
//! encodes it as PNG plus its base64 transport form for the AI providers.

use crate::capture::RasterFrame;
use crate::error::{AppError, Result};
use crate::geometry::{FrameSize, PhysicalCropRect};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::{debug, warn};

/// A cropped, losslessly encoded region ready to send to a provider.
///
/// Lives only in memory; it is never written to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedImage {
    png: Vec<u8>,
    base64: String,
    size: FrameSize,
}

impl CapturedImage {
    /// Wraps PNG bytes, computing the base64 form.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EncodeFailure`] for an empty buffer.
    pub fn from_png(png: Vec<u8>, size: FrameSize) -> Result<Self> {
        if png.is_empty() {
            return Err(AppError::EncodeFailure("cropped image is empty".into()));
        }
        let base64 = BASE64.encode(&png);
        Ok(Self { png, base64, size })
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    /// Base64 of the PNG bytes, without a data-URI prefix.
    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn byte_len(&self) -> usize {
        self.png.len()
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub const MIME_TYPE: &'static str = "image/png";
}

/// Extracts sub-images from captured frames.
pub struct ImageCropper;

impl ImageCropper {
    /// Crops `rect` out of `frame` and encodes the result as PNG.
    ///
    /// The frame is decoded and its real dimensions are used for bounds
    /// checking, so a frame whose recorded size disagrees with its pixels
    /// is re-clamped against what was actually captured.
    ///
    /// # Errors
    ///
    /// - [`AppError::ImageProcessing`] if the frame cannot be decoded
    /// - [`AppError::CropOutOfBounds`] if nothing of `rect` lies in the frame
    /// - [`AppError::EncodeFailure`] if PNG encoding fails
    pub fn crop(frame: &RasterFrame, rect: PhysicalCropRect) -> Result<CapturedImage> {
        let decoded = image::load_from_memory_with_format(frame.bytes(), ImageFormat::Png)
            .map_err(|e| AppError::image(format!("Failed to decode frame: {}", e)))?;
        let actual = FrameSize::new(decoded.width(), decoded.height());

        if actual != frame.size() {
            warn!(
                recorded_width = frame.size().width,
                recorded_height = frame.size().height,
                width = actual.width,
                height = actual.height,
                "Frame size disagrees with decoded image, re-clamping crop"
            );
        }

        let width = rect.width().min(actual.width.saturating_sub(rect.left()));
        let height = rect.height().min(actual.height.saturating_sub(rect.top()));
        if width == 0 || height == 0 {
            return Err(AppError::CropOutOfBounds {
                left: rect.left(),
                top: rect.top(),
                width: rect.width(),
                height: rect.height(),
                frame_width: actual.width,
                frame_height: actual.height,
            });
        }

        let cropped = decoded.crop_imm(rect.left(), rect.top(), width, height);
        let png = Self::encode_png(&cropped)?;
        debug!(
            left = rect.left(),
            top = rect.top(),
            width,
            height,
            bytes = png.len(),
            "Cropped selection"
        );

        CapturedImage::from_png(png, FrameSize::new(width, height))
    }

    fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| AppError::EncodeFailure(format!("Failed to encode image: {}", e)))?;
        Ok(buffer)
    }
}
