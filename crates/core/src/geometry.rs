//! Selection geometry: logical UI rectangles to physical crop rectangles.
//!
//! The selection overlay reports rectangles in logical (UI) pixels while the
//! captured frame is in physical pixels. On HiDPI displays the two differ by
//! the device pixel ratio, and a selection dragged past the screen edge can
//! extend beyond the frame. [`GeometryResolver`] reconciles both.

use crate::error::{AppError, Result};

/// A user-drawn selection in logical UI pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SelectionRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Builds a rectangle from two opposite drag corners, in any order.
    pub fn from_corners(start: (f64, f64), end: (f64, f64)) -> Self {
        Self {
            x: start.0.min(end.0),
            y: start.1.min(end.1),
            width: (end.0 - start.0).abs(),
            height: (end.1 - start.1).abs(),
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Pixel dimensions of a captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A physical display a frame can be captured from.
///
/// `width` and `height` are logical; `scale_factor` converts them to
/// physical pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayMetrics {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

impl DisplayMetrics {
    /// The raster size a capture of this display must have.
    pub fn physical_size(&self) -> FrameSize {
        let scale = if self.scale_factor.is_finite() && self.scale_factor > 0.0 {
            self.scale_factor
        } else {
            1.0
        };
        FrameSize {
            width: (self.width as f64 * scale).round() as u32,
            height: (self.height as f64 * scale).round() as u32,
        }
    }
}

/// A crop rectangle in physical pixels, always contained in its frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhysicalCropRect {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl PhysicalCropRect {
    /// Validates that the rectangle is non-empty and fits inside `frame`.
    pub fn within(left: u32, top: u32, width: u32, height: u32, frame: FrameSize) -> Result<Self> {
        let fits_x = (left as u64 + width as u64) <= frame.width as u64;
        let fits_y = (top as u64 + height as u64) <= frame.height as u64;
        if width == 0 || height == 0 || !fits_x || !fits_y {
            return Err(AppError::InvalidRegion(format!(
                "{width}x{height} at ({left}, {top}) does not fit in the {}x{} frame",
                frame.width, frame.height
            )));
        }
        Ok(Self { left, top, width, height })
    }

    /// The rectangle covering the whole frame.
    pub fn full_frame(frame: FrameSize) -> Result<Self> {
        Self::within(0, 0, frame.width, frame.height, frame)
    }

    pub fn left(&self) -> u32 {
        self.left
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Maps UI selections onto physical frame coordinates.
pub struct GeometryResolver;

impl GeometryResolver {
    /// Converts a logical selection into a crop rectangle inside `frame`.
    ///
    /// The selection is scaled by `device_pixel_ratio`, rounded, clamped to
    /// non-negative origin and at least one pixel of extent, then clamped
    /// again so it never reaches past the frame's right or bottom edge.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRegion`] if the selection has no area, the
    /// ratio is not a positive number, or nothing of the selection lies
    /// inside the frame.
    pub fn resolve(
        selection: SelectionRect,
        device_pixel_ratio: f64,
        frame: FrameSize,
    ) -> Result<PhysicalCropRect> {
        if !device_pixel_ratio.is_finite() || device_pixel_ratio <= 0.0 {
            return Err(AppError::InvalidRegion(format!(
                "device pixel ratio must be positive, got {device_pixel_ratio}"
            )));
        }
        if !selection.is_finite() || !selection.has_area() {
            return Err(AppError::InvalidRegion(format!(
                "selection {}x{} has no area",
                selection.width, selection.height
            )));
        }

        let left = (selection.x * device_pixel_ratio).round().max(0.0) as i64;
        let top = (selection.y * device_pixel_ratio).round().max(0.0) as i64;
        let width = (selection.width * device_pixel_ratio).round().max(1.0) as i64;
        let height = (selection.height * device_pixel_ratio).round().max(1.0) as i64;

        // A drag past the screen edge must never request pixels outside the frame.
        let width = width.min(frame.width as i64 - left);
        let height = height.min(frame.height as i64 - top);

        if width <= 0 || height <= 0 {
            return Err(AppError::InvalidRegion(format!(
                "selection at ({left}, {top}) lies outside the {}x{} frame",
                frame.width, frame.height
            )));
        }

        PhysicalCropRect::within(left as u32, top as u32, width as u32, height as u32, frame)
    }
}
