//! Screen capture functionality.
//!
//! [`ScreenSource`] picks the capture source that belongs to a target
//! display and returns a full-frame PNG snapshot at exactly the display's
//! physical resolution. The OS facility behind it is a [`CaptureBackend`];
//! [`ScreenshotsBackend`] is the real one, built on the `screenshots` crate.
//!
//! # Example
//!
//! ```ignore
//! use screen_prompt_core::capture::{ScreenSource, ScreenshotsBackend};
//!
//! let source = ScreenSource::new(ScreenshotsBackend);
//! let display = source.display(0)?;
//! let frame = source.capture_frame(&display)?;
//! ```

use crate::error::{AppError, Result};
use crate::geometry::{DisplayMetrics, FrameSize};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use screenshots::Screen;
use std::io::Cursor;
use tracing::{debug, info, warn};

/// One capturable screen as reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    /// Composite identifier, e.g. `screen:69733378:0`.
    pub id: String,
    /// Identifier of the display this source shows, when the OS reports it.
    pub display_id: Option<String>,
    pub name: String,
}

/// Which rule of the selection policy matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceMatch {
    /// The source's display id equals the target display id.
    DisplayId(usize),
    /// The composite source id carries the display id as its second segment.
    CompositeId(usize),
    /// Only one source exists; it is used unconditionally.
    OnlySource,
    /// Several sources and no match; the first one is used.
    FirstOfMany,
}

impl SourceMatch {
    pub fn index(self) -> usize {
        match self {
            Self::DisplayId(i) | Self::CompositeId(i) => i,
            Self::OnlySource | Self::FirstOfMany => 0,
        }
    }
}

/// Applies the source selection policy; first matching rule wins.
///
/// The last fallback is best effort: with several monitors and no
/// identifier match the wrong screen may be captured.
pub fn select_source(sources: &[SourceInfo], target_display_id: &str) -> Option<SourceMatch> {
    if let Some(i) = sources
        .iter()
        .position(|s| s.display_id.as_deref() == Some(target_display_id))
    {
        return Some(SourceMatch::DisplayId(i));
    }

    if let Some(i) = sources.iter().position(|s| {
        let parts: Vec<&str> = s.id.split(':').collect();
        parts.len() > 1 && parts[0] == "screen" && parts[1] == target_display_id
    }) {
        return Some(SourceMatch::CompositeId(i));
    }

    match sources.len() {
        0 => None,
        1 => Some(SourceMatch::OnlySource),
        _ => Some(SourceMatch::FirstOfMany),
    }
}

/// A full-frame snapshot, PNG-encoded, with the size it was captured at.
#[derive(Clone, Debug)]
pub struct RasterFrame {
    source_id: String,
    png: Vec<u8>,
    size: FrameSize,
}

impl RasterFrame {
    /// Encodes a raster as a PNG frame.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EncodeFailure`] if encoding fails or yields no bytes.
    pub fn encode(source_id: impl Into<String>, raster: &RgbaImage) -> Result<Self> {
        let source_id = source_id.into();
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(raster.clone())
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| AppError::EncodeFailure(format!("{source_id}: {e}")))?;

        if png.is_empty() {
            return Err(AppError::EncodeFailure(format!(
                "{source_id}: PNG encoder returned an empty buffer"
            )));
        }

        Ok(Self {
            source_id,
            png,
            size: FrameSize::new(raster.width(), raster.height()),
        })
    }

    /// Wraps already-encoded bytes with the size the capturer believes they have.
    pub fn from_encoded(source_id: impl Into<String>, png: Vec<u8>, size: FrameSize) -> Self {
        Self {
            source_id: source_id.into(),
            png,
            size,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.png
    }

    /// The size recorded at capture time. The cropper re-checks it against
    /// the decoded image.
    pub fn size(&self) -> FrameSize {
        self.size
    }
}

/// OS-level screen capture facility.
pub trait CaptureBackend: Send + Sync {
    /// Physical displays, in enumeration order.
    fn displays(&self) -> Result<Vec<DisplayMetrics>>;

    /// Capturable screen sources, in enumeration order.
    fn sources(&self) -> Result<Vec<SourceInfo>>;

    /// Grabs the current contents of a source at its native resolution.
    fn grab(&self, source: &SourceInfo) -> Result<RgbaImage>;
}

/// Captures full frames from the display a selection was made on.
pub struct ScreenSource<B: CaptureBackend> {
    backend: B,
}

impl<B: CaptureBackend> ScreenSource<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Lists displays with their dimensions and scale factor.
    pub fn list_displays(&self) -> Result<Vec<String>> {
        Ok(self
            .backend
            .displays()?
            .iter()
            .enumerate()
            .map(|(i, d)| {
                format!(
                    "Monitor {}: {}x{} (scale: {}, id: {})",
                    i, d.width, d.height, d.scale_factor, d.id
                )
            })
            .collect())
    }

    /// Returns the display at `index` in enumeration order.
    pub fn display(&self, index: usize) -> Result<DisplayMetrics> {
        let displays = self.backend.displays()?;
        let count = displays.len();
        displays.into_iter().nth(index).ok_or_else(|| {
            AppError::capture(format!("Monitor {index} not found ({count} available)"))
        })
    }

    /// Captures the target display as a PNG frame at its physical resolution.
    ///
    /// If the backend hands back a raster of a different size it is resampled
    /// to the display's physical size, because every later coordinate is
    /// computed against that size.
    ///
    /// # Errors
    ///
    /// - [`AppError::NoSourcesFound`] if the backend reports no sources
    /// - [`AppError::SourceNotFound`] if no source can be chosen
    /// - [`AppError::EmptyThumbnail`] if the chosen source's raster is empty
    /// - [`AppError::EncodeFailure`] if PNG encoding yields nothing
    pub fn capture_frame(&self, target: &DisplayMetrics) -> Result<RasterFrame> {
        let wanted = target.physical_size();
        let sources = self.backend.sources()?;
        if sources.is_empty() {
            return Err(AppError::NoSourcesFound);
        }

        let chosen = select_source(&sources, &target.id)
            .ok_or_else(|| AppError::SourceNotFound(target.id.clone()))?;
        if chosen == SourceMatch::FirstOfMany {
            warn!(
                display = %target.id,
                sources = sources.len(),
                "No source matched the display, falling back to the first one"
            );
        }
        let source = &sources[chosen.index()];
        debug!(source = %source.id, rule = ?chosen, "Selected capture source");

        let raster = self.backend.grab(source)?;
        if raster.width() == 0 || raster.height() == 0 {
            return Err(AppError::EmptyThumbnail(source.id.clone()));
        }

        let raster = if !wanted.is_empty()
            && (raster.width() != wanted.width || raster.height() != wanted.height)
        {
            warn!(
                got_width = raster.width(),
                got_height = raster.height(),
                width = wanted.width,
                height = wanted.height,
                "Captured raster differs from the display's physical size, resampling"
            );
            image::imageops::resize(&raster, wanted.width, wanted.height, FilterType::Triangle)
        } else {
            raster
        };

        let frame = RasterFrame::encode(&source.id, &raster)?;
        info!(
            source = %frame.source_id(),
            width = frame.size().width,
            height = frame.size().height,
            bytes = frame.bytes().len(),
            "Captured frame"
        );
        Ok(frame)
    }
}

/// Capture backend built on the `screenshots` crate.
///
/// Supports X11 and Wayland on Linux, as well as Windows and macOS.
/// Screens are re-enumerated on every call so hot-plugged monitors are seen.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScreenshotsBackend;

impl ScreenshotsBackend {
    fn screens() -> Result<Vec<Screen>> {
        Screen::all().map_err(|e| AppError::capture(format!("Failed to enumerate screens: {}", e)))
    }
}

impl CaptureBackend for ScreenshotsBackend {
    fn displays(&self) -> Result<Vec<DisplayMetrics>> {
        Ok(Self::screens()?
            .iter()
            .map(|s| DisplayMetrics {
                id: s.display_info.id.to_string(),
                width: s.display_info.width,
                height: s.display_info.height,
                scale_factor: s.display_info.scale_factor as f64,
            })
            .collect())
    }

    fn sources(&self) -> Result<Vec<SourceInfo>> {
        Ok(Self::screens()?
            .iter()
            .enumerate()
            .map(|(i, s)| SourceInfo {
                id: format!("screen:{}:0", s.display_info.id),
                display_id: Some(s.display_info.id.to_string()),
                name: format!("Monitor {}", i),
            })
            .collect())
    }

    fn grab(&self, source: &SourceInfo) -> Result<RgbaImage> {
        let screens = Self::screens()?;
        let screen = screens
            .iter()
            .find(|s| source.display_id.as_deref() == Some(s.display_info.id.to_string().as_str()))
            .or_else(|| screens.first())
            .ok_or(AppError::NoSourcesFound)?;

        let captured = screen
            .capture()
            .map_err(|e| AppError::capture(format!("Failed to capture screen: {}", e)))?;

        // screenshots ships its own image version; move the pixels across raw.
        let width = captured.width();
        let height = captured.height();
        let rgba_data = captured.into_raw();

        image::ImageBuffer::from_raw(width, height, rgba_data)
            .ok_or_else(|| AppError::capture("Failed to create image buffer"))
    }
}
