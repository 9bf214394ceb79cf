//! Interactive region selection.
//!
//! A fullscreen `eframe` overlay displays a frozen capture of the display.
//! The user drags a rectangle, picks a [`GenerationMode`] and confirms; the
//! overlay returns the rectangle in logical points together with the ratio
//! of frame pixels to points, which is what
//! [`GeometryResolver`](crate::geometry::GeometryResolver) needs.
//!
//! - [`state`]: the returned [`OverlaySelection`]
//! - [`selection`]: drag handling and coordinate conversion
//! - [`rendering`]: dimming, border and popup placement
//! - [`overlay`]: the `eframe::App`

mod overlay;
mod rendering;
mod selection;
mod state;

pub use selection::MIN_SELECTION_DISTANCE;
pub use state::OverlaySelection;

use crate::capture::RasterFrame;
use crate::error::Result;
use crate::templates::GenerationMode;

/// Launches the overlay over `frame` and waits for the user.
///
/// ```ignore
/// let frame = screen_source.capture_frame(&display)?;
/// if let Some(picked) = ui::run_selection_ui(&frame, GenerationMode::Midjourney)? {
///     let rect = GeometryResolver::resolve(picked.selection, picked.device_pixel_ratio, frame.size())?;
/// }
/// ```
pub fn run_selection_ui(frame: &RasterFrame, initial_mode: GenerationMode) -> Result<Option<OverlaySelection>> {
    overlay::run(frame, initial_mode)
}
