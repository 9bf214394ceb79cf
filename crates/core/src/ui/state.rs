//! Overlay state and the value it hands back.

use crate::geometry::SelectionRect;
use crate::templates::GenerationMode;

/// What the user picked on the overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlaySelection {
    /// Logical coordinates relative to the frame's top-left.
    pub selection: SelectionRect,
    /// Physical frame pixels per logical point.
    pub device_pixel_ratio: f64,
    pub mode: GenerationMode,
}

/// Where the overlay is in its short life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OverlayPhase {
    /// Waiting for, or following, a drag.
    Selecting,
    /// A selection exists; the mode picker is shown.
    Confirming,
}
