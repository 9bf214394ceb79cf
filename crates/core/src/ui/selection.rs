//! Drag handling and conversion of overlay coordinates.

use crate::geometry::SelectionRect;
use eframe::egui;

/// Drags shorter than this (in points) are treated as clicks and discarded.
pub const MIN_SELECTION_DISTANCE: f32 = 10.0;

pub fn is_valid_selection(start: egui::Pos2, end: egui::Pos2) -> bool {
    start.distance(end) > MIN_SELECTION_DISTANCE
}

/// What a pointer interaction did to the selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionEvent {
    Started,
    Dragging,
    Completed,
    /// The drag ended too short to count.
    Discarded,
    None,
}

/// Updates the drag corners from `response`.
pub fn process_drag_event(
    response: &egui::Response,
    start: &mut Option<egui::Pos2>,
    current: &mut Option<egui::Pos2>,
) -> SelectionEvent {
    if response.drag_started() {
        *start = response.interact_pointer_pos();
        *current = *start;
        return SelectionEvent::Started;
    }

    if response.dragged() {
        *current = response.interact_pointer_pos().or(*current);
        return SelectionEvent::Dragging;
    }

    if response.drag_stopped() {
        return finish_drag(start, current);
    }

    SelectionEvent::None
}

fn finish_drag(start: &mut Option<egui::Pos2>, current: &mut Option<egui::Pos2>) -> SelectionEvent {
    match (*start, *current) {
        (Some(s), Some(e)) if is_valid_selection(s, e) => SelectionEvent::Completed,
        _ => {
            *start = None;
            *current = None;
            SelectionEvent::Discarded
        }
    }
}

/// Converts a dragged rectangle into logical coordinates relative to the
/// top-left of the frozen frame.
pub fn to_selection_rect(dragged: egui::Rect, frame_origin: egui::Pos2) -> SelectionRect {
    let origin = frame_origin.to_vec2();
    let (min, max) = (dragged.min - origin, dragged.max - origin);
    SelectionRect::from_corners((min.x as f64, min.y as f64), (max.x as f64, max.y as f64))
}

/// Physical frame pixels per overlay point.
///
/// The frozen frame is stretched across the whole overlay, so this ratio is
/// what maps a selection back onto the frame, even when the window manager
/// did not give the overlay exactly the display's size.
pub fn device_pixel_ratio(frame_width: u32, overlay_width: f32, pixels_per_point: f32) -> f64 {
    if overlay_width > 0.0 {
        frame_width as f64 / overlay_width as f64
    } else {
        pixels_per_point as f64
    }
}
