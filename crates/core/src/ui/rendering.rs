//! Painting helpers for the selection overlay.

use eframe::egui;

/// Dimming applied outside the selection.
pub const SHADE_ALPHA: u8 = 150;

/// The four bands of `screen` around `selection`: above, below, left, right.
pub fn surrounding_bands(screen: egui::Rect, selection: egui::Rect) -> [egui::Rect; 4] {
    let selection = selection.intersect(screen);
    [
        egui::Rect::from_min_max(screen.min, egui::pos2(screen.max.x, selection.min.y)),
        egui::Rect::from_min_max(egui::pos2(screen.min.x, selection.max.y), screen.max),
        egui::Rect::from_min_max(
            egui::pos2(screen.min.x, selection.min.y),
            egui::pos2(selection.min.x, selection.max.y),
        ),
        egui::Rect::from_min_max(
            egui::pos2(selection.max.x, selection.min.y),
            egui::pos2(screen.max.x, selection.max.y),
        ),
    ]
}

/// Dims everything but the selection.
pub fn draw_selection_overlay(painter: &egui::Painter, screen: egui::Rect, selection: egui::Rect, alpha: u8) {
    let shade = egui::Color32::from_black_alpha(alpha);
    for band in surrounding_bands(screen, selection) {
        if band.is_positive() {
            painter.rect_filled(band, 0.0, shade);
        }
    }
}

pub fn draw_selection_border(painter: &egui::Painter, selection: egui::Rect, stroke_width: f32, color: egui::Color32) {
    painter.rect_stroke(
        selection,
        0.0,
        egui::Stroke::new(stroke_width, color),
        egui::StrokeKind::Middle,
    );
}

/// Labels the selection with the physical size it will be cropped at.
pub fn draw_size_label(painter: &egui::Painter, selection: egui::Rect, device_pixel_ratio: f64) {
    let width = (selection.width() as f64 * device_pixel_ratio).round();
    let height = (selection.height() as f64 * device_pixel_ratio).round();
    let anchor = selection.left_top() + egui::vec2(0.0, -4.0);
    painter.text(
        anchor,
        egui::Align2::LEFT_BOTTOM,
        format!("{width} × {height}"),
        egui::FontId::monospace(12.0),
        egui::Color32::WHITE,
    );
}

/// Places a popup under the selection, or above it when there is more
/// room there. Returns the anchor and the pivot to use with it.
pub fn calculate_popup_position(
    selection: egui::Rect,
    screen: egui::Rect,
    popup_width: f32,
    spacing: f32,
    min_height: f32,
) -> (egui::Pos2, egui::Align2) {
    let max_x = (screen.max.x - popup_width - spacing).max(screen.min.x + spacing);
    let x = (selection.center().x - popup_width / 2.0).clamp(screen.min.x + spacing, max_x);

    let below = selection.max.y + spacing;
    let space_below = screen.max.y - below;
    let space_above = selection.min.y - screen.min.y;

    if space_below < min_height && space_above > space_below {
        (egui::pos2(x, selection.min.y - spacing), egui::Align2::LEFT_BOTTOM)
    } else {
        (egui::pos2(x, below), egui::Align2::LEFT_TOP)
    }
}
