//! Fullscreen selection overlay.
//!
//! Shows the frozen frame, lets the user drag a rectangle over it and pick a
//! generation mode, then closes. Escape cancels at any point.

use super::rendering::{
    SHADE_ALPHA, calculate_popup_position, draw_selection_border, draw_selection_overlay, draw_size_label,
};
use super::selection::{SelectionEvent, device_pixel_ratio, process_drag_event, to_selection_rect};
use super::state::{OverlayPhase, OverlaySelection};
use crate::capture::RasterFrame;
use crate::error::{AppError, Result};
use crate::templates::GenerationMode;
use eframe::egui;
use image::ImageFormat;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

const POPUP_WIDTH: f32 = 260.0;

pub(crate) struct SelectionOverlay {
    texture: Option<egui::TextureHandle>,
    /// Pixels waiting for upload on the first frame.
    pending: Option<egui::ColorImage>,
    frame_width: u32,

    start: Option<egui::Pos2>,
    current: Option<egui::Pos2>,
    phase: OverlayPhase,
    mode: GenerationMode,

    outcome: Arc<Mutex<Option<OverlaySelection>>>,
}

impl SelectionOverlay {
    fn new(frame: &RasterFrame, mode: GenerationMode, outcome: Arc<Mutex<Option<OverlaySelection>>>) -> Result<Self> {
        let decoded = image::load_from_memory_with_format(frame.bytes(), ImageFormat::Png)
            .map_err(|e| AppError::image(format!("Failed to decode frame for overlay: {}", e)))?
            .to_rgba8();
        let size = [decoded.width() as usize, decoded.height() as usize];
        let pending = egui::ColorImage::from_rgba_unmultiplied(size, decoded.as_flat_samples().as_slice());

        Ok(Self {
            texture: None,
            pending: Some(pending),
            frame_width: decoded.width(),
            start: None,
            current: None,
            phase: OverlayPhase::Selecting,
            mode,
            outcome,
        })
    }

    fn dragged_rect(&self, ctx: &egui::Context) -> Option<egui::Rect> {
        let end = match self.phase {
            OverlayPhase::Confirming => self.current,
            OverlayPhase::Selecting => ctx.pointer_interact_pos().or(self.current),
        };
        Some(egui::Rect::from_two_pos(self.start?, end?))
    }

    fn confirm(&mut self, ctx: &egui::Context, dragged: egui::Rect, screen: egui::Rect) {
        let ratio = device_pixel_ratio(self.frame_width, screen.width(), ctx.pixels_per_point());
        let selection = to_selection_rect(dragged, screen.min);
        debug!(?selection, ratio, mode = %self.mode, "Selection confirmed");

        *self.outcome.lock() = Some(OverlaySelection {
            selection,
            device_pixel_ratio: ratio,
            mode: self.mode,
        });
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }

    fn show_mode_picker(&mut self, ctx: &egui::Context, dragged: egui::Rect, screen: egui::Rect) {
        let (anchor, pivot) = calculate_popup_position(dragged, screen, POPUP_WIDTH, 10.0, 220.0);
        let mut confirmed = ctx.input(|i| i.key_pressed(egui::Key::Enter));

        egui::Area::new(egui::Id::new("mode_picker"))
            .fixed_pos(anchor)
            .pivot(pivot)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style())
                    .fill(egui::Color32::from_rgb(30, 30, 30))
                    .stroke(egui::Stroke::new(1.0, egui::Color32::GRAY))
                    .inner_margin(10.0)
                    .show(ui, |ui| {
                        ui.set_width(POPUP_WIDTH);
                        ui.label("Generate:");
                        for mode in GenerationMode::ALL {
                            ui.radio_value(&mut self.mode, mode, mode.label());
                        }
                        ui.separator();
                        if ui.button("Generate (Enter)").clicked() {
                            confirmed = true;
                        }
                    });
            });

        if confirmed {
            self.confirm(ctx, dragged, screen);
        }
    }
}

impl eframe::App for SelectionOverlay {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(egui::Visuals::dark());

        if let Some(pending) = self.pending.take() {
            self.texture = Some(ctx.load_texture("frozen-frame", pending, egui::TextureOptions::LINEAR));
        }

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            debug!("Selection cancelled");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let screen = ui.max_rect();

                if let Some(texture) = &self.texture {
                    ui.painter().image(
                        texture.id(),
                        screen,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    );
                }

                let response = ui.interact(screen, ui.id().with("selection"), egui::Sense::drag());
                match process_drag_event(&response, &mut self.start, &mut self.current) {
                    SelectionEvent::Started => self.phase = OverlayPhase::Selecting,
                    SelectionEvent::Completed => self.phase = OverlayPhase::Confirming,
                    SelectionEvent::Discarded => debug!("Selection too small, discarded"),
                    SelectionEvent::Dragging | SelectionEvent::None => {}
                }

                let Some(dragged) = self.dragged_rect(ctx) else {
                    ui.painter()
                        .rect_filled(screen, 0.0, egui::Color32::from_black_alpha(SHADE_ALPHA / 2));
                    return;
                };

                draw_selection_overlay(ui.painter(), screen, dragged, SHADE_ALPHA);
                draw_selection_border(ui.painter(), dragged, 2.0, egui::Color32::WHITE);
                let ratio = device_pixel_ratio(self.frame_width, screen.width(), ctx.pixels_per_point());
                draw_size_label(ui.painter(), dragged, ratio);

                if self.phase == OverlayPhase::Confirming {
                    self.show_mode_picker(ctx, dragged, screen);
                }
            });
    }
}

/// Shows `frame` fullscreen and blocks until the user selects or cancels.
///
/// Returns `Ok(None)` when the user pressed Escape or closed the window.
///
/// # Errors
///
/// Returns [`AppError::Ui`] if the window cannot be created, or
/// [`AppError::ImageProcessing`] if the frame cannot be decoded.
pub fn run(frame: &RasterFrame, initial_mode: GenerationMode) -> Result<Option<OverlaySelection>> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_fullscreen(true)
            .with_decorations(false)
            .with_always_on_top(),
        ..Default::default()
    };

    let outcome = Arc::new(Mutex::new(None));
    let app = SelectionOverlay::new(frame, initial_mode, outcome.clone())?;

    eframe::run_native(
        "screen-prompt selection",
        options,
        Box::new(move |_cc| Ok(Box::new(app) as Box<dyn eframe::App>)),
    )
    .map_err(|e| AppError::ui(format!("Failed to run selection overlay: {}", e)))?;

    let selection = outcome.lock().take();
    Ok(selection)
}
