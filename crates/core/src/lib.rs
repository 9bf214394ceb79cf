//! screen-prompt core library
//!
//! Captures a region of the screen and asks a multimodal AI provider to turn
//! it into an image-generation prompt (Midjourney, Stable Diffusion, natural
//! language), a cinematographer's analysis or a plain description.
//!
//! # Overview
//!
//! One capture flows through these stages:
//!
//! - **Capture**: [`capture::ScreenSource`] grabs the target display at its
//!   physical resolution
//! - **Selection**: the [`ui`] overlay returns a logical rectangle, which
//!   [`geometry::GeometryResolver`] maps onto frame pixels
//! - **Crop**: [`image_processing::ImageCropper`] cuts and encodes the region
//! - **Generation**: [`orchestrator::GenerationOrchestrator`] picks the
//!   provider from [`config`], sends the [`templates`] instruction through a
//!   [`providers::ProviderAdapter`] and reports to a
//!   [`presentation::PresentationTarget`]
//!
//! # Quick Start
//!
//! ```ignore
//! use screen_prompt_core::{ScreenPrompt, presentation::RecordingTarget};
//!
//! let app = ScreenPrompt::new()?;
//! let display = app.display(0)?;
//! let frame = app.capture_frame(&display)?;
//! if let Some(picked) = app.select_region(&frame, None)? {
//!     app.capture_region(&frame, picked.selection, picked.device_pixel_ratio)?;
//!     let target = RecordingTarget::new("result");
//!     let result = app.generate(Some(picked.mode), &target).await;
//! }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod geometry;
pub mod image_processing;
pub mod orchestrator;
pub mod presentation;
pub mod providers;
pub mod templates;
pub mod ui;

pub use capture::{CaptureBackend, RasterFrame, ScreenSource, ScreenshotsBackend};
pub use config::{FileSettingsStore, ProviderConfig, ProviderKind, Settings, SettingsStore};
pub use error::{AppError, Result};
pub use geometry::{GeometryResolver, SelectionRect};
pub use image_processing::{CapturedImage, ImageCropper};
pub use orchestrator::{GenerationOrchestrator, GenerationResult};
pub use templates::{GenerationMode, PromptTemplateCatalog};

use geometry::DisplayMetrics;
use presentation::PresentationTarget;
use providers::{HttpProviderFactory, ProviderFactory};
use std::sync::Arc;
use tracing::info;
use ui::OverlaySelection;

/// Facade wiring capture, cropping and generation together.
pub struct ScreenPrompt<B: CaptureBackend = ScreenshotsBackend> {
    screens: ScreenSource<B>,
    settings: Arc<dyn SettingsStore>,
    orchestrator: GenerationOrchestrator,
}

impl ScreenPrompt {
    /// Uses the on-disk settings, the real HTTP providers and the
    /// `screenshots` capture backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined or the
    /// HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_settings(Arc::new(FileSettingsStore::open_default()?))
    }

    pub fn with_settings(settings: Arc<dyn SettingsStore>) -> Result<Self> {
        Ok(Self::with_parts(
            ScreenshotsBackend,
            settings,
            Arc::new(HttpProviderFactory::new()?),
        ))
    }
}

impl<B: CaptureBackend> ScreenPrompt<B> {
    pub fn with_parts(backend: B, settings: Arc<dyn SettingsStore>, providers: Arc<dyn ProviderFactory>) -> Self {
        let orchestrator = GenerationOrchestrator::new(settings.clone(), providers);
        Self {
            screens: ScreenSource::new(backend),
            settings,
            orchestrator,
        }
    }

    pub fn list_monitors(&self) -> Result<Vec<String>> {
        self.screens.list_displays()
    }

    pub fn display(&self, monitor_index: usize) -> Result<DisplayMetrics> {
        self.screens.display(monitor_index)
    }

    /// Captures `display` at its physical resolution.
    pub fn capture_frame(&self, display: &DisplayMetrics) -> Result<RasterFrame> {
        self.screens.capture_frame(display)
    }

    /// Shows the selection overlay over `frame`.
    ///
    /// The mode picker starts on `initial_mode`, or the last selected mode.
    pub fn select_region(
        &self,
        frame: &RasterFrame,
        initial_mode: Option<GenerationMode>,
    ) -> Result<Option<OverlaySelection>> {
        ui::run_selection_ui(frame, initial_mode.unwrap_or_else(|| self.orchestrator.last_mode()))
    }

    /// Crops a logical selection out of `frame` and keeps it as the
    /// session's captured image.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRegion`] or [`AppError::CropOutOfBounds`]
    /// when the selection does not cover any of the frame.
    pub fn capture_region(
        &self,
        frame: &RasterFrame,
        selection: SelectionRect,
        device_pixel_ratio: f64,
    ) -> Result<CapturedImage> {
        let rect = GeometryResolver::resolve(selection, device_pixel_ratio, frame.size())?;
        let image = ImageCropper::crop(frame, rect)?;
        info!(
            width = image.size().width,
            height = image.size().height,
            bytes = image.byte_len(),
            "Region captured"
        );
        self.orchestrator.store_capture(image.clone());
        Ok(image)
    }

    /// Generates from the session's captured image.
    ///
    /// `None` reuses the last selected mode.
    pub async fn generate(&self, mode: Option<GenerationMode>, target: &dyn PresentationTarget) -> GenerationResult {
        let image = self.orchestrator.last_image();
        self.orchestrator.generate(mode, image.as_ref(), target).await
    }

    /// Reports a failed capture on `target`.
    pub fn report_capture_error(&self, err: &AppError, target: &dyn PresentationTarget) {
        self.orchestrator.report_capture_error(err, target);
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    /// Current settings, read fresh from the store.
    pub fn settings(&self) -> Result<Settings> {
        self.settings.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::tests::FakeBackend;
    use crate::capture::SourceInfo;
    use crate::config::MemorySettingsStore;
    use crate::presentation::{PresentationEvent, RecordingTarget};
    use crate::providers::{GenerationOptions, ProviderAdapter};
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};

    struct EchoAdapter;

    #[async_trait]
    impl ProviderAdapter for EchoAdapter {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Local
        }

        fn model(&self) -> &str {
            "echo"
        }

        async fn generate(&self, image_base64: &str, _instruction: &str, options: GenerationOptions) -> Result<String> {
            Ok(format!("{} bytes, budget {}", image_base64.len(), options.max_output_units))
        }
    }

    struct EchoFactory;

    impl ProviderFactory for EchoFactory {
        fn build(&self, _config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>> {
            Ok(Arc::new(EchoAdapter))
        }
    }

    fn app() -> ScreenPrompt<FakeBackend> {
        let backend = FakeBackend {
            sources: vec![SourceInfo {
                id: "screen:7:0".into(),
                display_id: Some("7".into()),
                name: "Monitor 0".into(),
            }],
            raster: RgbaImage::from_pixel(4, 3, Rgba([200, 10, 10, 255])),
        };
        let settings = Settings {
            api_provider: ProviderKind::Local,
            ..Settings::default()
        };
        ScreenPrompt::with_parts(
            backend,
            Arc::new(MemorySettingsStore::new(settings)),
            Arc::new(EchoFactory),
        )
    }

    #[tokio::test]
    async fn capture_crop_and_generate_end_to_end() {
        let app = app();
        let display = app.display(0).unwrap();
        let frame = app.capture_frame(&display).unwrap();

        let image = app
            .capture_region(&frame, SelectionRect::new(1.0, 1.0, 10.0, 10.0), 1.0)
            .unwrap();
        assert_eq!(image.size(), geometry::FrameSize::new(3, 2));

        let target = RecordingTarget::new("cli");
        let result = app.generate(Some(GenerationMode::Midjourney), &target).await;

        let expected = format!("{} bytes, budget 250", image.base64().len());
        assert_eq!(result.text(), Some(expected.as_str()));
        assert!(matches!(target.last(), Some(PresentationEvent::Ready(_))));
    }

    #[tokio::test]
    async fn generate_before_capture_reports_missing_image() {
        let app = app();
        let target = RecordingTarget::new("cli");

        let result = app.generate(None, &target).await;

        assert_eq!(result.message(), AppError::ImageMissing.to_string());
    }

    #[test]
    fn selection_outside_frame_is_rejected() {
        let app = app();
        let frame = app.capture_frame(&app.display(0).unwrap()).unwrap();

        let err = app
            .capture_region(&frame, SelectionRect::new(50.0, 0.0, 10.0, 10.0), 1.0)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRegion(_)));
        assert!(app.orchestrator().last_image().is_none());
    }
}
