//! Error types for the screen-prompt-core library.
//!
//! Errors are grouped by the stage that produced them: capture, crop,
//! provider and orchestration. Provider errors always carry the
//! [`ProviderKind`] that failed so the user-facing message can name it.

use crate::config::ProviderKind;
use thiserror::Error;

/// Errors that can occur within the screen-prompt-core library.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (unreadable settings, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The selection does not map to any pixel of the captured frame.
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Screen enumeration or grabbing failed at the OS level.
    #[error("Screen capture failed: {0}")]
    ScreenCapture(String),

    /// The capture backend reported no screens at all.
    #[error("No screen sources found")]
    NoSourcesFound,

    /// No source could be matched to the requested display.
    #[error("Display source not found for display {0}")]
    SourceNotFound(String),

    /// The matched source produced a zero-sized raster.
    #[error("Captured frame for source {0} is empty")]
    EmptyThumbnail(String),

    /// Encoding a raster to bytes produced nothing or failed.
    #[error("Failed to encode frame: {0}")]
    EncodeFailure(String),

    /// The crop rectangle is empty after clamping to the decoded frame.
    #[error("Crop region {width}x{height} at ({left}, {top}) lies outside the {frame_width}x{frame_height} frame")]
    CropOutOfBounds {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    /// Image decoding or processing failed.
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    /// The provider rejected the configured credentials.
    #[error("{provider} rejected the API key: invalid credentials")]
    InvalidCredentials { provider: ProviderKind },

    /// The provider refused to answer for safety reasons.
    #[error("{provider} blocked the request: {reason}")]
    ContentBlocked {
        provider: ProviderKind,
        reason: String,
    },

    /// The provider answered without any text.
    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: ProviderKind },

    /// The provider endpoint could not be reached.
    #[error("{provider} endpoint unreachable: {detail}")]
    EndpointUnreachable {
        provider: ProviderKind,
        detail: String,
    },

    /// The provider answered with a non-success HTTP status.
    #[error("{provider} request failed with HTTP {status}: {body}")]
    Http {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    /// A field required by the provider is not configured.
    #[error("{provider} is not configured: {detail}")]
    NoConfiguration {
        provider: ProviderKind,
        detail: String,
    },

    /// The provider answered with a body we could not interpret.
    #[error("{provider} returned a malformed response: {detail}")]
    MalformedResponse {
        provider: ProviderKind,
        detail: String,
    },

    /// Generation was requested before any image was captured.
    #[error("No image captured to generate prompt from.")]
    ImageMissing,

    /// An unknown generation mode id was requested.
    #[error("Unsupported generation mode: {0}")]
    UnsupportedMode(String),

    /// UI-related errors (overlay window, clipboard).
    #[error("UI error: {0}")]
    Ui(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a screen capture error with the given message.
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::ScreenCapture(msg.into())
    }

    /// Creates an image processing error with the given message.
    pub fn image(msg: impl Into<String>) -> Self {
        Self::ImageProcessing(msg.into())
    }

    /// Creates a UI error with the given message.
    pub fn ui(msg: impl Into<String>) -> Self {
        Self::Ui(msg.into())
    }

    /// Returns the provider a provider-path error originated from.
    pub fn provider(&self) -> Option<ProviderKind> {
        match self {
            Self::InvalidCredentials { provider }
            | Self::ContentBlocked { provider, .. }
            | Self::EmptyResponse { provider }
            | Self::EndpointUnreachable { provider, .. }
            | Self::Http { provider, .. }
            | Self::NoConfiguration { provider, .. }
            | Self::MalformedResponse { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    /// Whether this error aborted a provider call rather than a capture.
    pub fn is_provider_error(&self) -> bool {
        self.provider().is_some()
    }

    /// Whether this error aborted the capture or crop stage.
    pub fn is_capture_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRegion(_)
                | Self::ScreenCapture(_)
                | Self::NoSourcesFound
                | Self::SourceNotFound(_)
                | Self::EmptyThumbnail(_)
                | Self::EncodeFailure(_)
                | Self::CropOutOfBounds { .. }
                | Self::ImageProcessing(_)
        )
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
