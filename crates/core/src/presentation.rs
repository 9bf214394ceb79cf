//! Messages sent from the orchestrator to whatever shows results.

use crate::error::{AppError, Result};
use crate::templates::GenerationMode;
use parking_lot::Mutex;

/// Text shown in a result view, tagged with the mode it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptDisplay {
    pub prompt: String,
    pub selected_model: GenerationMode,
}

/// One update for a presentation target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresentationEvent {
    /// Interim message shown before the provider answers.
    Loading(PromptDisplay),
    /// Final cleaned text.
    Ready(PromptDisplay),
    Error {
        message: String,
        selected_model: Option<GenerationMode>,
    },
}

impl PresentationEvent {
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Loading(_))
    }
}

/// A window, terminal or test sink that displays generation results.
///
/// `key` identifies the target; requests for the same key supersede each
/// other when results are presented.
pub trait PresentationTarget: Send + Sync {
    fn key(&self) -> &str;

    fn present(&self, event: PresentationEvent);
}

/// Destination for the final prompt text.
pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> Result<()>;
}

/// System clipboard through `arboard`.
pub struct ArboardClipboard {
    inner: arboard::Clipboard,
}

impl ArboardClipboard {
    pub fn new() -> Result<Self> {
        let inner = arboard::Clipboard::new().map_err(|e| AppError::ui(format!("Clipboard unavailable: {}", e)))?;
        Ok(Self { inner })
    }
}

impl Clipboard for ArboardClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        self.inner
            .set_text(text.to_string())
            .map_err(|e| AppError::ui(format!("Failed to copy to clipboard: {}", e)))
    }
}

/// Collects every event it receives. Useful for headless callers and tests.
#[derive(Default)]
pub struct RecordingTarget {
    key: String,
    events: Mutex<Vec<PresentationEvent>>,
}

impl RecordingTarget {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<PresentationEvent> {
        self.events.lock().clone()
    }

    pub fn last(&self) -> Option<PresentationEvent> {
        self.events.lock().last().cloned()
    }
}

impl PresentationTarget for RecordingTarget {
    fn key(&self) -> &str {
        &self.key
    }

    fn present(&self, event: PresentationEvent) {
        self.events.lock().push(event);
    }
}
