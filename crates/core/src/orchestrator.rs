//! Sequencing of one generation request.
//!
//! The orchestrator owns the session's single-slot memory (last captured
//! image, last selected mode), resolves the provider from freshly loaded
//! settings on every call, and reports progress to a [`PresentationTarget`].
//!
//! Overlapping requests for the same target are not cancelled. Each request
//! takes a token for its target and only the newest token may publish its
//! final result; an older answer that arrives late is returned to its caller
//! but not shown.

use crate::config::{ProviderConfig, SettingsStore};
use crate::error::{AppError, Result};
use crate::image_processing::CapturedImage;
use crate::presentation::{PresentationEvent, PresentationTarget, PromptDisplay};
use crate::providers::{GenerationOptions, ProviderFactory};
use crate::templates::{GenerationMode, PromptTemplateCatalog};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Message shown when regenerating before anything was captured.
pub const NO_SESSION_IMAGE: &str = "No image has been captured in this session.";

/// Outcome of one generation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationResult {
    Success { text: String },
    Failure { message: String },
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success { text } => Some(text),
            Self::Failure { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Success { text } => text,
            Self::Failure { message } => message,
        }
    }
}

#[derive(Default)]
struct SessionState {
    last_image: Option<CapturedImage>,
    last_mode: GenerationMode,
    issued: u64,
    latest: HashMap<String, u64>,
}

pub struct GenerationOrchestrator {
    settings: Arc<dyn SettingsStore>,
    providers: Arc<dyn ProviderFactory>,
    session: Mutex<SessionState>,
}

impl GenerationOrchestrator {
    pub fn new(settings: Arc<dyn SettingsStore>, providers: Arc<dyn ProviderFactory>) -> Self {
        Self {
            settings,
            providers,
            session: Mutex::new(SessionState::default()),
        }
    }

    /// Replaces the session's captured image.
    pub fn store_capture(&self, image: CapturedImage) {
        debug!(bytes = image.byte_len(), "Stored capture");
        self.session.lock().last_image = Some(image);
    }

    pub fn last_image(&self) -> Option<CapturedImage> {
        self.session.lock().last_image.clone()
    }

    pub fn last_mode(&self) -> GenerationMode {
        self.session.lock().last_mode
    }

    /// Runs one generation for `image`.
    ///
    /// `mode` defaults to the last selected mode and is recorded as the last
    /// selected mode whatever the outcome. The target first receives a loading
    /// message, then the final text or error if this is still its newest
    /// request. Failures never escape as errors; they come back as
    /// [`GenerationResult::Failure`].
    pub async fn generate(
        &self,
        mode: Option<GenerationMode>,
        image: Option<&CapturedImage>,
        target: &dyn PresentationTarget,
    ) -> GenerationResult {
        let (mode, token) = self.begin(mode, target.key());

        let Some(image) = image else {
            warn!(mode = %mode, "Generation requested without an image");
            let message = AppError::ImageMissing.to_string();
            self.finish(target, token, error_event(&message, Some(mode)));
            return GenerationResult::Failure { message };
        };

        target.present(PresentationEvent::Loading(PromptDisplay {
            prompt: format!("Generating prompt for {}...", mode.label()),
            selected_model: mode,
        }));

        match self.run_provider(mode, image).await {
            Ok(text) => {
                self.finish(
                    target,
                    token,
                    PresentationEvent::Ready(PromptDisplay {
                        prompt: text.clone(),
                        selected_model: mode,
                    }),
                );
                GenerationResult::Success { text }
            }
            Err(err) => {
                warn!(mode = %mode, provider = ?err.provider(), error = %err, "Generation failed");
                let message = format!("Optimization failed for {}: {}", mode.label(), err);
                self.finish(target, token, error_event(&message, Some(mode)));
                GenerationResult::Failure { message }
            }
        }
    }

    /// Re-runs generation on the last captured image with a new mode.
    pub async fn regenerate(&self, mode: GenerationMode, target: &dyn PresentationTarget) -> GenerationResult {
        let Some(image) = self.last_image() else {
            let (_, token) = self.begin(Some(mode), target.key());
            self.finish(target, token, error_event(NO_SESSION_IMAGE, Some(mode)));
            return GenerationResult::Failure {
                message: NO_SESSION_IMAGE.to_string(),
            };
        };
        self.generate(Some(mode), Some(&image), target).await
    }

    /// Shows a capture-path failure on `target`.
    ///
    /// Requests still in flight for `target` are superseded, so their late
    /// answers do not replace the error.
    pub fn report_capture_error(&self, err: &AppError, target: &dyn PresentationTarget) {
        warn!(error = %err, "Capture failed");
        let token = Self::next_token(&mut self.session.lock(), target.key());
        self.finish(target, token, error_event(&format!("Capture Error: {}", err), None));
    }

    /// Records the mode and takes a fresh token for `target_key`.
    fn begin(&self, mode: Option<GenerationMode>, target_key: &str) -> (GenerationMode, u64) {
        let mut session = self.session.lock();
        let mode = mode.unwrap_or(session.last_mode);
        session.last_mode = mode;
        (mode, Self::next_token(&mut session, target_key))
    }

    fn next_token(session: &mut SessionState, target_key: &str) -> u64 {
        session.issued += 1;
        let token = session.issued;
        session.latest.insert(target_key.to_string(), token);
        token
    }

    fn is_current(&self, target_key: &str, token: u64) -> bool {
        self.session.lock().latest.get(target_key) == Some(&token)
    }

    fn finish(&self, target: &dyn PresentationTarget, token: u64, event: PresentationEvent) {
        if self.is_current(target.key(), token) {
            target.present(event);
        } else {
            info!(presentation = target.key(), token, "Superseded by a newer request, result not shown");
        }
    }

    async fn run_provider(&self, mode: GenerationMode, image: &CapturedImage) -> Result<String> {
        let settings = self.settings.load()?;
        let config = ProviderConfig::from_settings(&settings)?;
        let adapter = self.providers.build(&config)?;
        let template = PromptTemplateCatalog::get(mode);

        info!(
            provider = %adapter.kind(),
            model = adapter.model(),
            mode = %mode,
            image_bytes = image.byte_len(),
            "Generating"
        );
        let raw = adapter
            .generate(image.base64(), template.instruction, GenerationOptions::from(template))
            .await?;

        let text = template.clean(&raw);
        if text.is_empty() {
            return Err(AppError::EmptyResponse {
                provider: adapter.kind(),
            });
        }
        Ok(text)
    }
}

fn error_event(message: &str, selected_model: Option<GenerationMode>) -> PresentationEvent {
    PresentationEvent::Error {
        message: message.to_string(),
        selected_model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemorySettingsStore, ProviderKind, Settings};
    use crate::geometry::FrameSize;
    use crate::presentation::RecordingTarget;
    use crate::providers::ProviderAdapter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// Answers with `reply` (`None` rejects the key), or waits on a gate
    /// when one is queued.
    struct FakeAdapter {
        reply: Option<String>,
        calls: Arc<AtomicUsize>,
        gates: Mutex<Vec<oneshot::Receiver<String>>>,
        instructions: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn model(&self) -> &str {
            "fake"
        }

        async fn generate(&self, _image: &str, instruction: &str, _options: GenerationOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.instructions.lock().push(instruction.to_string());
            let gate = {
                let mut gates = self.gates.lock();
                if gates.is_empty() { None } else { Some(gates.remove(0)) }
            };
            if let Some(gate) = gate {
                return gate.await.map_err(|_| AppError::EmptyResponse { provider: ProviderKind::OpenAi });
            }
            self.reply
                .clone()
                .ok_or(AppError::InvalidCredentials { provider: ProviderKind::OpenAi })
        }
    }

    /// Hands out the shared adapter and remembers which provider each
    /// call was configured for.
    struct FakeFactory {
        adapter: Arc<FakeAdapter>,
        configured: Arc<Mutex<Vec<ProviderKind>>>,
    }

    impl ProviderFactory for FakeFactory {
        fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>> {
            self.configured.lock().push(config.kind());
            Ok(self.adapter.clone())
        }
    }

    struct Harness {
        orchestrator: GenerationOrchestrator,
        settings: Arc<MemorySettingsStore>,
        calls: Arc<AtomicUsize>,
        instructions: Arc<Mutex<Vec<String>>>,
        configured: Arc<Mutex<Vec<ProviderKind>>>,
    }

    fn harness(reply: Option<String>, gates: Vec<oneshot::Receiver<String>>) -> Harness {
        let settings = Settings {
            openai_api_key: "sk-test".into(),
            ..Settings::default()
        };
        harness_with(settings, reply, gates)
    }

    fn harness_with(settings: Settings, reply: Option<String>, gates: Vec<oneshot::Receiver<String>>) -> Harness {
        let calls = Arc::new(AtomicUsize::new(0));
        let instructions = Arc::new(Mutex::new(Vec::new()));
        let adapter = Arc::new(FakeAdapter {
            reply,
            calls: calls.clone(),
            gates: Mutex::new(gates),
            instructions: instructions.clone(),
        });
        let configured = Arc::new(Mutex::new(Vec::new()));
        let settings = Arc::new(MemorySettingsStore::new(settings));
        let orchestrator = GenerationOrchestrator::new(
            settings.clone(),
            Arc::new(FakeFactory {
                adapter,
                configured: configured.clone(),
            }),
        );
        Harness {
            orchestrator,
            settings,
            calls,
            instructions,
            configured,
        }
    }

    fn image() -> CapturedImage {
        CapturedImage::from_png(vec![0x89, b'P', b'N', b'G'], FrameSize::new(1, 1)).unwrap()
    }

    #[tokio::test]
    async fn missing_image_fails_without_provider_call_and_records_mode() {
        let h = harness(Some("unused".into()), Vec::new());
        let target = RecordingTarget::new("result");

        let result = h
            .orchestrator
            .generate(Some(GenerationMode::Midjourney), None, &target)
            .await;

        assert_eq!(
            result,
            GenerationResult::Failure {
                message: "No image captured to generate prompt from.".into()
            }
        );
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.orchestrator.last_mode(), GenerationMode::Midjourney);
        assert_eq!(target.events().len(), 1);
    }

    #[tokio::test]
    async fn success_cleans_text_and_presents_loading_then_ready() {
        let h = harness(Some("/imagine prompt: red fox, snow --ar 16:9".into()), Vec::new());
        let target = RecordingTarget::new("result");

        let result = h
            .orchestrator
            .generate(Some(GenerationMode::Midjourney), Some(&image()), &target)
            .await;

        assert_eq!(result.text(), Some("red fox, snow --ar 16:9"));
        let events = target.events();
        assert_eq!(
            events[0],
            PresentationEvent::Loading(PromptDisplay {
                prompt: "Generating prompt for Midjourney...".into(),
                selected_model: GenerationMode::Midjourney,
            })
        );
        assert_eq!(
            events[1],
            PresentationEvent::Ready(PromptDisplay {
                prompt: "red fox, snow --ar 16:9".into(),
                selected_model: GenerationMode::Midjourney,
            })
        );
        assert_eq!(
            h.instructions.lock()[0],
            PromptTemplateCatalog::get(GenerationMode::Midjourney).instruction
        );
    }

    #[tokio::test]
    async fn provider_error_is_wrapped_with_mode() {
        let h = harness(None, Vec::new());
        let target = RecordingTarget::new("result");

        let result = h
            .orchestrator
            .generate(Some(GenerationMode::StableDiffusion), Some(&image()), &target)
            .await;

        assert_eq!(
            result.message(),
            "Optimization failed for Stable Diffusion: OpenAI rejected the API key: invalid credentials"
        );
        assert!(matches!(target.last(), Some(PresentationEvent::Error { .. })));
    }

    #[tokio::test]
    async fn missing_configuration_fails_as_generation_error() {
        let h = harness_with(Settings::default(), Some("unused".into()), Vec::new());
        let target = RecordingTarget::new("result");

        let result = h.orchestrator.generate(None, Some(&image()), &target).await;

        assert!(!result.is_success());
        assert!(result.message().starts_with("Optimization failed for Natural Language:"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn settings_are_reread_for_every_call() {
        let h = harness(Some("text".into()), Vec::new());
        let target = RecordingTarget::new("result");
        let img = image();

        h.orchestrator.generate(None, Some(&img), &target).await;
        h.settings.update(|s| {
            s.api_provider = ProviderKind::Gemini;
            s.google_api_key = "g-key".into();
        });
        h.orchestrator.generate(None, Some(&img), &target).await;

        assert_eq!(*h.configured.lock(), vec![ProviderKind::OpenAi, ProviderKind::Gemini]);
    }

    #[tokio::test]
    async fn repeated_calls_each_reach_the_provider() {
        let h = harness(Some("a quiet harbor".into()), Vec::new());
        let target = RecordingTarget::new("result");
        let img = image();
        h.orchestrator.store_capture(img.clone());

        let first = h.orchestrator.generate(Some(GenerationMode::NaturalLanguage), Some(&img), &target).await;
        let second = h.orchestrator.generate(Some(GenerationMode::NaturalLanguage), Some(&img), &target).await;

        assert_eq!(first, second);
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.orchestrator.last_mode(), GenerationMode::NaturalLanguage);
        assert_eq!(h.orchestrator.last_image(), Some(img));
    }

    #[tokio::test]
    async fn omitted_mode_reuses_last_selected() {
        let h = harness(Some("text".into()), Vec::new());
        let target = RecordingTarget::new("result");
        h.orchestrator
            .generate(Some(GenerationMode::Cinematographer), None, &target)
            .await;

        h.orchestrator.generate(None, Some(&image()), &target).await;

        assert_eq!(h.orchestrator.last_mode(), GenerationMode::Cinematographer);
        assert_eq!(
            h.instructions.lock()[0],
            PromptTemplateCatalog::get(GenerationMode::Cinematographer).instruction
        );
    }

    #[tokio::test]
    async fn regenerate_without_capture_reports_session_message() {
        let h = harness(Some("text".into()), Vec::new());
        let target = RecordingTarget::new("result");

        let result = h.orchestrator.regenerate(GenerationMode::Description, &target).await;

        assert_eq!(result.message(), NO_SESSION_IMAGE);
        assert_eq!(h.orchestrator.last_mode(), GenerationMode::Description);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn regenerate_uses_stored_capture() {
        let h = harness(Some("plain description".into()), Vec::new());
        let target = RecordingTarget::new("result");
        h.orchestrator.store_capture(image());

        let result = h.orchestrator.regenerate(GenerationMode::Description, &target).await;

        assert_eq!(result.text(), Some("plain description"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_answer_is_returned_but_not_presented() {
        let (slow_tx, slow_rx) = oneshot::channel();
        let (fast_tx, fast_rx) = oneshot::channel();
        let h = harness(Some("unused".into()), vec![slow_rx, fast_rx]);
        let target = RecordingTarget::new("result");
        let img = image();

        let slow = h.orchestrator.generate(Some(GenerationMode::Midjourney), Some(&img), &target);
        let fast = h.orchestrator.generate(Some(GenerationMode::Cinematographer), Some(&img), &target);
        let answer = async {
            tokio::task::yield_now().await;
            fast_tx.send("newer".to_string()).unwrap();
            tokio::task::yield_now().await;
            slow_tx.send("older".to_string()).unwrap();
        };
        let (slow, fast, ()) = futures::join!(slow, fast, answer);

        assert_eq!(slow.text(), Some("older"));
        assert_eq!(fast.text(), Some("newer"));

        let finals: Vec<_> = target.events().into_iter().filter(|e| e.is_final()).collect();
        assert_eq!(
            finals,
            vec![PresentationEvent::Ready(PromptDisplay {
                prompt: "newer".into(),
                selected_model: GenerationMode::Cinematographer,
            })]
        );
    }

    #[tokio::test]
    async fn capture_error_supersedes_pending_generation() {
        let (old_tx, old_rx) = oneshot::channel();
        let h = harness(Some("unused".into()), vec![old_rx]);
        let target = RecordingTarget::new("result");
        let img = image();

        let pending = h.orchestrator.generate(Some(GenerationMode::Midjourney), Some(&img), &target);
        let fail_then_answer = async {
            h.orchestrator.report_capture_error(&AppError::NoSourcesFound, &target);
            old_tx.send("old prompt".to_string()).unwrap();
        };
        let (old, ()) = futures::join!(pending, fail_then_answer);

        assert_eq!(old.text(), Some("old prompt"));
        assert_eq!(
            target.last(),
            Some(PresentationEvent::Error {
                message: "Capture Error: No screen sources found".into(),
                selected_model: None,
            })
        );
        assert!(!target.events().iter().any(|e| matches!(e, PresentationEvent::Ready(_))));
    }

    #[tokio::test]
    async fn targets_do_not_supersede_each_other() {
        let h = harness(Some("text".into()), Vec::new());
        let left = RecordingTarget::new("left");
        let right = RecordingTarget::new("right");
        let img = image();

        let (a, b) = futures::join!(
            h.orchestrator.generate(Some(GenerationMode::Midjourney), Some(&img), &left),
            h.orchestrator.generate(Some(GenerationMode::Midjourney), Some(&img), &right),
        );

        assert!(a.is_success() && b.is_success());
        assert!(matches!(left.last(), Some(PresentationEvent::Ready(_))));
        assert!(matches!(right.last(), Some(PresentationEvent::Ready(_))));
    }

    #[test]
    fn capture_errors_are_prefixed() {
        let h = harness(Some("text".into()), Vec::new());
        let target = RecordingTarget::new("result");

        h.orchestrator.report_capture_error(&AppError::NoSourcesFound, &target);

        assert_eq!(
            target.last(),
            Some(PresentationEvent::Error {
                message: "Capture Error: No screen sources found".into(),
                selected_model: None,
            })
        );
    }
}
