//! Gemini adapter on top of the `gemini-rust` client.
//!
//! The request carries explicit safety thresholds, and the response's block
//! signals are checked before any text is read.

use super::{GenerationOptions, ProviderAdapter, excerpt};
use crate::config::ProviderKind;
use crate::error::{AppError, Result};
use crate::image_processing::CapturedImage;
use async_trait::async_trait;
use gemini_rust::{
    Blob, BlockReason, ClientError, Content, ContentBuilder, FinishReason, Gemini, GenerationResponse,
    HarmBlockThreshold, HarmCategory, Message, Part, Role, SafetySetting,
};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

const PROVIDER: ProviderKind = ProviderKind::Gemini;

/// Finish reasons that mean the answer was withheld rather than empty.
const BLOCKING_FINISH_REASONS: [FinishReason; 5] = [
    FinishReason::Safety,
    FinishReason::ProhibitedContent,
    FinishReason::Blocklist,
    FinishReason::Spii,
    FinishReason::Recitation,
];

pub struct GeminiAdapter {
    client: Gemini,
    model: String,
}

impl GeminiAdapter {
    /// Creates a client for `model` under `base_url`.
    ///
    /// The model may be given with or without its `models/` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidCredentials`] if the key cannot be sent as
    /// a header.
    pub fn new(base_url: &Url, api_key: &str, model: &str) -> Result<Self> {
        let model = model.strip_prefix("models/").unwrap_or(model).to_string();

        let client = Gemini::with_model_and_base_url(api_key, format!("models/{}", model), as_directory(base_url))
            .map_err(|e| match e {
                ClientError::InvalidApiKey { .. } => AppError::InvalidCredentials { provider: PROVIDER },
                other => AppError::config(format!("Failed to create Gemini client: {}", other)),
            })?;

        Ok(Self { client, model })
    }

    fn request(&self, image_base64: &str, instruction: &str, options: GenerationOptions) -> ContentBuilder {
        let content = Content {
            role: Some(Role::User),
            parts: Some(vec![
                Part::InlineData {
                    inline_data: Blob::new(CapturedImage::MIME_TYPE, image_base64),
                    media_resolution: None,
                },
                Part::Text {
                    text: instruction.to_string(),
                    thought: None,
                    thought_signature: None,
                },
            ]),
        };

        self.client
            .generate_content()
            .with_message(Message {
                role: Role::User,
                content,
            })
            .with_safety_settings(safety_settings())
            .with_max_output_tokens(i32::try_from(options.max_output_units).unwrap_or(i32::MAX))
            .with_temperature(options.temperature)
    }
}

fn safety_settings() -> Vec<SafetySetting> {
    [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: HarmBlockThreshold::BlockMediumAndAbove,
    })
    .collect()
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn as_directory(base: &Url) -> Url {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// The API's own spelling of an enum value, e.g. `SAFETY`.
fn wire_name(value: &(impl Serialize + fmt::Debug)) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", value))
}

fn is_key_rejection(status: u16, body: &str) -> bool {
    matches!(status, 401 | 403)
        || (status == 400 && (body.contains("API key not valid") || body.contains("API_KEY_INVALID")))
}

fn map_client_error(err: ClientError) -> AppError {
    match err {
        ClientError::BadResponse { code, description } => {
            let body = description.unwrap_or_default();
            if is_key_rejection(code, &body) {
                return AppError::InvalidCredentials { provider: PROVIDER };
            }
            warn!(status = code, "Gemini error response");
            AppError::Http {
                provider: PROVIDER,
                status: code,
                body: excerpt(&body),
            }
        }
        ClientError::PerformRequestNew { source } | ClientError::PerformRequest { source, .. } => {
            AppError::EndpointUnreachable {
                provider: PROVIDER,
                detail: source.to_string(),
            }
        }
        ClientError::DecodeResponse { source } => AppError::MalformedResponse {
            provider: PROVIDER,
            detail: source.to_string(),
        },
        ClientError::ConstructUrl { suffix, .. } => AppError::NoConfiguration {
            provider: PROVIDER,
            detail: format!("invalid model path '{}'", suffix),
        },
        other => AppError::MalformedResponse {
            provider: PROVIDER,
            detail: other.to_string(),
        },
    }
}

/// Extracts the answer text, turning block signals into errors.
pub(crate) fn interpret_response(response: GenerationResponse) -> Result<String> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
        .filter(|reason| *reason != BlockReason::BlockReasonUnspecified)
    {
        return Err(AppError::ContentBlocked {
            provider: PROVIDER,
            reason: wire_name(&reason),
        });
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(AppError::EmptyResponse { provider: PROVIDER });
    };

    let text: String = candidate
        .content
        .parts
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| match part {
            Part::Text { text, thought, .. } if thought != Some(true) => Some(text),
            _ => None,
        })
        .collect();
    let text = text.trim();

    if !text.is_empty() {
        return Ok(text.to_string());
    }

    match candidate.finish_reason {
        Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason) => Err(AppError::ContentBlocked {
            provider: PROVIDER,
            reason: wire_name(&reason),
        }),
        _ => Err(AppError::EmptyResponse { provider: PROVIDER }),
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, image_base64: &str, instruction: &str, options: GenerationOptions) -> Result<String> {
        debug!(model = %self.model, max_tokens = options.max_output_units, "Calling Gemini generateContent");

        let response = self
            .request(image_base64, instruction, options)
            .execute()
            .await
            .map_err(map_client_error)?;
        interpret_response(response)
    }
}
