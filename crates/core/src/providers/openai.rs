//! OpenAI-compatible chat completions adapter.

use super::{GenerationOptions, ProviderAdapter, endpoint, excerpt, send};
use crate::config::ProviderKind;
use crate::error::{AppError, Result};
use crate::image_processing::CapturedImage;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const PROVIDER: ProviderKind = ProviderKind::OpenAi;

/// Sends one user turn holding the instruction and the image as a data URI.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client, base_url: &url::Url, api_key: &str, model: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "chat/completions"),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn request_body(&self, image_base64: &str, instruction: &str, options: GenerationOptions) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:{};base64,{}", CapturedImage::MIME_TYPE, image_base64)
                        }
                    }
                ]
            }],
            "max_tokens": options.max_output_units,
            "temperature": options.temperature,
        })
    }

    fn parse_response(body: &str) -> Result<String> {
        let completion: ChatCompletion = serde_json::from_str(body).map_err(|e| AppError::MalformedResponse {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(AppError::EmptyResponse { provider: PROVIDER })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, image_base64: &str, instruction: &str, options: GenerationOptions) -> Result<String> {
        debug!(
            model = %self.model,
            max_tokens = options.max_output_units,
            image_len = image_base64.len(),
            "Calling OpenAI chat completions"
        );

        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image_base64, instruction, options));
        let (status, body) = send(PROVIDER, request).await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::InvalidCredentials { provider: PROVIDER });
        }
        if !status.is_success() {
            warn!(status = %status, "OpenAI error response");
            return Err(AppError::Http {
                provider: PROVIDER,
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        Self::parse_response(&body)
    }
}
