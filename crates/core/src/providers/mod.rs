//! AI provider adapters.
//!
//! Every backend implements [`ProviderAdapter`]: one image, one instruction,
//! one budget in; text or a provider-tagged [`AppError`] out. The adapter for
//! a call is built from a fresh [`ProviderConfig`] by a [`ProviderFactory`].

mod gemini;
mod local;
mod openai;

pub use gemini::GeminiAdapter;
pub use local::LocalAdapter;
pub use openai::OpenAiAdapter;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{AppError, Result};
use crate::templates::PromptTemplate;
use async_trait::async_trait;
use std::sync::Arc;

/// Bounds for one generation call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationOptions {
    /// Upper bound on output tokens.
    pub max_output_units: u32,
    pub temperature: f32,
}

impl From<&PromptTemplate> for GenerationOptions {
    fn from(template: &PromptTemplate) -> Self {
        Self {
            max_output_units: template.max_output_units,
            temperature: template.temperature,
        }
    }
}

/// A multimodal backend that turns an image plus instruction into text.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Sends `image_base64` (PNG) with `instruction` and returns the raw text.
    async fn generate(
        &self,
        image_base64: &str,
        instruction: &str,
        options: GenerationOptions,
    ) -> Result<String>;
}

/// Builds the adapter for a provider configuration.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>>;
}

/// Factory for the real HTTP adapters.
///
/// The OpenAI and local adapters share one connection pool; the Gemini
/// client manages its own.
#[derive(Clone)]
pub struct HttpProviderFactory {
    client: reqwest::Client,
}

impl HttpProviderFactory {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("screen-prompt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>> {
        let adapter: Arc<dyn ProviderAdapter> = match config {
            ProviderConfig::OpenAi { api_key, model, base_url } => Arc::new(OpenAiAdapter::new(
                self.client.clone(),
                base_url,
                api_key,
                model,
            )),
            ProviderConfig::Gemini { api_key, model, base_url } => {
                Arc::new(GeminiAdapter::new(base_url, api_key, model)?)
            }
            ProviderConfig::Local { endpoint, model, custom_options } => Arc::new(LocalAdapter::new(
                self.client.clone(),
                endpoint.clone(),
                model,
                custom_options.as_deref(),
            )),
        };
        Ok(adapter)
    }
}

/// Sends a request and returns its status and body.
///
/// Transport failures become [`AppError::EndpointUnreachable`].
pub(crate) async fn send(
    provider: ProviderKind,
    request: reqwest::RequestBuilder,
) -> Result<(reqwest::StatusCode, String)> {
    let response = request.send().await.map_err(|e| AppError::EndpointUnreachable {
        provider,
        detail: e.to_string(),
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| AppError::EndpointUnreachable {
        provider,
        detail: format!("failed to read response: {}", e),
    })?;

    Ok((status, body))
}

/// Keeps error bodies short enough for a result window.
pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}

/// `{base}/{path}` regardless of trailing slashes on the base.
pub(crate) fn endpoint(base: &url::Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
