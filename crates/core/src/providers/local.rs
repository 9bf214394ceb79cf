//! Adapter for a self-hosted Ollama-style generation server.

use super::{GenerationOptions, ProviderAdapter, excerpt, send};
use crate::config::ProviderKind;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

const PROVIDER: ProviderKind = ProviderKind::Local;

pub struct LocalAdapter {
    client: reqwest::Client,
    endpoint: url::Url,
    model: String,
    custom_options: Map<String, Value>,
}

impl LocalAdapter {
    /// `custom_options` is user JSON merged over the generated options.
    /// Anything that is not a JSON object is logged and ignored.
    pub fn new(client: reqwest::Client, endpoint: url::Url, model: &str, custom_options: Option<&str>) -> Self {
        Self {
            client,
            endpoint,
            model: model.to_string(),
            custom_options: custom_options.map(parse_custom_options).unwrap_or_default(),
        }
    }

    fn options(&self, options: GenerationOptions) -> Map<String, Value> {
        let mut merged = Map::new();
        merged.insert("num_predict".into(), json!(options.max_output_units));
        merged.insert("temperature".into(), json!(options.temperature));
        for (key, value) in &self.custom_options {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    fn request_body(&self, image_base64: &str, instruction: &str, options: GenerationOptions) -> Value {
        json!({
            "model": self.model,
            "prompt": instruction,
            "images": [image_base64],
            "stream": false,
            "options": self.options(options),
        })
    }
}

fn parse_custom_options(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("Local server custom options are not a JSON object, ignoring");
            Map::new()
        }
        Err(e) => {
            warn!(error = %e, "Local server custom options are not valid JSON, ignoring");
            Map::new()
        }
    }
}

/// Reads the answer from `response`, `text` or `message.content`.
fn extract_text(body: &Value) -> Option<&str> {
    body.get("response")
        .and_then(Value::as_str)
        .or_else(|| body.get("text").and_then(Value::as_str))
        .or_else(|| body.pointer("/message/content").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

#[async_trait]
impl ProviderAdapter for LocalAdapter {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, image_base64: &str, instruction: &str, options: GenerationOptions) -> Result<String> {
        debug!(endpoint = %self.endpoint, model = %self.model, "Calling local server");

        let request = self
            .client
            .post(self.endpoint.clone())
            .json(&self.request_body(image_base64, instruction, options));
        let (status, body) = send(PROVIDER, request).await?;

        if !status.is_success() {
            warn!(status = %status, "Local server error response");
            return Err(AppError::Http {
                provider: PROVIDER,
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;
        extract_text(&parsed)
            .map(str::to_string)
            .ok_or(AppError::EmptyResponse { provider: PROVIDER })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const OPTIONS: GenerationOptions = GenerationOptions {
        max_output_units: 300,
        temperature: 0.5,
    };

    fn adapter(server: &mockito::ServerGuard, custom: Option<&str>) -> LocalAdapter {
        let endpoint = url::Url::parse(&format!("{}/api/generate", server.url())).unwrap();
        LocalAdapter::new(reqwest::Client::new(), endpoint, "llava:7b", custom)
    }

    #[tokio::test]
    async fn posts_model_prompt_and_image() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({
                "model": "llava:7b",
                "prompt": "describe",
                "images": ["QUJD"],
                "stream": false,
                "options": { "num_predict": 300 }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response":" misty forest ","done":true}"#)
            .create_async()
            .await;

        let text = adapter(&server, None).generate("QUJD", "describe", OPTIONS).await.unwrap();
        assert_eq!(text, "misty forest");
        mock.assert_async().await;
    }

    #[test]
    fn custom_options_override_generated_ones() {
        let server_url = url::Url::parse("http://localhost:11434/api/generate").unwrap();
        let adapter = LocalAdapter::new(
            reqwest::Client::new(),
            server_url,
            "llava:7b",
            Some(r#"{"temperature": 0.9, "top_k": 40}"#),
        );
        let options = adapter.options(OPTIONS);
        assert_eq!(options["num_predict"], json!(300));
        assert_eq!(options["temperature"], json!(0.9));
        assert_eq!(options["top_k"], json!(40));
    }

    #[test]
    fn invalid_custom_options_are_ignored() {
        assert!(parse_custom_options("{not json").is_empty());
        assert!(parse_custom_options("[1, 2]").is_empty());
    }

    #[test]
    fn text_falls_back_to_alternate_fields() {
        assert_eq!(extract_text(&json!({ "text": "a" })), Some("a"));
        assert_eq!(extract_text(&json!({ "message": { "content": "b" } })), Some("b"));
        assert_eq!(extract_text(&json!({ "response": "" })), None);
    }

    #[tokio::test]
    async fn server_error_is_http_with_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(500)
            .with_body("model not loaded")
            .create_async()
            .await;

        let err = adapter(&server, None).generate("QUJD", "describe", OPTIONS).await.unwrap_err();
        match err {
            AppError::Http { provider, status, body } => {
                assert_eq!(provider, ProviderKind::Local);
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_answer_is_empty_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"done":true}"#)
            .create_async()
            .await;

        let err = adapter(&server, None).generate("QUJD", "describe", OPTIONS).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyResponse { provider: ProviderKind::Local }));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let endpoint = url::Url::parse("http://127.0.0.1:1/api/generate").unwrap();
        let adapter = LocalAdapter::new(reqwest::Client::new(), endpoint, "llava:7b", None);

        let err = adapter.generate("QUJD", "describe", OPTIONS).await.unwrap_err();
        assert!(matches!(err, AppError::EndpointUnreachable { provider: ProviderKind::Local, .. }));
    }
}
