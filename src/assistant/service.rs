//! The language service behind the assistant.

use super::encode::{encode_upload, png_data_url};
use super::ImageSize;
use crate::config::AssistantConfig;
use crate::error::{PipelineError, ServiceError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Text, vision and image-generation calls the assistant relies on.
#[async_trait]
pub trait LanguageService: Send + Sync {
    /// One system + one user turn; returns the reply text.
    async fn chat(&self, system: &str, user: &str) -> Result<String, ServiceError>;

    /// Ask about an uploaded image (PNG or JPEG bytes).
    async fn analyze_image(&self, instruction: &str, image: &[u8]) -> Result<String, ServiceError>;

    /// Generate an image; returns a `data:` or `https:` URL.
    async fn generate_image(&self, prompt: &str, size: ImageSize) -> Result<String, ServiceError>;
}

/// [`LanguageService`] over an `edgequake-llm` provider, with image
/// generation through an OpenAI-compatible `images/generations` endpoint.
pub struct LlmLanguageService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    http: reqwest::Client,
    image_endpoint: String,
    image_model: String,
    image_api_key: Option<String>,
    timeout: Duration,
}

impl LlmLanguageService {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AssistantConfig) -> Result<Self, PipelineError> {
        let timeout = Duration::from_secs(config.api_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            provider,
            options: CompletionOptions {
                temperature: Some(config.temperature),
                max_tokens: Some(config.max_tokens),
                ..Default::default()
            },
            http,
            image_endpoint: config.image_endpoint.clone(),
            image_model: config.image_model.clone(),
            image_api_key: std::env::var(&config.image_api_key_env)
                .ok()
                .filter(|k| !k.is_empty()),
            timeout,
        })
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ServiceError> {
        let call = self.provider.chat(&messages, Some(&self.options));
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ServiceError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        debug!(
            "Assistant: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u32,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
}

#[async_trait]
impl LanguageService for LlmLanguageService {
    async fn chat(&self, system: &str, user: &str) -> Result<String, ServiceError> {
        self.complete(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .await
    }

    async fn analyze_image(&self, instruction: &str, image: &[u8]) -> Result<String, ServiceError> {
        let data = encode_upload(image)
            .map_err(|e| ServiceError::Malformed(format!("unreadable image: {e}")))?;
        self.complete(vec![ChatMessage::user_with_images(instruction, vec![data])])
            .await
    }

    async fn generate_image(&self, prompt: &str, size: ImageSize) -> Result<String, ServiceError> {
        let Some(key) = &self.image_api_key else {
            return Err(ServiceError::Unsupported(
                "image generation needs an API key for the image endpoint".into(),
            ));
        };

        let body = ImageRequest {
            model: &self.image_model,
            prompt,
            size: size.dimensions(),
            n: 1,
        };

        let response = self
            .http
            .post(&self.image_endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout {
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    ServiceError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::Transport(format!(
                "image endpoint returned HTTP {}",
                response.status()
            )));
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .find_map(|d| match (d.b64_json, d.url) {
                (Some(b64), _) if !b64.is_empty() => Some(png_data_url(&b64)),
                (_, Some(url)) if !url.is_empty() => Some(url),
                _ => None,
            })
            .ok_or_else(|| ServiceError::Malformed("no image in response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_response_accepts_either_field() {
        let b64: ImageResponse = serde_json::from_str(r#"{"data":[{"b64_json":"QUJD"}]}"#).unwrap();
        assert_eq!(b64.data[0].b64_json.as_deref(), Some("QUJD"));
        let url: ImageResponse =
            serde_json::from_str(r#"{"created":1,"data":[{"url":"https://x/y.png"}]}"#).unwrap();
        assert_eq!(url.data[0].url.as_deref(), Some("https://x/y.png"));
        let empty: ImageResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.data.is_empty());
    }

    #[test]
    fn image_request_shape() {
        let body = ImageRequest {
            model: "gpt-image-1",
            prompt: "Scientific figure: a plot",
            size: ImageSize::OneK.dimensions(),
            n: 1,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["size"], "1024x1024");
        assert_eq!(json["n"], 1);
    }
}
