//! Structure inference: segment plain text into a [`StructuredPaper`].
//!
//! ## Retry Strategy
//!
//! Transport faults are retried with exponential backoff
//! (`retry_backoff_ms * 2^attempt`) up to `max_retries` times; the default is
//! no retries, leaving the decision to the caller. A response that arrives
//! but cannot be parsed is never retried: it is returned as
//! [`ServiceError::Malformed`].

use crate::config::TransformConfig;
use crate::error::ServiceError;
use crate::paper::StructuredPaper;
use crate::prompts::{structure_user_prompt, STRUCTURE_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Segments extracted text into the parts of a research paper.
#[async_trait]
pub trait StructureInference: Send + Sync {
    async fn infer(&self, text: &str) -> Result<StructuredPaper, ServiceError>;
}

/// [`StructureInference`] backed by an `edgequake-llm` chat provider.
pub struct LlmStructureInference {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmStructureInference {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TransformConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| STRUCTURE_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }
}

#[async_trait]
impl StructureInference for LlmStructureInference {
    async fn infer(&self, text: &str) -> Result<StructuredPaper, ServiceError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(structure_user_prompt(text)),
        ];

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Structure inference: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "Structure inference: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return parse_structure_response(&response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Structure inference: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(ServiceError::Transport(
            last_err.unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }
}

/// Delay before retry `attempt` (1-based): doubles each time, saturating.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn build_options(config: &TransformConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*```[A-Za-z0-9_-]*\s*$").unwrap());

/// Parse a model reply into a [`StructuredPaper`].
///
/// Code fences are removed and the JSON object is taken from the first `{`
/// to the last `}`, so prose around the object is tolerated.
pub fn parse_structure_response(raw: &str) -> Result<StructuredPaper, ServiceError> {
    let unfenced = RE_CODE_FENCE.replace_all(raw, "");
    let (Some(open), Some(close)) = (unfenced.find('{'), unfenced.rfind('}')) else {
        return Err(ServiceError::Malformed("no JSON object in response".into()));
    };
    if close < open {
        return Err(ServiceError::Malformed("no JSON object in response".into()));
    }
    serde_json::from_str(&unfenced[open..=close])
        .map_err(|e| ServiceError::Malformed(format!("invalid structure JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_follow_config() {
        let config = TransformConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(16384));
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 4), 4000);
        assert_eq!(backoff_ms(500, 65), u64::MAX);
        assert_eq!(backoff_ms(0, 200), 0);
    }

    #[test]
    fn fenced_json_is_parsed() {
        let raw = "```json\n{\"title\": \"Deep Nets\", \"authors\": \"A. One, B. Two\"}\n```";
        let paper = parse_structure_response(raw).unwrap();
        assert_eq!(paper.title, "Deep Nets");
        assert_eq!(paper.authors, vec!["A. One", "B. Two"]);
    }

    #[test]
    fn surrounding_prose_is_ignored() {
        let raw = "Here is the structure:\n{\"title\": \"T\", \"references\": [\"R1\"]}\nDone.";
        let paper = parse_structure_response(raw).unwrap();
        assert_eq!(paper.references, vec!["R1"]);
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            parse_structure_response("I cannot help with that."),
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(
            parse_structure_response("} backwards {"),
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(
            parse_structure_response("{\"title\": }"),
            Err(ServiceError::Malformed(_))
        ));
    }
}
