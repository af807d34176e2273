//! Configuration types for the transformation pipeline and the assistant.
//!
//! Pipeline behaviour is controlled through [`TransformConfig`], built via
//! [`TransformConfigBuilder`]; the assistant has its own
//! [`AssistantConfig`]. The two share nothing but provider credentials,
//! which both read from the environment.

use crate::error::PipelineError;
use crate::progress::{PipelineProgressCallback, ProgressCallback};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for a document transformation.
///
/// # Example
/// ```rust
/// use docx2ieee::{TransformConfig, VerificationMode};
///
/// let config = TransformConfig::builder()
///     .model("gpt-4.1")
///     .stage_timeout_secs(300)
///     .verification(VerificationMode::FixedDelay { ms: 800 })
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TransformConfig {
    /// Minimum trimmed character count of the extracted text. Default: 50.
    ///
    /// Below this the document is taken to have no usable structure and the
    /// run fails with `InsufficientStructure` at `Parsing`.
    pub min_text_chars: usize,

    /// LLM model identifier. If None, [`DEFAULT_MODEL`] or `EDGEQUAKE_MODEL`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for structure inference. Default: 0.0.
    ///
    /// Inference must copy text verbatim; any sampling freedom is a chance
    /// for the model to paraphrase.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 16384.
    ///
    /// The response echoes the whole paper as JSON, so this bounds the
    /// longest paper that can be transformed.
    pub max_tokens: usize,

    /// Transport-level retries inside the inference call. Default: 0.
    ///
    /// The pipeline itself never retries a stage; this only covers transient
    /// provider faults within one `Mapping` stage.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom structure-inference system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Per-stage timeout in seconds; 0 disables. Default: 180.
    pub stage_timeout_secs: u64,

    /// What the `Verifying` stage checks. Default: [`VerificationMode::Content`].
    pub verification: VerificationMode,

    /// Inserted between the original stem and `.docx`. Default: `_IEEE`.
    pub output_suffix: String,

    /// Filenames containing this (case-insensitive) are treated as
    /// protected. Default: `protected`. Empty disables the check.
    pub protected_marker: String,

    /// Fail at `Validating` when revision markers are present. Default: true.
    pub reject_tracked_changes: bool,

    /// Receives stage events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 50,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 16384,
            max_retries: 0,
            retry_backoff_ms: 500,
            system_prompt: None,
            stage_timeout_secs: 180,
            verification: VerificationMode::default(),
            output_suffix: "_IEEE".to_string(),
            protected_marker: "protected".to_string(),
            reject_tracked_changes: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TransformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformConfig")
            .field("min_text_chars", &self.min_text_chars)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("stage_timeout_secs", &self.stage_timeout_secs)
            .field("verification", &self.verification)
            .field("output_suffix", &self.output_suffix)
            .field("protected_marker", &self.protected_marker)
            .field("reject_tracked_changes", &self.reject_tracked_changes)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl TransformConfig {
    /// Create a new builder for `TransformConfig`.
    pub fn builder() -> TransformConfigBuilder {
        TransformConfigBuilder {
            config: Self::default(),
        }
    }

    /// The stage timeout as a `Duration`, or None when disabled.
    pub fn stage_timeout(&self) -> Option<Duration> {
        (self.stage_timeout_secs > 0).then(|| Duration::from_secs(self.stage_timeout_secs))
    }
}

/// Builder for [`TransformConfig`].
#[derive(Debug)]
pub struct TransformConfigBuilder {
    config: TransformConfig,
}

impl TransformConfigBuilder {
    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn stage_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stage_timeout_secs = secs;
        self
    }

    pub fn verification(mut self, mode: VerificationMode) -> Self {
        self.config.verification = mode;
        self
    }

    pub fn output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.output_suffix = suffix.into();
        self
    }

    pub fn protected_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.protected_marker = marker.into();
        self
    }

    pub fn reject_tracked_changes(mut self, v: bool) -> Self {
        self.config.reject_tracked_changes = v;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn PipelineProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TransformConfig, PipelineError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.output_suffix.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "output_suffix must not be empty; the output would overwrite its input".into(),
            ));
        }
        if c.output_suffix.contains(['/', '\\']) {
            return Err(PipelineError::InvalidConfig(format!(
                "output_suffix must not contain path separators, got {:?}",
                c.output_suffix
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the `Verifying` stage does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerificationMode {
    /// Re-read the rendered document and require every abstract, section
    /// and reference fragment to be present. (default)
    #[default]
    Content,
    /// Wait a fixed time and pass. Performs no check.
    FixedDelay { ms: u64 },
}

// ── Assistant ────────────────────────────────────────────────────────────

/// Configuration for [`crate::assistant::Assistant`].
#[derive(Clone)]
pub struct AssistantConfig {
    /// LLM model identifier. If None, [`DEFAULT_MODEL`] or `EDGEQUAKE_MODEL`.
    pub model: Option<String>,

    /// LLM provider name.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for chat and search. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens per reply. Default: 2048.
    pub max_tokens: usize,

    /// Refuse obviously out-of-domain chat queries locally, before any
    /// service call. Default: false (the service prompt enforces the policy).
    pub local_domain_guard: bool,

    /// OpenAI-compatible image generation endpoint.
    pub image_endpoint: String,

    /// Image generation model. Default: `gpt-image-1`.
    pub image_model: String,

    /// Environment variable holding the image endpoint's API key.
    pub image_api_key_env: String,

    /// Timeout for one service call, in seconds. Default: 60.
    pub api_timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_tokens: 2048,
            local_domain_guard: false,
            image_endpoint: "https://api.openai.com/v1/images/generations".to_string(),
            image_model: "gpt-image-1".to_string(),
            image_api_key_env: "OPENAI_API_KEY".to_string(),
            api_timeout_secs: 60,
        }
    }
}

impl fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("local_domain_guard", &self.local_domain_guard)
            .field("image_endpoint", &self.image_endpoint)
            .field("image_model", &self.image_model)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl AssistantConfig {
    pub fn builder() -> AssistantConfigBuilder {
        AssistantConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AssistantConfig`].
#[derive(Debug)]
pub struct AssistantConfigBuilder {
    config: AssistantConfig,
}

impl AssistantConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn local_domain_guard(mut self, v: bool) -> Self {
        self.config.local_domain_guard = v;
        self
    }

    pub fn image_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.image_endpoint = url.into();
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<AssistantConfig, PipelineError> {
        if self.config.api_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
