//! Conversational research assistant.
//!
//! Stateless per query and independent of the pipeline. The assistant never
//! returns an error: greetings get a canned reply without any service call,
//! out-of-domain or empty answers become the fixed refusal, and service
//! failures become a fixed apology.
//!
//! | Mode             | Service call                                  |
//! |------------------|-----------------------------------------------|
//! | `chat`           | domain-restricted chat                        |
//! | `search`         | chat asked to cite sources; URLs are returned |
//! | `image-generate` | image endpoint, `Scientific figure: …` prompt |
//! | `image-analyze`  | vision chat on the uploaded image             |

pub mod encode;
pub mod service;

pub use service::{LanguageService, LlmLanguageService};

use crate::config::AssistantConfig;
use crate::error::PipelineError;
use crate::prompts::{
    figure_prompt, APOLOGY_MESSAGE, ASSISTANT_SYSTEM_PROMPT, GREETING_MESSAGE,
    IMAGE_ANALYSIS_PROMPT, REFUSAL_MESSAGE, SEARCH_SYSTEM_PROMPT,
};
use crate::provider::resolve_provider;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a query is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssistantMode {
    #[default]
    Chat,
    Search,
    ImageGenerate,
    ImageAnalyze,
}

impl AssistantMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AssistantMode::Chat => "chat",
            AssistantMode::Search => "search",
            AssistantMode::ImageGenerate => "image-generate",
            AssistantMode::ImageAnalyze => "image-analyze",
        }
    }
}

impl fmt::Display for AssistantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssistantMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(AssistantMode::Chat),
            "search" => Ok(AssistantMode::Search),
            "image-generate" | "generate" => Ok(AssistantMode::ImageGenerate),
            "image-analyze" | "analyze" => Ok(AssistantMode::ImageAnalyze),
            other => Err(format!(
                "unknown mode '{other}' (expected chat, search, image-generate or image-analyze)"
            )),
        }
    }
}

/// Requested size of a generated figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSize {
    /// Square pixel dimensions sent to the image endpoint.
    pub fn dimensions(self) -> &'static str {
        match self {
            ImageSize::OneK => "1024x1024",
            ImageSize::TwoK => "2048x2048",
            ImageSize::FourK => "4096x4096",
        }
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1K" => Ok(ImageSize::OneK),
            "2K" => Ok(ImageSize::TwoK),
            "4K" => Ok(ImageSize::FourK),
            other => Err(format!("unknown size '{other}' (expected 1K, 2K or 4K)")),
        }
    }
}

/// One user query.
#[derive(Debug, Clone, Default)]
pub struct AssistantQuery {
    pub text: String,
    pub mode: AssistantMode,
    /// Uploaded image bytes, for `image-analyze`.
    pub image: Option<Vec<u8>>,
    pub size: ImageSize,
}

impl AssistantQuery {
    pub fn chat(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: AssistantMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }
}

/// A cited source from search mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

/// The assistant's answer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AssistantReply {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    /// Generated figure as a `data:` or `https:` URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl AssistantReply {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Routes queries to a [`LanguageService`] under the domain policy.
pub struct Assistant {
    service: Arc<dyn LanguageService>,
    local_domain_guard: bool,
}

impl Assistant {
    pub fn new(service: Arc<dyn LanguageService>, config: &AssistantConfig) -> Self {
        Self {
            service,
            local_domain_guard: config.local_domain_guard,
        }
    }

    /// Assistant backed by the configured (or auto-detected) LLM provider.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, PipelineError> {
        let provider = resolve_provider(
            config.provider.as_ref(),
            config.provider_name.as_deref(),
            config.model.as_deref(),
        )?;
        let service = LlmLanguageService::new(provider, config)?;
        Ok(Self::new(Arc::new(service), config))
    }

    /// Answer one query. Never fails; see the module docs for the fallbacks.
    pub async fn ask(&self, query: &AssistantQuery) -> AssistantReply {
        let text = query.text.trim();
        debug!("Assistant query ({}, {} chars)", query.mode, text.len());

        match query.mode {
            AssistantMode::Chat | AssistantMode::Search if is_greeting(text) => {
                AssistantReply::text(GREETING_MESSAGE)
            }
            AssistantMode::Chat | AssistantMode::Search
                if self.local_domain_guard && !looks_in_domain(text) =>
            {
                debug!("Assistant: refused by local domain guard");
                AssistantReply::text(REFUSAL_MESSAGE)
            }
            AssistantMode::Chat => match self.service.chat(ASSISTANT_SYSTEM_PROMPT, text).await {
                Ok(reply) => AssistantReply::text(or_refusal(reply)),
                Err(e) => apology(e),
            },
            AssistantMode::Search => match self.service.chat(SEARCH_SYSTEM_PROMPT, text).await {
                Ok(reply) => {
                    let (content, sources) = split_sources(&reply);
                    AssistantReply {
                        content: or_refusal(content),
                        sources,
                        image: None,
                    }
                }
                Err(e) => apology(e),
            },
            AssistantMode::ImageGenerate => {
                match self.service.generate_image(&figure_prompt(text), query.size).await {
                    Ok(url) if !url.is_empty() => AssistantReply {
                        content: figure_prompt(text),
                        sources: Vec::new(),
                        image: Some(url),
                    },
                    Ok(_) => AssistantReply::text(APOLOGY_MESSAGE),
                    Err(e) => apology(e),
                }
            }
            AssistantMode::ImageAnalyze => {
                let Some(image) = query.image.as_deref() else {
                    return AssistantReply::text(APOLOGY_MESSAGE);
                };
                match self.service.analyze_image(IMAGE_ANALYSIS_PROMPT, image).await {
                    Ok(reply) => AssistantReply::text(or_refusal(reply)),
                    Err(e) => apology(e),
                }
            }
        }
    }
}

fn apology(e: impl fmt::Display) -> AssistantReply {
    warn!("Assistant service failed: {e}");
    AssistantReply::text(APOLOGY_MESSAGE)
}

fn or_refusal(reply: String) -> String {
    if reply.trim().is_empty() {
        REFUSAL_MESSAGE.to_string()
    } else {
        reply
    }
}

/// `hi` or `hello`, ignoring case and surrounding whitespace.
pub fn is_greeting(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "hi" | "hello")
}

const DOMAIN_TERMS: &[&str] = &[
    "paper", "research", "ieee", "cite", "citation", "reference", "bibliograph", "abstract",
    "journal", "conference", "manuscript", "publication", "publish", "thesis", "format",
    "section", "heading", "figure", "table", "equation", "author", "academic", "scholar",
    "scientific", "science", "study", "experiment", "method", "literature", "review", "keyword",
    "latex", "docx", "template", "column", "writing", "draft", "peer",
];

/// Coarse keyword check used by the optional local guard.
pub fn looks_in_domain(text: &str) -> bool {
    let lower = text.to_lowercase();
    DOMAIN_TERMS.iter().any(|term| lower.contains(term))
}

static RE_SOURCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:[-*]\s*)?sources?:\s*(.*?)\s*-\s*(https?://\S+)\s*$").unwrap());
static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>()\[\]"']+"#).unwrap());

/// Separate `Source: <title> - <URL>` lines from the answer and collect
/// every cited URL, de-duplicated in order of first appearance.
pub fn split_sources(reply: &str) -> (String, Vec<Source>) {
    let mut sources: Vec<Source> = Vec::new();
    let mut push = |title: &str, url: &str| {
        let url = url.trim_end_matches(['.', ',', ';', ':']);
        if !sources.iter().any(|s| s.url == url) {
            let title = if title.is_empty() { url } else { title };
            sources.push(Source {
                title: title.to_string(),
                url: url.to_string(),
            });
        }
    };

    let mut body = Vec::new();
    for line in reply.lines() {
        match RE_SOURCE_LINE.captures(line) {
            Some(caps) => push(caps[1].trim(), &caps[2]),
            None => body.push(line),
        }
    }
    let content = body.join("\n").trim().to_string();

    for m in RE_URL.find_iter(&content) {
        push("", m.as_str());
    }

    (content, sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_detection() {
        assert!(is_greeting("hi"));
        assert!(is_greeting("  HeLLo \n"));
        assert!(!is_greeting("hi there"));
        assert!(!is_greeting(""));
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("chat".parse::<AssistantMode>().unwrap(), AssistantMode::Chat);
        assert_eq!(
            "Image-Generate".parse::<AssistantMode>().unwrap(),
            AssistantMode::ImageGenerate
        );
        assert!("poetry".parse::<AssistantMode>().is_err());
        assert_eq!(AssistantMode::ImageAnalyze.to_string(), "image-analyze");
    }

    #[test]
    fn size_parsing() {
        assert_eq!("2k".parse::<ImageSize>().unwrap(), ImageSize::TwoK);
        assert_eq!(ImageSize::FourK.dimensions(), "4096x4096");
        assert!("8K".parse::<ImageSize>().is_err());
    }

    #[test]
    fn domain_guard_keywords() {
        assert!(looks_in_domain("How do I format IEEE references?"));
        assert!(!looks_in_domain("Who won the football match yesterday?"));
    }

    #[test]
    fn sources_are_split_and_deduplicated() {
        let reply = "IEEE uses numeric citations, see https://ieee.org/guide.\n\
                     Source: IEEE Author Center - https://ieee.org/guide\n\
                     Source: Style Manual - https://example.org/manual";
        let (content, sources) = split_sources(reply);
        assert_eq!(content, "IEEE uses numeric citations, see https://ieee.org/guide.");
        assert_eq!(
            sources,
            vec![
                Source {
                    title: "IEEE Author Center".into(),
                    url: "https://ieee.org/guide".into()
                },
                Source {
                    title: "Style Manual".into(),
                    url: "https://example.org/manual".into()
                },
            ]
        );
    }
}
