//! The data that flows between pipeline stages.
//!
//! ```text
//! RawDocument ──extract──▶ ExtractedText ──infer──▶ StructuredPaper ──render──▶ RenderedDocument
//! ```
//!
//! [`StructuredPaper`] is the canonical intermediate representation. It is
//! deserialised from whatever JSON the inference service produced, so every
//! field is parsed leniently: a model that answers `"authors": "A, B"` instead
//! of `["A", "B"]`, or `"level": "2"` instead of `2`, still yields a usable
//! paper. Parsing never rewrites wording; it only reshapes containers.

use crate::error::PipelineError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// The one input extension the pipeline accepts.
pub const DOCX_EXTENSION: &str = "docx";

// ── RawDocument ──────────────────────────────────────────────────────────

/// An uploaded file: name plus bytes. Owned by one run.
#[derive(Clone, PartialEq, Eq)]
pub struct RawDocument {
    filename: String,
    bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a document from disk, keeping only the file name (not the
    /// directory) as its identity.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| PipelineError::InputReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(filename, bytes))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when the filename ends in `.docx`, ignoring case.
    pub fn has_docx_extension(&self) -> bool {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(DOCX_EXTENSION))
    }
}

impl fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDocument")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Name of the rendered file: the original stem, `suffix`, then `.docx`.
///
/// `paper.docx` with suffix `_IEEE` becomes `paper_IEEE.docx`.
pub fn output_filename(original: &str, suffix: &str) -> String {
    let path = Path::new(original);
    let stem = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(DOCX_EXTENSION) => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        _ => path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    format!("{stem}{suffix}.{DOCX_EXTENSION}")
}

// ── ExtractedText ────────────────────────────────────────────────────────

/// Plain text that passed the minimum-length check.
///
/// Stored trimmed; the threshold counts Unicode scalar values, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText(String);

/// Returned by [`ExtractedText::new`] when the text is below the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientText {
    pub chars: usize,
    pub min_chars: usize,
}

impl ExtractedText {
    pub fn new(raw: impl AsRef<str>, min_chars: usize) -> Result<Self, InsufficientText> {
        let trimmed = raw.as_ref().trim();
        let chars = trimmed.chars().count();
        if trimmed.is_empty() || chars < min_chars {
            return Err(InsufficientText { chars, min_chars });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }

    /// Paragraphs are separated by blank lines in extractor output.
    pub fn paragraph_count(&self) -> usize {
        self.0
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .count()
    }
}

// ── StructuredPaper ──────────────────────────────────────────────────────

/// Segmented paper content, as returned by structure inference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredPaper {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,

    #[serde(default, deserialize_with = "lenient_list_comma")]
    pub authors: Vec<String>,

    #[serde(rename = "abstract", default, deserialize_with = "lenient_string")]
    pub abstract_text: String,

    #[serde(default, deserialize_with = "lenient_list_comma")]
    pub keywords: Vec<String>,

    #[serde(default, deserialize_with = "lenient_sections")]
    pub sections: Vec<Section>,

    #[serde(default, deserialize_with = "lenient_list_lines")]
    pub references: Vec<String>,
}

/// One body section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, deserialize_with = "lenient_string")]
    pub heading: String,

    #[serde(default = "default_level", deserialize_with = "lenient_level")]
    pub level: u32,

    #[serde(default, deserialize_with = "lenient_string")]
    pub content: String,
}

impl Section {
    pub fn new(heading: impl Into<String>, level: u32, content: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            level,
            content: content.into(),
        }
    }
}

fn default_level() -> u32 {
    1
}

impl StructuredPaper {
    /// Apply the acceptance policy for inferred papers.
    ///
    /// A blank title is replaced by `fallback_title` (the source filename);
    /// the paper is rejected only if the title is still blank afterwards.
    /// Everything else is accepted as-is, including empty abstracts,
    /// sections and references.
    pub fn validated(mut self, fallback_title: &str) -> Result<Self, String> {
        if self.title.trim().is_empty() {
            self.title = fallback_title.trim().to_string();
        }
        if self.title.trim().is_empty() {
            return Err("no title in inferred structure and no filename to fall back to".into());
        }
        Ok(self)
    }

    /// Whether inference produced no content at all.
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
            && self.abstract_text.trim().is_empty()
            && self.sections.is_empty()
            && self.references.is_empty()
    }
}

// ── Lenient field parsers ────────────────────────────────────────────────

fn value_to_string(v: Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .into_iter()
            .map(value_to_string)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Object(_) => String::new(),
    }
}

fn value_to_list(v: Value, separators: &[char]) -> Vec<String> {
    match v {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .map(value_to_string)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Value::String(s) => s
            .split(|c| separators.contains(&c))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        other => {
            let s = value_to_string(other);
            if s.is_empty() {
                Vec::new()
            } else {
                vec![s]
            }
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(d)?))
}

fn lenient_list_comma<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(value_to_list(Value::deserialize(d)?, &[',', ';']))
}

fn lenient_list_lines<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(value_to_list(Value::deserialize(d)?, &['\n']))
}

fn lenient_level<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let level = match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    Ok(level.unwrap_or(1).clamp(1, 9))
}

fn lenient_sections<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Section>, D::Error> {
    let items = match Value::deserialize(d)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter(|v| v.is_object())
        .filter_map(|v| serde_json::from_value::<Section>(v).ok())
        .collect())
}
