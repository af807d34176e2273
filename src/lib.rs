//! # docx2ieee
//!
//! Convert research-paper drafts (`.docx`) into IEEE conference layout.
//!
//! ## Why this crate?
//!
//! Reformatting a draft into the IEEE two-column template by hand is slow and
//! error-prone: numbering headings, renumbering references, and keeping the
//! abstract block right all have to be redone whenever the draft changes.
//! This crate extracts the draft's text, lets an LLM segment it into title,
//! authors, abstract, keywords, sections and references without rewording
//! anything, and renders that structure as a fresh two-column document. A
//! manifest with checksums and the citation index records what was done.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .docx
//!  │
//!  ├─ Validating  protection / tracked-change checks
//!  ├─ Parsing     body text from word/document.xml (≥ 50 chars)
//!  ├─ Mapping     LLM structure inference → StructuredPaper
//!  ├─ Formatting  IEEE two-column WordprocessingML
//!  ├─ Verifying   rendered text still contains every fragment
//!  └─ Packaging   manifest (SHA-256, style table, citation map)
//! ```
//!
//! Any failing stage stops the run in `Error` with one of the
//! [`ErrorKind`] codes; nothing is retried at the pipeline level.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docx2ieee::{transform, TransformConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = TransformConfig::default();
//!     let output = transform("paper.docx", &config).await?;
//!     std::fs::write(&output.document.filename, &output.document.bytes)?;
//!     for entry in &output.manifest.citation_map {
//!         eprintln!("[{}] {}", entry.assigned_numeric_index, entry.original_citation_text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docx2ieee` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docx2ieee = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assistant;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod manifest;
pub mod output;
pub mod paper;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod stage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assistant::{
    Assistant, AssistantMode, AssistantQuery, AssistantReply, ImageSize, LanguageService,
    LlmLanguageService, Source,
};
pub use config::{
    AssistantConfig, AssistantConfigBuilder, TransformConfig, TransformConfigBuilder,
    VerificationMode,
};
pub use controller::{PipelineController, PipelineControllerBuilder, PipelineRun, StageEvent};
pub use convert::{
    inspect, inspect_document, transform, transform_bytes, transform_sync, transform_to_file,
    write_output, InspectReport, WrittenFiles,
};
pub use error::{ErrorKind, ExtractError, PipelineError, RenderError, ServiceError, StageFailure};
pub use manifest::{CitationEntry, Manifest, StyleMapping};
pub use output::{RenderedDocument, RunSnapshot, RunStats, TransformOutput};
pub use paper::{ExtractedText, RawDocument, Section, StructuredPaper};
pub use pipeline::{
    ContentVerification, DocumentRenderer, DocxTextExtractor, FixedDelayVerification,
    IeeeDocxRenderer, IeeeLayout, LlmStructureInference, StructureInference, TextExtractor,
    ValidationReport, VerificationPolicy,
};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use stage::Stage;
