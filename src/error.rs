//! Error types for the docx2ieee library.
//!
//! Three layers of failure exist, and each has its own type:
//!
//! * Collaborator errors — [`ExtractError`], [`ServiceError`],
//!   [`RenderError`]. These are what the text extractor, the structure
//!   inference service and the renderer return. They carry raw detail and are
//!   never shown to an end user as-is.
//!
//! * [`StageFailure`] — a collaborator error (or a failed policy check)
//!   translated onto the fixed [`ErrorKind`] taxonomy at the controller
//!   boundary. It carries the stage it happened in, the user-facing message of
//!   its kind, and the raw detail for logs.
//!
//! * [`PipelineError`] — everything `PipelineController::start` and the
//!   `transform*` entry points can return: a rejected start, a stage failure,
//!   a cancelled run, or an environment problem (provider, I/O, config).

use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ── Taxonomy ─────────────────────────────────────────────────────────────

/// The closed set of failure categories a run can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The file is access-restricted (password, enforced protection).
    DocumentProtected,
    /// The document still contains unresolved revision markers.
    TrackedChangesPresent,
    /// The extractor could not read the bytes.
    DocumentCorrupt,
    /// Too little text, or no title could be established.
    InsufficientStructure,
    /// The rendered output drifted from the structured content.
    ContentMismatch,
    /// A stage exceeded the configured per-stage timeout.
    StageTimedOut,
    /// Any fault from inference or rendering that has no better category.
    TransformationFailed,
}

impl ErrorKind {
    /// Stable machine-readable code, as written into logs and JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::DocumentProtected => "DOCX_PROTECTED",
            ErrorKind::TrackedChangesPresent => "DOCX_TRACKED_CHANGES",
            ErrorKind::DocumentCorrupt => "DOCX_CORRUPT",
            ErrorKind::InsufficientStructure => "DOCX_MIN_STRUCTURE",
            ErrorKind::ContentMismatch => "TRANSFORM_CONTENT_MISMATCH",
            ErrorKind::StageTimedOut => "TRANSFORM_STAGE_TIMEOUT",
            ErrorKind::TransformationFailed => "TRANSFORM_FAILED",
        }
    }

    /// The message shown to the end user. Never contains fault detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::DocumentProtected => {
                "The uploaded document is password-protected. Remove protection and re-upload."
            }
            ErrorKind::TrackedChangesPresent => {
                "The uploaded document contains tracked changes or comments. \
                 Please accept changes and remove comments, then re-upload."
            }
            ErrorKind::DocumentCorrupt => "Uploaded .docx appears corrupted or unreadable.",
            ErrorKind::InsufficientStructure => {
                "Document lacks necessary structure (Title or Abstract missing). \
                 Please ensure Title and Abstract are present."
            }
            ErrorKind::ContentMismatch => {
                "Post-transformation content mismatch detected. Transformation aborted. \
                 See diagnostics for details."
            }
            ErrorKind::StageTimedOut => {
                "A transformation step took too long to respond. Please try again."
            }
            ErrorKind::TransformationFailed => {
                "Transformation failed. Ensure your file is a valid .docx with Title and Abstract."
            }
        }
    }

    /// Whether re-running the same file unchanged has a reasonable chance of
    /// succeeding. The pipeline itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::StageTimedOut | ErrorKind::TransformationFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A failed stage, translated onto the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{stage} failed [{}]: {message}", .kind.code())]
pub struct StageFailure {
    /// Stage the run was in when it failed.
    pub stage: Stage,
    /// Taxonomy category.
    pub kind: ErrorKind,
    /// User-facing message (always [`ErrorKind::user_message`]).
    pub message: String,
    /// Raw fault detail, for logs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Individual findings, e.g. which fragments were missing after rendering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl StageFailure {
    pub fn new(stage: Stage, kind: ErrorKind) -> Self {
        Self {
            stage,
            kind,
            message: kind.user_message().to_string(),
            detail: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

// ── Run-level errors ─────────────────────────────────────────────────────

/// All errors returned by the pipeline controller and the `transform*`
/// entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file does not carry the one recognised extension.
    #[error("Unsupported document '{filename}': only .docx files can be transformed")]
    UnsupportedDocument { filename: String },

    /// `start` was called while the controller was not `Idle`.
    #[error("A run is already {stage}; reset the pipeline before starting another")]
    RunNotIdle { stage: Stage },

    /// A stage failed; the run is in the `Error` state.
    #[error(transparent)]
    Stage(#[from] StageFailure),

    /// The run was reset while in flight; its results were discarded.
    #[error("Run {run_id} was cancelled by a reset")]
    Cancelled { run_id: u64 },

    /// `output()` was called before the run reached `Done`.
    #[error("No output available: the pipeline is {stage}")]
    NoOutput { stage: Stage },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not read the input file.
    #[error("Failed to read input file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The taxonomy kind, when this error is a stage failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineError::Stage(failure) => Some(failure.kind),
            _ => None,
        }
    }
}

// ── Collaborator errors ──────────────────────────────────────────────────

/// Text extractor failure.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The bytes are not a readable document.
    #[error("document is unreadable: {0}")]
    Unreadable(String),
}

/// Failure of an external language service (structure inference or the
/// assistant).
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service answered, but the answer could not be parsed.
    #[error("malformed service response: {0}")]
    Malformed(String),

    /// Network, authentication or provider-side fault.
    #[error("service transport error: {0}")]
    Transport(String),

    /// The call did not finish in time.
    #[error("service call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The service reported a condition that maps onto a known taxonomy kind.
    #[error("service rejected the document [{}]: {detail}", .kind.code())]
    Classified { kind: ErrorKind, detail: String },

    /// The configured service cannot perform the requested operation.
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

impl ServiceError {
    /// Taxonomy kind this error maps to when it escapes the mapping stage.
    pub fn taxonomy_kind(&self) -> ErrorKind {
        match self {
            ServiceError::Classified { kind, .. } => *kind,
            ServiceError::Timeout { .. } => ErrorKind::StageTimedOut,
            ServiceError::Malformed(_)
            | ServiceError::Transport(_)
            | ServiceError::Unsupported(_) => ErrorKind::TransformationFailed,
        }
    }
}

/// Renderer failure.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Writing the document markup failed.
    #[error("markup generation failed: {0}")]
    Markup(String),

    /// Packaging the markup into the output container failed.
    #[error("packaging failed: {0}")]
    Package(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failure_display_names_stage_and_code() {
        let f = StageFailure::new(Stage::Validating, ErrorKind::DocumentProtected);
        let msg = f.to_string();
        assert!(msg.contains("Validating"), "got: {msg}");
        assert!(msg.contains("DOCX_PROTECTED"), "got: {msg}");
    }

    #[test]
    fn user_message_never_carries_detail() {
        let f = StageFailure::new(Stage::Mapping, ErrorKind::TransformationFailed)
            .with_detail("HTTP 500 from upstream: secret-request-id");
        assert!(!f.message.contains("secret-request-id"));
        assert_eq!(f.message, ErrorKind::TransformationFailed.user_message());
    }

    #[test]
    fn service_errors_map_onto_taxonomy() {
        assert_eq!(
            ServiceError::Transport("reset by peer".into()).taxonomy_kind(),
            ErrorKind::TransformationFailed
        );
        assert_eq!(
            ServiceError::Timeout { secs: 30 }.taxonomy_kind(),
            ErrorKind::StageTimedOut
        );
        assert_eq!(
            ServiceError::Classified {
                kind: ErrorKind::InsufficientStructure,
                detail: "no abstract".into(),
            }
            .taxonomy_kind(),
            ErrorKind::InsufficientStructure
        );
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(ErrorKind::StageTimedOut.is_retryable());
        assert!(ErrorKind::TransformationFailed.is_retryable());
        assert!(!ErrorKind::DocumentProtected.is_retryable());
        assert!(!ErrorKind::ContentMismatch.is_retryable());
    }

    #[test]
    fn run_not_idle_display() {
        let e = PipelineError::RunNotIdle {
            stage: Stage::Mapping,
        };
        assert!(e.to_string().contains("Mapping"));
    }

    #[test]
    fn pipeline_error_exposes_kind() {
        let e: PipelineError =
            StageFailure::new(Stage::Parsing, ErrorKind::DocumentCorrupt).into();
        assert_eq!(e.kind(), Some(ErrorKind::DocumentCorrupt));
        assert_eq!(PipelineError::Cancelled { run_id: 3 }.kind(), None);
    }
}
