//! One-call entry points over [`PipelineController`].
//!
//! Each call builds a fresh controller, so these functions can run
//! concurrently (one run per controller). Use the controller directly when
//! you need `reset`, stage subscriptions, or custom collaborators.

use crate::config::TransformConfig;
use crate::controller::PipelineController;
use crate::error::PipelineError;
use crate::output::TransformOutput;
use crate::paper::{ExtractedText, RawDocument};
use crate::pipeline::extract::extract_text;
use crate::pipeline::validate::{self, ValidationReport};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Transform a `.docx` file.
///
/// # Errors
/// - [`PipelineError::InputReadFailed`] if the file cannot be read
/// - [`PipelineError::ProviderNotConfigured`] if no LLM provider is available
/// - [`PipelineError::UnsupportedDocument`] for non-`.docx` filenames
/// - [`PipelineError::Stage`] when a stage fails
pub async fn transform(
    input: impl AsRef<Path>,
    config: &TransformConfig,
) -> Result<TransformOutput, PipelineError> {
    let document = RawDocument::from_path(input.as_ref()).await?;
    transform_document(document, config).await
}

/// Transform a document held in memory.
///
/// # Example
/// ```rust,no_run
/// use docx2ieee::{transform_bytes, TransformConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("paper.docx")?;
/// let output = transform_bytes("paper.docx", bytes, &TransformConfig::default()).await?;
/// std::fs::write(&output.document.filename, &output.document.bytes)?;
/// # Ok(())
/// # }
/// ```
pub async fn transform_bytes(
    filename: impl Into<String>,
    bytes: impl Into<Vec<u8>>,
    config: &TransformConfig,
) -> Result<TransformOutput, PipelineError> {
    transform_document(RawDocument::new(filename, bytes), config).await
}

async fn transform_document(
    document: RawDocument,
    config: &TransformConfig,
) -> Result<TransformOutput, PipelineError> {
    let controller = PipelineController::from_config(config.clone())?;
    controller.start(document).await
}

/// Files written by [`transform_to_file`].
#[derive(Debug, Clone, Serialize)]
pub struct WrittenFiles {
    pub document: PathBuf,
    pub manifest: Option<PathBuf>,
}

/// Transform `input` and write `<stem><suffix>.docx` into `output_dir`,
/// plus `<stem><suffix>.manifest.json` when `write_manifest` is set.
///
/// Uses atomic writes (temp file + rename) so a failed run never leaves a
/// partial document behind.
pub async fn transform_to_file(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &TransformConfig,
    write_manifest: bool,
) -> Result<(TransformOutput, WrittenFiles), PipelineError> {
    let output = transform(input, config).await?;
    let written = write_output(&output, output_dir.as_ref(), write_manifest).await?;
    Ok((output, written))
}

/// Write a finished run's document (and optionally its manifest) to `dir`.
pub async fn write_output(
    output: &TransformOutput,
    dir: &Path,
    write_manifest: bool,
) -> Result<WrittenFiles, PipelineError> {
    let document = dir.join(&output.document.filename);
    write_atomic(&document, &output.document.bytes).await?;
    info!("Wrote {}", document.display());

    let manifest = if write_manifest {
        let path = document.with_extension("manifest.json");
        let json = serde_json::to_vec_pretty(&output.manifest)
            .map_err(|e| PipelineError::Internal(format!("manifest serialisation: {e}")))?;
        write_atomic(&path, &json).await?;
        debug!("Wrote {}", path.display());
        Some(path)
    } else {
        None
    };

    Ok(WrittenFiles { document, manifest })
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let write_err = |e| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}

/// Synchronous wrapper around [`transform`].
///
/// Creates a temporary tokio runtime internally.
pub fn transform_sync(
    input: impl AsRef<Path>,
    config: &TransformConfig,
) -> Result<TransformOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(transform(input, config))
}

/// What [`inspect`] learned about a document.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub filename: String,
    pub size_bytes: usize,
    pub docx_extension: bool,
    pub validation: ValidationReport,
    pub characters: usize,
    pub words: usize,
    pub paragraphs: usize,
    /// Whether the text meets `min_text_chars`.
    pub enough_text: bool,
    pub extract_error: Option<String>,
}

/// Run validation and extraction only.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(
    input: impl AsRef<Path>,
    config: &TransformConfig,
) -> Result<InspectReport, PipelineError> {
    let document = RawDocument::from_path(input.as_ref()).await?;
    Ok(inspect_document(&document, config))
}

pub fn inspect_document(document: &RawDocument, config: &TransformConfig) -> InspectReport {
    let validation = validate::inspect(document, &config.protected_marker);
    let mut report = InspectReport {
        filename: document.filename().to_string(),
        size_bytes: document.len(),
        docx_extension: document.has_docx_extension(),
        validation,
        characters: 0,
        words: 0,
        paragraphs: 0,
        enough_text: false,
        extract_error: None,
    };

    if report.validation.encrypted_container {
        return report;
    }

    match extract_text(document.bytes()) {
        Ok(raw) => {
            // Counted without the threshold so short documents still report.
            if let Ok(text) = ExtractedText::new(&raw, 0) {
                report.characters = text.char_count();
                report.words = text.word_count();
                report.paragraphs = text.paragraph_count();
            }
            report.enough_text = ExtractedText::new(&raw, config.min_text_chars).is_ok();
        }
        Err(e) => report.extract_error = Some(e.to_string()),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out_IEEE.docx");
        write_atomic(&path, b"bytes").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");
        assert!(!dir.path().join("nested").join("out_IEEE.docx.tmp").exists());
    }

    #[tokio::test]
    async fn missing_input_is_a_read_error() {
        let err = inspect("/definitely/not/here.docx", &TransformConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InputReadFailed { .. }));
    }

    #[test]
    fn inspect_reports_unreadable_packages() {
        let doc = RawDocument::new("paper.docx", b"nope".to_vec());
        let report = inspect_document(&doc, &TransformConfig::default());
        assert!(report.docx_extension);
        assert!(report.extract_error.is_some());
        assert!(!report.enough_text);
    }
}
