//! Access-restriction and revision checks run before any text is read.
//!
//! Validation never fails on an unreadable package: a file that is not a ZIP
//! (and not an encrypted OLE container) passes through to `Parsing`, where
//! the extractor reports it as corrupt.

use super::docx::{self, DocxPackage};
use crate::error::{ErrorKind, StageFailure};
use crate::paper::RawDocument;
use crate::stage::Stage;
use serde::Serialize;
use tracing::debug;

/// What validation found out about a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// The filename contains the protected marker.
    pub protected_by_name: bool,
    /// The bytes are an OLE compound file (password-encrypted OOXML).
    pub encrypted_container: bool,
    /// `word/settings.xml` enforces `w:documentProtection`.
    pub enforced_protection: bool,
    /// Number of tracked-change elements in `word/document.xml`.
    pub tracked_changes: usize,
    /// Why the package could not be inspected, if it could not.
    pub package_error: Option<String>,
}

impl ValidationReport {
    pub fn is_protected(&self) -> bool {
        self.protected_by_name || self.encrypted_container || self.enforced_protection
    }

    /// Turn the findings into a `Validating` failure, if any apply.
    pub fn failure(&self, reject_tracked_changes: bool) -> Option<StageFailure> {
        if self.is_protected() {
            return Some(
                StageFailure::new(Stage::Validating, ErrorKind::DocumentProtected)
                    .with_detail(self.protection_reason()),
            );
        }
        if reject_tracked_changes && self.tracked_changes > 0 {
            return Some(
                StageFailure::new(Stage::Validating, ErrorKind::TrackedChangesPresent)
                    .with_detail(format!(
                        "{} tracked-change element(s) in {}",
                        self.tracked_changes,
                        docx::DOCUMENT_PART
                    )),
            );
        }
        None
    }

    fn protection_reason(&self) -> String {
        let mut reasons = Vec::new();
        if self.protected_by_name {
            reasons.push("filename carries the protected marker");
        }
        if self.encrypted_container {
            reasons.push("file is an encrypted container");
        }
        if self.enforced_protection {
            reasons.push("settings enforce document protection");
        }
        reasons.join("; ")
    }
}

/// [`inspect`] on the blocking pool, so the stage timeout and reset can
/// interrupt a large package while it is inflated and scanned.
pub async fn inspect_async(
    document: &RawDocument,
    protected_marker: &str,
) -> Result<ValidationReport, tokio::task::JoinError> {
    let document = document.clone();
    let marker = protected_marker.to_string();
    tokio::task::spawn_blocking(move || inspect(&document, &marker)).await
}

/// Inspect `document` for access restrictions and tracked changes.
///
/// The marker comparison is case-insensitive; an empty marker never matches.
pub fn inspect(document: &RawDocument, protected_marker: &str) -> ValidationReport {
    let marker = protected_marker.trim().to_lowercase();
    let mut report = ValidationReport {
        protected_by_name: !marker.is_empty()
            && document.filename().to_lowercase().contains(&marker),
        encrypted_container: docx::is_ole_compound(document.bytes()),
        ..Default::default()
    };

    if report.encrypted_container {
        return report;
    }

    let mut package = match DocxPackage::open(document.bytes()) {
        Ok(p) => p,
        Err(e) => {
            debug!("{}: package not inspectable: {e}", document.filename());
            report.package_error = Some(e);
            return report;
        }
    };

    match package.part(docx::SETTINGS_PART) {
        Ok(Some(xml)) => match docx::has_enforced_protection(&xml) {
            Ok(on) => report.enforced_protection = on,
            Err(e) => report.package_error = Some(format!("{}: {e}", docx::SETTINGS_PART)),
        },
        Ok(None) => {}
        Err(e) => report.package_error = Some(e),
    }

    match package.part(docx::DOCUMENT_PART) {
        Ok(Some(xml)) => match docx::count_revisions(&xml) {
            Ok(n) => report.tracked_changes = n,
            Err(e) => report.package_error = Some(format!("{}: {e}", docx::DOCUMENT_PART)),
        },
        Ok(None) => {}
        Err(e) => report.package_error = Some(e),
    }

    report
}
