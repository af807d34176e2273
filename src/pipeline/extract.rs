//! Plain-text extraction from `.docx` bytes.

use super::docx::{self, DocxPackage};
use crate::error::ExtractError;
use async_trait::async_trait;

/// Turns document bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Reads the body paragraphs of `word/document.xml`.
///
/// Paragraphs are separated by a blank line. Headers, footers, comments and
/// deleted revision text are not part of the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxTextExtractor;

#[async_trait]
impl TextExtractor for DocxTextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        // ZIP inflation and XML parsing are CPU-bound.
        let owned = bytes.to_vec();
        tokio::task::spawn_blocking(move || extract_text(&owned))
            .await
            .map_err(|e| ExtractError::Unreadable(format!("extraction task failed: {e}")))?
    }
}

/// Synchronous extraction, shared with content verification.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut package = DocxPackage::open(bytes).map_err(ExtractError::Unreadable)?;
    let xml = package
        .part(docx::DOCUMENT_PART)
        .map_err(ExtractError::Unreadable)?
        .ok_or_else(|| ExtractError::Unreadable(format!("missing {}", docx::DOCUMENT_PART)))?;
    let paragraphs = docx::paragraphs(&xml)
        .map_err(|e| ExtractError::Unreadable(format!("{}: {e}", docx::DOCUMENT_PART)))?;
    Ok(paragraphs.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn package(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn paragraphs_are_separated_by_blank_lines() {
        let xml = r#"<w:document xmlns:w="urn:w"><w:body>
            <w:p><w:r><w:t>First</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = DocxTextExtractor
            .extract(&package(&[(docx::DOCUMENT_PART, xml)]))
            .await
            .unwrap();
        assert_eq!(text, "First\n\nSecond");
    }

    #[tokio::test]
    async fn missing_document_part_is_unreadable() {
        let bytes = package(&[("word/styles.xml", "<w:styles/>")]);
        let err = DocxTextExtractor.extract(&bytes).await.unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[tokio::test]
    async fn non_zip_bytes_are_unreadable() {
        assert!(DocxTextExtractor.extract(b"%PDF-1.7").await.is_err());
    }

    #[test]
    fn malformed_xml_is_unreadable() {
        let bytes = package(&[(docx::DOCUMENT_PART, "<w:document><w:body></w:document>")]);
        assert!(extract_text(&bytes).is_err());
    }
}
