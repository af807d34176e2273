//! Post-render verification: did the rendered document keep the paper's text?

use super::extract::extract_text;
use super::render::{reference_line, xml_safe};
use crate::paper::StructuredPaper;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Checks a rendered document against the paper it was rendered from.
///
/// `Err` carries one diagnostic per missing or altered fragment.
#[async_trait]
pub trait VerificationPolicy: Send + Sync {
    async fn verify(&self, paper: &StructuredPaper, rendered: &[u8]) -> Result<(), Vec<String>>;
}

/// Re-extracts the rendered text and requires every fragment of the paper
/// (title, abstract, section bodies, references) to appear in it.
///
/// Comparison collapses whitespace; the title is compared case-insensitively
/// because it is rendered in upper case.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentVerification;

#[async_trait]
impl VerificationPolicy for ContentVerification {
    async fn verify(&self, paper: &StructuredPaper, rendered: &[u8]) -> Result<(), Vec<String>> {
        let paper = paper.clone();
        let owned = rendered.to_vec();
        tokio::task::spawn_blocking(move || check_content(&paper, &owned))
            .await
            .map_err(|e| vec![format!("verification task failed: {e}")])?
    }
}

/// Waits a fixed time and accepts. Stands in where no real check is wanted.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelayVerification {
    pub delay: Duration,
}

impl FixedDelayVerification {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl VerificationPolicy for FixedDelayVerification {
    async fn verify(&self, _paper: &StructuredPaper, _rendered: &[u8]) -> Result<(), Vec<String>> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

fn normalize(text: &str) -> String {
    xml_safe(text).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Synchronous content check.
pub fn check_content(paper: &StructuredPaper, rendered: &[u8]) -> Result<(), Vec<String>> {
    let text = extract_text(rendered)
        .map_err(|e| vec![format!("rendered document is unreadable: {e}")])?;
    let haystack = normalize(&text);
    let mut missing = Vec::new();

    let title = normalize(&paper.title);
    if !title.is_empty() && !haystack.to_uppercase().contains(&title.to_uppercase()) {
        missing.push("title is missing from the output".to_string());
    }

    let abstract_text = normalize(&paper.abstract_text);
    if !abstract_text.is_empty() && !haystack.contains(&abstract_text) {
        missing.push("abstract text differs from the source".to_string());
    }

    for (i, section) in paper.sections.iter().enumerate() {
        let content = normalize(&section.content);
        if !content.is_empty() && !haystack.contains(&content) {
            missing.push(format!(
                "section {} ('{}') content differs from the source",
                i + 1,
                section.heading.trim()
            ));
        }
    }

    for (i, reference) in paper.references.iter().enumerate() {
        let line = normalize(&reference_line(i + 1, reference));
        if !line.is_empty() && !haystack.contains(&line) {
            missing.push(format!("reference {} is missing from the output", i + 1));
        }
    }

    debug!("Content verification: {} issue(s)", missing.len());
    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::Section;
    use crate::pipeline::render::{render_docx, IeeeLayout};

    fn paper() -> StructuredPaper {
        StructuredPaper {
            title: "Graph Methods".into(),
            abstract_text: "An   abstract\nwith odd spacing.".into(),
            sections: vec![Section::new("Intro", 1, "Para one.\n\nPara two.")],
            references: vec!["Smith, J. (2020)".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn faithful_render_passes() {
        let bytes = render_docx(&paper(), &IeeeLayout::default()).unwrap();
        ContentVerification.verify(&paper(), &bytes).await.unwrap();
    }

    #[test]
    fn drift_is_reported_per_fragment() {
        let bytes = render_docx(&paper(), &IeeeLayout::default()).unwrap();
        let mut drifted = paper();
        drifted.abstract_text = "A rewritten abstract.".into();
        drifted.references.push("Lee 2021".into());
        let diagnostics = check_content(&drifted, &bytes).unwrap_err();
        assert_eq!(diagnostics.len(), 2, "{diagnostics:?}");
        assert!(diagnostics[0].contains("abstract"));
        assert!(diagnostics[1].contains("reference 2"));
    }

    #[test]
    fn unreadable_output_fails() {
        let diagnostics = check_content(&paper(), b"not a docx").unwrap_err();
        assert!(diagnostics[0].contains("unreadable"));
    }

    #[tokio::test]
    async fn fixed_delay_always_accepts() {
        let policy = FixedDelayVerification::new(Duration::from_millis(1));
        policy.verify(&paper(), b"anything").await.unwrap();
    }
}
