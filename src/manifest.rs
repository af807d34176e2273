//! The audit record of a successful run.
//!
//! Everything here is a pure function of its inputs. The style table is a
//! constant; the citation map is positional (first reference gets `1`), and
//! any numbering already embedded in the reference text is left alone rather
//! than parsed or reconciled.

use crate::paper::StructuredPaper;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The fixed source-style → IEEE-style table.
pub const STYLE_TABLE: [(&str, &str); 3] = [
    ("Raw Text", "IEEE Standard Two-Column"),
    ("Headings", "Roman Numeral / Small Caps"),
    ("References", "IEEE Numeric [n]"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleMapping {
    pub original_style: String,
    pub mapped_style: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationEntry {
    pub original_citation_text: String,
    pub assigned_numeric_index: usize,
}

/// Created once, after every stage succeeded. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub original_file_checksum: String,
    pub output_file_checksum: String,
    pub styles_mapped: Vec<StyleMapping>,
    pub citation_map: Vec<CitationEntry>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Manifest {
    /// Build the manifest for a finished run.
    pub fn build(
        paper: &StructuredPaper,
        original_bytes: &[u8],
        output_bytes: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            original_file_checksum: checksum(original_bytes),
            output_file_checksum: checksum(output_bytes),
            styles_mapped: style_mappings(),
            citation_map: citation_map(&paper.references),
            errors: Vec::new(),
            timestamp,
        }
    }
}

pub fn style_mappings() -> Vec<StyleMapping> {
    STYLE_TABLE
        .iter()
        .map(|(from, to)| StyleMapping {
            original_style: (*from).to_string(),
            mapped_style: (*to).to_string(),
        })
        .collect()
}

/// Assign 1-based indices to references in the order they appear.
pub fn citation_map(references: &[String]) -> Vec<CitationEntry> {
    references
        .iter()
        .enumerate()
        .map(|(i, r)| CitationEntry {
            original_citation_text: r.clone(),
            assigned_numeric_index: i + 1,
        })
        .collect()
}

/// `sha256:<hex>` integrity marker.
pub fn checksum(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("sha256:{:x}", h.finalize())
}
