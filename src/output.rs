//! Result types returned by the controller and the convenience API.

use crate::error::StageFailure;
use crate::manifest::Manifest;
use crate::paper::StructuredPaper;
use crate::stage::Stage;
use serde::Serialize;
use std::fmt;

/// The transformed document, available once a run reaches `Done`.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Original stem + suffix + `.docx`, e.g. `paper_IEEE.docx`.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for RenderedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedDocument")
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Timing and size figures for one successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub run_id: u64,
    /// Wall-clock time from `start` to `Done`.
    pub total_duration_ms: u64,
    /// Time spent in each working stage, in execution order.
    pub stage_durations_ms: Vec<(Stage, u64)>,
    pub input_bytes: usize,
    pub extracted_chars: usize,
    pub extracted_words: usize,
    pub sections: usize,
    pub references: usize,
    pub output_bytes: usize,
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub document: RenderedDocument,
    pub manifest: Manifest,
    pub paper: StructuredPaper,
    pub stats: RunStats,
}

/// A point-in-time view of the controller's run, without artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    /// `0` when no run has been started since the last reset.
    pub run_id: u64,
    pub stage: Stage,
    /// Stages entered so far, in order.
    pub history: Vec<Stage>,
    pub filename: Option<String>,
    pub failure: Option<StageFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_debug_hides_bytes() {
        let doc = RenderedDocument {
            filename: "paper_IEEE.docx".into(),
            bytes: vec![0u8; 2048],
        };
        let s = format!("{doc:?}");
        assert!(s.contains("paper_IEEE.docx"));
        assert!(s.contains("<2048 bytes>"));
    }

    #[test]
    fn snapshot_serialises_stage_names() {
        let snap = RunSnapshot {
            run_id: 3,
            stage: Stage::Mapping,
            history: vec![Stage::Validating, Stage::Parsing, Stage::Mapping],
            filename: Some("a.docx".into()),
            failure: None,
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains(r#""stage":"Mapping""#), "{json}");
    }
}
