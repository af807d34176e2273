//! In-memory `.docx` fixtures and fake collaborators shared by the
//! integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use docx2ieee::{
    PipelineProgressCallback, Section, ServiceError, Stage, StageFailure, StructureInference,
    StructuredPaper,
};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use zip::write::SimpleFileOptions;

// ── Fixtures ─────────────────────────────────────────────────────────────────

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Builds a minimal WordprocessingML package.
#[derive(Default)]
pub struct DocxFixture {
    paragraphs: Vec<String>,
    revisions: usize,
    enforced_protection: bool,
}

impl DocxFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paragraph(mut self, text: &str) -> Self {
        self.paragraphs.push(text.to_string());
        self
    }

    /// Add `n` inserted-run revision markers.
    pub fn revisions(mut self, n: usize) -> Self {
        self.revisions = n;
        self
    }

    pub fn enforced_protection(mut self) -> Self {
        self.enforced_protection = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = String::new();
        for p in &self.paragraphs {
            body.push_str(&format!(
                "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
                escape(p)
            ));
        }
        for i in 0..self.revisions {
            body.push_str(&format!(
                "<w:p><w:ins w:id=\"{i}\" w:author=\"R\"><w:r><w:t>added</w:t></w:r></w:ins></w:p>"
            ));
        }
        let document = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"{W_NS}\"><w:body>{body}</w:body></w:document>"
        );

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        zip.start_file("word/document.xml", opts).unwrap();
        zip.write_all(document.as_bytes()).unwrap();
        if self.enforced_protection {
            let settings = format!(
                "<w:settings xmlns:w=\"{W_NS}\">\
                 <w:documentProtection w:edit=\"readOnly\" w:enforcement=\"1\"/></w:settings>"
            );
            zip.start_file("word/settings.xml", opts).unwrap();
            zip.write_all(settings.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// A draft long enough to pass the default text threshold.
pub fn sample_draft() -> Vec<u8> {
    DocxFixture::new()
        .paragraph("Deep Learning for Edge Devices")
        .paragraph("Jane Smith, Kim Lee")
        .paragraph("We study compact neural networks that run on microcontrollers.")
        .paragraph("Introduction")
        .paragraph("Edge inference reduces latency and keeps data on the device.")
        .paragraph("References")
        .paragraph("Smith, J. (2020). Tiny models.")
        .paragraph("Lee, K. (2019). Edge inference.")
        .build()
}

pub fn sample_paper() -> StructuredPaper {
    StructuredPaper {
        title: "Deep Learning for Edge Devices".into(),
        authors: vec!["Jane Smith".into(), "Kim Lee".into()],
        abstract_text: "We study compact neural networks that run on microcontrollers.".into(),
        keywords: vec!["edge computing".into(), "neural networks".into()],
        sections: vec![
            Section::new(
                "Introduction",
                1,
                "Edge inference reduces latency and keeps data on the device.",
            ),
            Section::new("Motivation", 2, "Battery budgets are tight."),
        ],
        references: vec![
            "Smith, J. (2020). Tiny models.".into(),
            "Lee, K. (2019). Edge inference.".into(),
        ],
    }
}

// ── Fake collaborators ───────────────────────────────────────────────────────

/// Returns a fixed structure (or error) and records what it was given.
pub struct FixedInference {
    result: Result<StructuredPaper, ServiceError>,
    pub seen: Mutex<Vec<String>>,
}

impl FixedInference {
    pub fn ok(paper: StructuredPaper) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(paper),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn err(e: ServiceError) -> Arc<Self> {
        Arc::new(Self {
            result: Err(e),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl StructureInference for FixedInference {
    async fn infer(&self, text: &str) -> Result<StructuredPaper, ServiceError> {
        self.seen.lock().unwrap().push(text.to_string());
        self.result.clone()
    }
}

/// Signals `entered` and then never finishes.
#[derive(Default)]
pub struct PendingInference {
    pub entered: Notify,
}

#[async_trait]
impl StructureInference for PendingInference {
    async fn infer(&self, _text: &str) -> Result<StructuredPaper, ServiceError> {
        self.entered.notify_one();
        std::future::pending().await
    }
}

/// Sleeps before answering.
pub struct SlowInference(pub Duration);

#[async_trait]
impl StructureInference for SlowInference {
    async fn infer(&self, _text: &str) -> Result<StructuredPaper, ServiceError> {
        tokio::time::sleep(self.0).await;
        Ok(sample_paper())
    }
}

/// Records every progress event as a short string.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl PipelineProgressCallback for Recorder {
    fn on_run_start(&self, _run_id: u64, filename: &str) {
        self.events.lock().unwrap().push(format!("run:{filename}"));
    }
    fn on_stage_start(&self, _run_id: u64, stage: Stage) {
        self.events.lock().unwrap().push(format!("start:{stage}"));
    }
    fn on_stage_complete(&self, _run_id: u64, stage: Stage, _elapsed_ms: u64) {
        self.events.lock().unwrap().push(format!("done:{stage}"));
    }
    fn on_run_failed(&self, _run_id: u64, failure: &StageFailure) {
        self.events
            .lock()
            .unwrap()
            .push(format!("failed:{}", failure.kind.code()));
    }
    fn on_run_complete(&self, _run_id: u64, output_filename: &str, _total_ms: u64) {
        self.events
            .lock()
            .unwrap()
            .push(format!("complete:{output_filename}"));
    }
    fn on_reset(&self, cancelled_run: Option<u64>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("reset:{}", cancelled_run.is_some()));
    }
}
