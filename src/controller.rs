//! The transformation pipeline controller.
//!
//! [`PipelineController`] owns one [`PipelineRun`] at a time and drives it
//! through the fixed stage order:
//!
//! ```text
//! Idle → Validating → Parsing → Mapping → Formatting → Verifying → Packaging → Done
//! ```
//!
//! The first failing stage moves the run to `Error`; nothing is retried.
//!
//! ## Cancellation
//!
//! Every `start` and every [`reset`](PipelineController::reset) bumps a run
//! generation published on a [`tokio::sync::watch`] channel. The stage that
//! is in flight when a reset arrives is raced against that channel and
//! dropped as soon as the generation moves; `start` then returns
//! [`PipelineError::Cancelled`]. Independently, every write to the run
//! record happens under the run lock after checking the generation, so a
//! result that slips past the race can never land in a newer run.

use crate::config::{TransformConfig, VerificationMode};
use crate::error::{ErrorKind, PipelineError, ServiceError, StageFailure};
use crate::manifest::Manifest;
use crate::output::{RenderedDocument, RunSnapshot, RunStats, TransformOutput};
use crate::paper::{output_filename, ExtractedText, RawDocument, StructuredPaper};
use crate::pipeline::{
    validate, ContentVerification, DocumentRenderer, DocxTextExtractor, FixedDelayVerification,
    IeeeDocxRenderer, LlmStructureInference, StructureInference, TextExtractor,
    VerificationPolicy,
};
use crate::progress::{NoopProgressCallback, PipelineProgressCallback};
use crate::provider::resolve_provider;
use crate::stage::Stage;
use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

static NOOP_CALLBACK: NoopProgressCallback = NoopProgressCallback;

/// The controller's record of the current run.
///
/// Replaced wholesale by [`PipelineController::reset`]; artifacts accumulate
/// as stages succeed.
#[derive(Debug, Clone, Default)]
pub struct PipelineRun {
    pub run_id: u64,
    pub stage: Stage,
    pub history: Vec<Stage>,
    pub filename: Option<String>,
    pub text: Option<ExtractedText>,
    pub paper: Option<StructuredPaper>,
    pub rendered: Option<RenderedDocument>,
    pub manifest: Option<Manifest>,
    pub failure: Option<StageFailure>,
}

impl PipelineRun {
    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id,
            stage: self.stage,
            history: self.history.clone(),
            filename: self.filename.clone(),
            failure: self.failure.clone(),
        }
    }
}

/// A stage transition, as seen by [`PipelineController::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEvent {
    pub run_id: u64,
    pub stage: Stage,
}

struct Inner {
    config: TransformConfig,
    extractor: Arc<dyn TextExtractor>,
    inference: Arc<dyn StructureInference>,
    renderer: Arc<dyn DocumentRenderer>,
    verifier: Arc<dyn VerificationPolicy>,
    run: Mutex<PipelineRun>,
    generation: watch::Sender<u64>,
    events: watch::Sender<StageEvent>,
}

/// Drives documents through the transformation stages.
///
/// Cheap to clone; clones share the same run, so one task can `start` while
/// another observes or resets.
#[derive(Clone)]
pub struct PipelineController {
    inner: Arc<Inner>,
}

/// Builder for [`PipelineController`]. Collaborators not supplied fall back
/// to the `.docx` / LLM implementations.
pub struct PipelineControllerBuilder {
    config: TransformConfig,
    extractor: Option<Arc<dyn TextExtractor>>,
    inference: Option<Arc<dyn StructureInference>>,
    renderer: Option<Arc<dyn DocumentRenderer>>,
    verifier: Option<Arc<dyn VerificationPolicy>>,
}

impl PipelineControllerBuilder {
    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn inference(mut self, inference: Arc<dyn StructureInference>) -> Self {
        self.inference = Some(inference);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn VerificationPolicy>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Build the controller.
    ///
    /// Resolves the LLM provider when no inference collaborator was given,
    /// failing with [`PipelineError::ProviderNotConfigured`] if none is
    /// available.
    pub fn build(self) -> Result<PipelineController, PipelineError> {
        let config = self.config;

        let inference: Arc<dyn StructureInference> = match self.inference {
            Some(i) => i,
            None => {
                let provider = resolve_provider(
                    config.provider.as_ref(),
                    config.provider_name.as_deref(),
                    config.model.as_deref(),
                )?;
                debug!(
                    "LLM provider resolved (requested: {}, model: {})",
                    config.provider_name.as_deref().unwrap_or("auto"),
                    config.model.as_deref().unwrap_or("default")
                );
                Arc::new(LlmStructureInference::new(provider, &config))
            }
        };

        let verifier: Arc<dyn VerificationPolicy> = match self.verifier {
            Some(v) => v,
            None => match config.verification {
                VerificationMode::Content => Arc::new(ContentVerification),
                VerificationMode::FixedDelay { ms } => {
                    Arc::new(FixedDelayVerification::new(Duration::from_millis(ms)))
                }
            },
        };
        let extractor: Arc<dyn TextExtractor> = match self.extractor {
            Some(e) => e,
            None => Arc::new(DocxTextExtractor),
        };
        let renderer: Arc<dyn DocumentRenderer> = match self.renderer {
            Some(r) => r,
            None => Arc::new(IeeeDocxRenderer::default()),
        };

        let (generation, _) = watch::channel(0u64);
        let (events, _) = watch::channel(StageEvent {
            run_id: 0,
            stage: Stage::Idle,
        });

        Ok(PipelineController {
            inner: Arc::new(Inner {
                extractor,
                inference,
                renderer,
                verifier,
                config,
                run: Mutex::new(PipelineRun::default()),
                generation,
                events,
            }),
        })
    }
}

impl PipelineController {
    pub fn builder(config: TransformConfig) -> PipelineControllerBuilder {
        PipelineControllerBuilder {
            config,
            extractor: None,
            inference: None,
            renderer: None,
            verifier: None,
        }
    }

    /// Controller with the default collaborators.
    pub fn from_config(config: TransformConfig) -> Result<Self, PipelineError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &TransformConfig {
        &self.inner.config
    }

    /// Run `document` through every stage.
    ///
    /// Rejected without entering `Validating` when the controller is not
    /// `Idle` ([`PipelineError::RunNotIdle`]) or the filename is not `.docx`
    /// ([`PipelineError::UnsupportedDocument`]). A stage failure leaves the
    /// run in `Error` and is returned as [`PipelineError::Stage`]; a reset
    /// during the run returns [`PipelineError::Cancelled`].
    ///
    /// Dropping the returned future mid-run leaves the controller in the
    /// stage it had reached; call [`reset`](Self::reset) before reusing it.
    pub async fn start(&self, document: RawDocument) -> Result<TransformOutput, PipelineError> {
        let run_id = self.begin(&document)?;
        let config = &self.inner.config;
        let started = Instant::now();
        let mut timings = Vec::with_capacity(Stage::STEPS.len());

        info!(
            "Run {run_id}: transforming {} ({} bytes)",
            document.filename(),
            document.len()
        );
        self.callback().on_run_start(run_id, document.filename());

        // ── Validating ──
        let report = self
            .run_stage(run_id, Stage::Validating, &mut timings, async {
                let report = validate::inspect_async(&document, &config.protected_marker)
                    .await
                    .map_err(|e| {
                        StageFailure::new(Stage::Validating, ErrorKind::TransformationFailed)
                            .with_detail(format!("validation task failed: {e}"))
                    })?;
                match report.failure(config.reject_tracked_changes) {
                    Some(failure) => Err(failure),
                    None => Ok(report),
                }
            })
            .await?;
        if let Some(e) = &report.package_error {
            debug!("Run {run_id}: package not inspected during validation: {e}");
        }

        // ── Parsing ──
        let text = self
            .run_stage(run_id, Stage::Parsing, &mut timings, async {
                let raw = self.inner.extractor.extract(document.bytes()).await.map_err(|e| {
                    StageFailure::new(Stage::Parsing, ErrorKind::DocumentCorrupt)
                        .with_detail(e.to_string())
                })?;
                ExtractedText::new(raw, config.min_text_chars).map_err(|short| {
                    StageFailure::new(Stage::Parsing, ErrorKind::InsufficientStructure).with_detail(
                        format!(
                            "extracted {} characters, at least {} required",
                            short.chars, short.min_chars
                        ),
                    )
                })
            })
            .await?;
        debug!(
            "Run {run_id}: extracted {} chars, {} words",
            text.char_count(),
            text.word_count()
        );
        self.commit(run_id, |run| run.text = Some(text.clone()))?;

        // ── Mapping ──
        let paper = self
            .run_stage(run_id, Stage::Mapping, &mut timings, async {
                let inferred = match self.inner.inference.infer(text.as_str()).await {
                    Ok(paper) if paper.is_empty() => {
                        warn!("Run {run_id}: structure inference returned no content");
                        paper
                    }
                    Ok(paper) => paper,
                    Err(ServiceError::Malformed(detail)) => {
                        warn!("Run {run_id}: malformed structure response, using empty structure: {detail}");
                        StructuredPaper::default()
                    }
                    Err(e) => {
                        return Err(StageFailure::new(Stage::Mapping, e.taxonomy_kind())
                            .with_detail(e.to_string()))
                    }
                };
                inferred.validated(document.filename()).map_err(|detail| {
                    StageFailure::new(Stage::Mapping, ErrorKind::InsufficientStructure)
                        .with_detail(detail)
                })
            })
            .await?;
        self.commit(run_id, |run| run.paper = Some(paper.clone()))?;

        // ── Formatting ──
        let bytes = self
            .run_stage(run_id, Stage::Formatting, &mut timings, async {
                self.inner.renderer.render(&paper).await.map_err(|e| {
                    StageFailure::new(Stage::Formatting, ErrorKind::TransformationFailed)
                        .with_detail(e.to_string())
                })
            })
            .await?;
        let rendered = RenderedDocument {
            filename: output_filename(document.filename(), &config.output_suffix),
            bytes,
        };
        self.commit(run_id, |run| run.rendered = Some(rendered.clone()))?;

        // ── Verifying ──
        self.run_stage(run_id, Stage::Verifying, &mut timings, async {
            self.inner
                .verifier
                .verify(&paper, &rendered.bytes)
                .await
                .map_err(|diagnostics| {
                    StageFailure::new(Stage::Verifying, ErrorKind::ContentMismatch)
                        .with_detail(format!("{} fragment(s) did not survive rendering", diagnostics.len()))
                        .with_diagnostics(diagnostics)
                })
        })
        .await?;

        // ── Packaging ──
        let manifest = self
            .run_stage(run_id, Stage::Packaging, &mut timings, async {
                Ok(Manifest::build(
                    &paper,
                    document.bytes(),
                    &rendered.bytes,
                    Utc::now(),
                ))
            })
            .await?;
        self.commit(run_id, |run| run.manifest = Some(manifest.clone()))?;

        let total_ms = started.elapsed().as_millis() as u64;
        self.finish(run_id, &rendered.filename, total_ms)?;

        let stats = RunStats {
            run_id,
            total_duration_ms: total_ms,
            stage_durations_ms: timings,
            input_bytes: document.len(),
            extracted_chars: text.char_count(),
            extracted_words: text.word_count(),
            sections: paper.sections.len(),
            references: paper.references.len(),
            output_bytes: rendered.bytes.len(),
        };

        Ok(TransformOutput {
            document: rendered,
            manifest,
            paper,
            stats,
        })
    }

    /// Return to `Idle`, discarding the current run and its artifacts.
    ///
    /// An in-flight run is cancelled: its pending stage is dropped and its
    /// `start` call returns [`PipelineError::Cancelled`].
    pub fn reset(&self) {
        let cancelled = {
            let mut run = self.lock_run();
            let cancelled = run.stage.is_running().then_some(run.run_id);
            self.inner.generation.send_modify(|g| *g += 1);
            *run = PipelineRun::default();
            cancelled
        };
        self.inner.events.send_replace(StageEvent {
            run_id: 0,
            stage: Stage::Idle,
        });

        match cancelled {
            Some(id) => info!("Run {id}: cancelled by reset"),
            None => debug!("Pipeline reset"),
        }
        self.callback().on_reset(cancelled);
    }

    pub fn stage(&self) -> Stage {
        self.lock_run().stage
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.lock_run().snapshot()
    }

    /// The rendered document; only after the run reached `Done`.
    pub fn output(&self) -> Result<RenderedDocument, PipelineError> {
        let run = self.lock_run();
        match (&run.stage, &run.rendered) {
            (Stage::Done, Some(rendered)) => Ok(rendered.clone()),
            (stage, _) => Err(PipelineError::NoOutput { stage: *stage }),
        }
    }

    /// The manifest of a finished run. `None` unless the run is `Done`.
    pub fn manifest(&self) -> Option<Manifest> {
        let run = self.lock_run();
        (run.stage == Stage::Done)
            .then(|| run.manifest.clone())
            .flatten()
    }

    /// The failure record, while the run is in `Error`.
    pub fn failure(&self) -> Option<StageFailure> {
        self.lock_run().failure.clone()
    }

    /// Stream of stage transitions, starting with the current one.
    ///
    /// Backed by a `watch` channel: a slow reader sees the latest transition,
    /// not every intermediate one. Use a [`PipelineProgressCallback`] when
    /// every event matters.
    pub fn subscribe(&self) -> WatchStream<StageEvent> {
        WatchStream::new(self.inner.events.subscribe())
    }

    // ── Internals ──

    fn callback(&self) -> &dyn PipelineProgressCallback {
        self.inner
            .config
            .progress_callback
            .as_deref()
            .unwrap_or(&NOOP_CALLBACK)
    }

    fn lock_run(&self) -> MutexGuard<'_, PipelineRun> {
        self.inner
            .run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, run_id: u64) -> bool {
        *self.inner.generation.borrow() == run_id
    }

    /// Check preconditions and open a new run. The run stays `Idle` until
    /// the first stage is entered.
    fn begin(&self, document: &RawDocument) -> Result<u64, PipelineError> {
        let mut run = self.lock_run();
        // A non-zero id on an Idle run means another start is between here
        // and its first stage.
        if run.stage != Stage::Idle || run.run_id != 0 {
            return Err(PipelineError::RunNotIdle { stage: run.stage });
        }
        if !document.has_docx_extension() {
            return Err(PipelineError::UnsupportedDocument {
                filename: document.filename().to_string(),
            });
        }
        self.inner.generation.send_modify(|g| *g += 1);
        let run_id = *self.inner.generation.borrow();
        *run = PipelineRun {
            run_id,
            filename: Some(document.filename().to_string()),
            ..Default::default()
        };
        Ok(run_id)
    }

    /// Apply `write` to the run if it is still current.
    fn commit(
        &self,
        run_id: u64,
        write: impl FnOnce(&mut PipelineRun),
    ) -> Result<(), PipelineError> {
        let mut run = self.lock_run();
        if !self.is_current(run_id) {
            return Err(PipelineError::Cancelled { run_id });
        }
        write(&mut run);
        Ok(())
    }

    fn transition(&self, run_id: u64, to: Stage) -> Result<(), PipelineError> {
        {
            let mut run = self.lock_run();
            if !self.is_current(run_id) {
                return Err(PipelineError::Cancelled { run_id });
            }
            if !run.stage.can_transition_to(to) {
                return Err(PipelineError::Internal(format!(
                    "illegal transition {} → {to}",
                    run.stage
                )));
            }
            run.stage = to;
            run.history.push(to);
        }
        self.inner.events.send_replace(StageEvent { run_id, stage: to });
        Ok(())
    }

    /// Enter `stage`, run `work` under the stage timeout and the cancellation
    /// race, and record the outcome.
    async fn run_stage<T, F>(
        &self,
        run_id: u64,
        stage: Stage,
        timings: &mut Vec<(Stage, u64)>,
        work: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, StageFailure>>,
    {
        self.transition(run_id, stage)?;
        debug!("Run {run_id}: entered {stage}");
        self.callback().on_stage_start(run_id, stage);

        let started = Instant::now();
        let limit = self.inner.config.stage_timeout();
        let bounded = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
                    Err(StageFailure::new(stage, ErrorKind::StageTimedOut)
                        .with_detail(format!("{stage} exceeded {}s", limit.as_secs())))
                }),
                None => work.await,
            }
        };

        let mut generation = self.inner.generation.subscribe();
        let outcome = tokio::select! {
            outcome = bounded => outcome,
            _ = generation.wait_for(|g| *g != run_id) => {
                debug!("Run {run_id}: {stage} dropped by reset");
                return Err(PipelineError::Cancelled { run_id });
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                timings.push((stage, elapsed_ms));
                debug!("Run {run_id}: {stage} done in {elapsed_ms}ms");
                self.callback().on_stage_complete(run_id, stage, elapsed_ms);
                Ok(value)
            }
            Err(failure) => Err(self.fail(run_id, failure)),
        }
    }

    fn fail(&self, run_id: u64, failure: StageFailure) -> PipelineError {
        {
            let mut run = self.lock_run();
            if !self.is_current(run_id) {
                return PipelineError::Cancelled { run_id };
            }
            run.stage = Stage::Error;
            run.history.push(Stage::Error);
            run.failure = Some(failure.clone());
        }
        self.inner.events.send_replace(StageEvent {
            run_id,
            stage: Stage::Error,
        });

        warn!(
            "Run {run_id}: {} failed [{}]: {}",
            failure.stage,
            failure.kind.code(),
            failure.detail.as_deref().unwrap_or(&failure.message)
        );
        self.callback().on_run_failed(run_id, &failure);
        PipelineError::Stage(failure)
    }

    fn finish(&self, run_id: u64, output_filename: &str, total_ms: u64) -> Result<(), PipelineError> {
        self.transition(run_id, Stage::Done)?;
        info!("Run {run_id}: done in {total_ms}ms → {output_filename}");
        self.callback()
            .on_run_complete(run_id, output_filename, total_ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoInference;

    #[async_trait]
    impl StructureInference for NoInference {
        async fn infer(&self, _text: &str) -> Result<StructuredPaper, ServiceError> {
            Err(ServiceError::Unsupported("test".into()))
        }
    }

    fn controller() -> PipelineController {
        PipelineController::builder(TransformConfig::default())
            .inference(Arc::new(NoInference))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_controller_is_idle_without_output() {
        let c = controller();
        assert_eq!(c.stage(), Stage::Idle);
        assert!(c.manifest().is_none());
        assert!(matches!(
            c.output(),
            Err(PipelineError::NoOutput { stage: Stage::Idle })
        ));
        assert_eq!(c.snapshot().run_id, 0);
    }

    #[tokio::test]
    async fn non_docx_is_rejected_before_validating() {
        let c = controller();
        let err = c
            .start(RawDocument::new("paper.pdf", b"%PDF".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedDocument { .. }));
        assert_eq!(c.stage(), Stage::Idle);
        assert!(c.snapshot().history.is_empty());
    }

    #[tokio::test]
    async fn corrupt_bytes_fail_in_parsing() {
        let c = controller();
        let err = c
            .start(RawDocument::new("paper.docx", b"not a zip".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DocumentCorrupt));
        let snap = c.snapshot();
        assert_eq!(snap.stage, Stage::Error);
        assert_eq!(
            snap.history,
            vec![Stage::Validating, Stage::Parsing, Stage::Error]
        );
    }

    #[tokio::test]
    async fn start_after_error_needs_reset() {
        let c = controller();
        let _ = c
            .start(RawDocument::new("paper.docx", b"not a zip".to_vec()))
            .await;
        let err = c
            .start(RawDocument::new("paper.docx", b"not a zip".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RunNotIdle { stage: Stage::Error }));

        c.reset();
        assert_eq!(c.stage(), Stage::Idle);
        assert!(c.failure().is_none());
    }
}
