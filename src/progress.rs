//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::TransformConfigBuilder::progress_callback`] to observe a
//! run as it moves through its stages. Callers that prefer polling or a
//! stream can use [`crate::controller::PipelineController::subscribe`]
//! instead; both see the same transitions.
//!
//! # Example
//!
//! ```rust
//! use docx2ieee::{PipelineProgressCallback, Stage, TransformConfig};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl PipelineProgressCallback for Printer {
//!     fn on_stage_start(&self, _run_id: u64, stage: Stage) {
//!         eprintln!("→ {stage}");
//!     }
//! }
//!
//! let config = TransformConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::StageFailure;
use crate::stage::Stage;
use std::sync::Arc;

/// Called by the controller as a run moves through its stages.
///
/// All methods default to no-ops. Calls for one run arrive in stage order;
/// several controllers may share one callback, so implementations must be
/// `Send + Sync`.
pub trait PipelineProgressCallback: Send + Sync {
    /// A run was accepted and is about to enter `Validating`.
    fn on_run_start(&self, run_id: u64, filename: &str) {
        let _ = (run_id, filename);
    }

    /// The run entered `stage`.
    fn on_stage_start(&self, run_id: u64, stage: Stage) {
        let _ = (run_id, stage);
    }

    /// `stage` produced its artifact.
    ///
    /// # Arguments
    /// * `elapsed_ms` — wall-clock time spent in the stage
    fn on_stage_complete(&self, run_id: u64, stage: Stage, elapsed_ms: u64) {
        let _ = (run_id, stage, elapsed_ms);
    }

    /// The run entered `Error`.
    fn on_run_failed(&self, run_id: u64, failure: &StageFailure) {
        let _ = (run_id, failure);
    }

    /// The run reached `Done`.
    fn on_run_complete(&self, run_id: u64, output_filename: &str, total_ms: u64) {
        let _ = (run_id, output_filename, total_ms);
    }

    /// The controller was reset back to `Idle`.
    fn on_reset(&self, cancelled_run: Option<u64>) {
        let _ = cancelled_run;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TransformConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_stage_start(&self, _run_id: u64, stage: Stage) {
            self.events.lock().unwrap().push(format!("start:{stage}"));
        }

        fn on_run_failed(&self, _run_id: u64, failure: &StageFailure) {
            self.events
                .lock()
                .unwrap()
                .push(format!("failed:{}", failure.kind));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(1, "a.docx");
        cb.on_stage_start(1, Stage::Validating);
        cb.on_stage_complete(1, Stage::Validating, 3);
        cb.on_run_failed(
            1,
            &StageFailure::new(Stage::Parsing, ErrorKind::DocumentCorrupt),
        );
        cb.on_run_complete(1, "a_IEEE.docx", 10);
        cb.on_reset(Some(1));
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_stage_start(1, Stage::Parsing);
        rec.on_stage_complete(1, Stage::Parsing, 5);
        rec.on_run_failed(
            1,
            &StageFailure::new(Stage::Mapping, ErrorKind::TransformationFailed),
        );
        let events = rec.events.lock().unwrap();
        assert_eq!(*events, vec!["start:Parsing", "failed:TRANSFORM_FAILED"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(2, Stage::Mapping);
    }
}
