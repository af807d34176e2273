//! Pipeline collaborators for `.docx` to IEEE conversion.
//!
//! Each submodule implements the work of one or two controller stages
//! behind a trait, so the controller can be driven by in-process fakes in
//! tests and real implementations can be swapped without touching it.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ validate ──▶ extract ──▶ infer ──▶ render ──▶ verify
//!           (zip/xml)    (zip/xml)   (LLM)     (xml/zip)  (re-extract)
//! ```
//!
//! 1. [`validate`] — access restrictions and tracked changes (`Validating`)
//! 2. [`extract`]  — [`TextExtractor`]: body text of `word/document.xml` (`Parsing`)
//! 3. [`infer`]    — [`StructureInference`]: text to [`crate::StructuredPaper`]
//!    (`Mapping`); the only collaborator with network I/O
//! 4. [`render`]   — [`DocumentRenderer`]: IEEE two-column WordprocessingML
//!    (`Formatting`)
//! 5. [`verify`]   — [`VerificationPolicy`]: rendered text against the paper
//!    (`Verifying`)
//!
//! [`docx`] holds the OOXML reading helpers the others share.

pub mod docx;
pub mod extract;
pub mod infer;
pub mod render;
pub mod validate;
pub mod verify;

pub use extract::{DocxTextExtractor, TextExtractor};
pub use infer::{LlmStructureInference, StructureInference};
pub use render::{DocumentRenderer, IeeeDocxRenderer, IeeeLayout};
pub use validate::ValidationReport;
pub use verify::{ContentVerification, FixedDelayVerification, VerificationPolicy};
