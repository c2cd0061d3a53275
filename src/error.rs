//! Error taxonomy for the OCR pipeline.
//!
//! Per-image locate-time problems (missing file, unsupported format) are not
//! errors: the locator logs them and excludes the image. Everything here is
//! either fatal to the current job or a configuration mistake caught before
//! any I/O.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    /// The tesseract binary could not be found. Not retried; the user must
    /// install the engine (or point `JobConfig::engine_path` at it) and
    /// re-run.
    #[error(
        "tesseract OCR engine not found (searched: {}).\n\
         Install tesseract (https://tesseract-ocr.github.io/tessdoc/Installation.html) \
         or set the engine path in the job configuration",
        format_searched(searched)
    )]
    EngineNotFound { searched: Vec<PathBuf> },

    /// A tesseract invocation failed. This indicates a systemic problem
    /// (bad install, bad language data), so the whole dispatch aborts.
    #[error("tesseract exited with status {status:?}: {stderr}")]
    EngineExecution {
        status: Option<i32>,
        stderr: String,
    },

    /// User confirmed a cancellation request mid-dispatch. No note has been
    /// mutated; re-running the job from the start is safe.
    #[error("OCR job cancelled by user")]
    Cancelled,

    /// Rejected at job construction, before any I/O.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Propagated failure from the external collection store.
    #[error("collection error: {0}")]
    Collection(String),

    /// Manifest or temp-directory I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_searched(searched: &[PathBuf]) -> String {
    if searched.is_empty() {
        return "PATH".to_string();
    }
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
