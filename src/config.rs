//! Job configuration.
//!
//! One explicit struct carries every recognized option for a pipeline run.
//! Validation happens at job construction, before any I/O.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where recognized text is written back into the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOutput {
    /// Set a `title` attribute on the original image tag.
    Tooltip,
    /// Append a dedicated `OCR` field, migrating the note to a derived type.
    NewField,
}

/// Configuration for one OCR job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// ISO 639-2 language codes, joined with `+` for the engine.
    /// See https://www.loc.gov/standards/iso639-2/php/code_list.php
    pub languages: Vec<String>,
    /// Text output strategy.
    pub text_output: TextOutput,
    /// Maximum images per batch manifest.
    pub batch_size: usize,
    /// Group images into manifests (one engine call per manifest) instead of
    /// one engine call per image.
    pub use_batching: bool,
    /// Run engine calls on a worker pool instead of the caller's thread.
    pub use_multithreading: bool,
    /// Worker count. `None` means available parallelism. Ignored when
    /// multithreading is off.
    pub num_threads: Option<usize>,
    /// Explicit path to the tesseract binary, bypassing discovery.
    pub engine_path: Option<PathBuf>,
    /// Override for the engine's language-data directory.
    pub tessdata_dir: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            languages: vec!["eng".to_string()],
            text_output: TextOutput::Tooltip,
            batch_size: 5,
            use_batching: true,
            use_multithreading: true,
            num_threads: None,
            engine_path: None,
            tessdata_dir: None,
        }
    }
}

impl JobConfig {
    /// Reject bad values before the job touches the collection or the engine.
    pub fn validate(&self) -> Result<(), crate::error::OcrError> {
        use crate::error::OcrError::InvalidConfiguration;

        if self.languages.is_empty() {
            return Err(InvalidConfiguration("language list is empty".into()));
        }
        if self.languages.iter().any(|l| l.is_empty() || l.contains('+')) {
            return Err(InvalidConfiguration(format!(
                "malformed language codes: {:?}",
                self.languages
            )));
        }
        if self.batch_size == 0 {
            return Err(InvalidConfiguration("batch_size must be > 0".into()));
        }
        if self.num_threads == Some(0) {
            return Err(InvalidConfiguration("num_threads must be > 0".into()));
        }
        Ok(())
    }

    /// Language argument for the engine, e.g. `eng+deu`.
    pub fn lang_spec(&self) -> String {
        self.languages.join("+")
    }

    /// Worker count the dispatcher will actually use.
    pub fn effective_threads(&self) -> usize {
        if !self.use_multithreading {
            return 1;
        }
        self.num_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}
