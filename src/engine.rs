//! OCR Engine Adapter.
//!
//! Invokes the external tesseract binary on one input — a single image, or
//! a manifest file listing image paths — and returns the raw text it wrote
//! to stdout. Engine discovery and validation happen once, before first
//! use; per-invocation failures carry the exit status and captured stderr.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::JobConfig;
use crate::error::OcrError;

/// Tesseract caps its internal parallelism at 4 threads; below that we pin
/// the child via OMP_THREAD_LIMIT so engine processes don't oversubscribe
/// the worker pool.
const ENGINE_MAX_INTERNAL_THREADS: usize = 4;

/// Seam between the dispatcher and the external process. Implemented by
/// [`TesseractEngine`] in production and by mocks in tests.
pub trait OcrEngine: Send + Sync {
    /// Run OCR on `input` (an image file, or a manifest of image paths) and
    /// return the engine's raw text output.
    fn recognize(&self, input: &Path) -> Result<String, OcrError>;
}

pub struct TesseractEngine {
    binary: PathBuf,
    lang_spec: String,
    tessdata_dir: Option<PathBuf>,
    /// OMP_THREAD_LIMIT for child processes, when capped.
    thread_limit: Option<usize>,
}

impl TesseractEngine {
    /// Locate and validate the binary, then configure the engine from the
    /// job config. Fails with `EngineNotFound` before any work is dispatched.
    pub fn from_config(config: &JobConfig) -> Result<Self, OcrError> {
        let binary = Self::locate(config.engine_path.as_deref())?;
        let threads = config.effective_threads();
        let engine = Self {
            binary,
            lang_spec: config.lang_spec(),
            tessdata_dir: config.tessdata_dir.clone(),
            thread_limit: (threads < ENGINE_MAX_INTERNAL_THREADS).then_some(threads),
        };
        if let Some(version) = engine.version() {
            tracing::debug!(engine = %engine.binary.display(), %version, "tesseract located");
        }
        Ok(engine)
    }

    /// Find the tesseract binary: explicit override, then PATH, then
    /// platform-default install locations.
    pub fn locate(override_path: Option<&Path>) -> Result<PathBuf, OcrError> {
        if let Some(path) = override_path {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return Err(OcrError::EngineNotFound {
                searched: vec![path.to_path_buf()],
            });
        }

        if let Ok(found) = which::which("tesseract") {
            return Ok(found);
        }

        let defaults = platform_default_paths();
        if let Some(found) = defaults.iter().find(|p| p.is_file()) {
            return Ok(found.clone());
        }
        Err(OcrError::EngineNotFound { searched: defaults })
    }

    /// Engine version string, best effort (for diagnostics in bug reports).
    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.binary).arg("--version").output().ok()?;
        // Tesseract prints its version banner to stderr on older releases.
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        text.lines().next().map(|l| l.trim().to_string())
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, input: &Path) -> Result<String, OcrError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(input)
            .arg("stdout")
            .args(["-l", &self.lang_spec])
            .args(["--oem", "1"]);
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        match self.thread_limit {
            Some(limit) => {
                cmd.env("OMP_THREAD_LIMIT", limit.to_string());
            }
            None => {
                cmd.env_remove("OMP_THREAD_LIMIT");
            }
        }

        let output = cmd.output()?;
        if !output.status.success() {
            return Err(OcrError::EngineExecution {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn platform_default_paths() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        vec![PathBuf::from(
            r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        )]
    } else if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/opt/homebrew/bin/tesseract"),
            PathBuf::from("/usr/local/bin/tesseract"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/bin/tesseract"),
            PathBuf::from("/usr/local/bin/tesseract"),
        ]
    }
}

/// Scripted engine for tests: returns canned text per input path, without
/// spawning a process.
pub struct MockEngine {
    responses: HashMap<String, String>,
    fallback: Option<String>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            fallback: None,
        }
    }

    pub fn with_response(mut self, input: impl Into<String>, text: impl Into<String>) -> Self {
        self.responses.insert(input.into(), text.into());
        self
    }

    /// Text returned for any input without a scripted response.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for MockEngine {
    fn recognize(&self, input: &Path) -> Result<String, OcrError> {
        let key = input.display().to_string();
        if let Some(text) = self.responses.get(&key) {
            return Ok(text.clone());
        }
        if let Some(fallback) = &self.fallback {
            return Ok(fallback.clone());
        }
        Err(OcrError::EngineExecution {
            status: Some(1),
            stderr: format!("no scripted response for {key}"),
        })
    }
}
