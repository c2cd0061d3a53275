//! Batch OCR for image-bearing flashcard notes.
//!
//! Finds the images embedded in a set of notes, runs them through the
//! external tesseract engine — batched into manifest files and spread over
//! a worker pool — and writes the recognized text back into the notes,
//! either as `title` tooltips on the image tags or into a dedicated field
//! on a derived note type. Both writes are reversible.
//!
//! The host application implements [`CollectionStore`] over its note
//! storage and [`ProgressObserver`] over its progress dialog, then drives
//! jobs through [`OcrPipeline`].

pub mod batch;
pub mod collection;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod locate;
pub mod markup;
pub mod merge;
pub mod mutate;
pub mod pipeline;

pub use collection::{
    format_note_id_query, CollectionStore, MemoryCollection, Note, NoteId, NoteType, NoteTypeId,
};
pub use config::{JobConfig, TextOutput};
pub use dispatch::ProgressObserver;
pub use engine::{OcrEngine, TesseractEngine};
pub use error::OcrError;
pub use locate::{FieldContent, ImageRef, SUPPORTED_EXTENSIONS};
pub use merge::clean_ocr_text;
pub use pipeline::{JobSummary, OcrPipeline};

#[cfg(test)]
pub(crate) mod test_support {
    /// Route crate tracing through the test harness; `RUST_LOG=debug cargo
    /// test` then shows the pipeline's structured logs. Safe to call from
    /// every test, only the first installation wins.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}
