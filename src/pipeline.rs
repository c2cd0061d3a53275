//! Job orchestration.
//!
//! Ties the stages together: locate images in the requested notes, plan
//! batches, dispatch engine work across threads, merge the output back onto
//! the images, and write text into the notes. The store is only touched
//! here, before and after the concurrent phase; workers see nothing but the
//! engine. The store is saved on the way out even when a job fails partway,
//! so notes already flushed stay flushed.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::batch::BatchPlan;
use crate::collection::{CollectionStore, NoteId};
use crate::config::JobConfig;
use crate::dispatch::{self, ProgressObserver, WorkItem};
use crate::engine::{OcrEngine, TesseractEngine};
use crate::error::OcrError;
use crate::locate::{FieldContent, ImageRef};
use crate::merge;
use crate::mutate::NoteMutator;

/// What a finished job touched, for the caller's completion message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub notes: usize,
    pub images: usize,
}

pub struct OcrPipeline<'a> {
    store: &'a mut dyn CollectionStore,
    config: JobConfig,
    /// Located lazily, right before the first dispatch. The removal path
    /// never needs a binary, so an uninstalled engine must not block it.
    engine: Option<Box<dyn OcrEngine>>,
}

impl std::fmt::Debug for OcrPipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrPipeline")
            .field("config", &self.config)
            .field("engine", &self.engine.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> OcrPipeline<'a> {
    /// Validate the config. The tesseract binary is located on the first
    /// recognition run, not here; `remove_from_notes` works without one.
    pub fn new(store: &'a mut dyn CollectionStore, config: JobConfig) -> Result<Self, OcrError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            engine: None,
        })
    }

    /// Same construction with an injected engine.
    pub fn with_engine(
        store: &'a mut dyn CollectionStore,
        config: JobConfig,
        engine: Box<dyn OcrEngine>,
    ) -> Result<Self, OcrError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            engine: Some(engine),
        })
    }

    /// Run OCR over every image embedded in the given notes and write the
    /// recognized text back per the configured output mode.
    pub fn run_on_notes(
        &mut self,
        note_ids: &[NoteId],
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<JobSummary, OcrError> {
        let result = self.run_job(note_ids, observer);
        if result.is_err() {
            // Notes flushed before the failure stay flushed.
            if let Err(save_err) = self.store.save() {
                tracing::warn!(error = %save_err, "store save during cleanup failed");
            }
        }
        result
    }

    /// Undo a previous run on the given notes: strip tooltip attributes and
    /// migrate notes back off the derived OCR type. Idempotent.
    pub fn remove_from_notes(&mut self, note_ids: &[NoteId]) -> Result<JobSummary, OcrError> {
        let fields = self.locate_fields(note_ids)?;
        let by_note = group_by_note(collect_images(&fields));
        let mut images = 0;

        let mut mutator = NoteMutator::new(self.store, self.config.text_output);
        for &note_id in note_ids {
            let note_images = by_note.get(&note_id).map(Vec::as_slice).unwrap_or(&[]);
            mutator.remove(note_id, note_images)?;
            images += note_images.len();
        }
        self.store.save()?;
        tracing::info!(notes = note_ids.len(), images, "OCR text removed");
        Ok(JobSummary {
            notes: note_ids.len(),
            images,
        })
    }

    fn run_job(
        &mut self,
        note_ids: &[NoteId],
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<JobSummary, OcrError> {
        let fields = self.locate_fields(note_ids)?;
        let images = collect_images(&fields);
        tracing::info!(
            notes = note_ids.len(),
            images = images.len(),
            batching = self.config.use_batching,
            "OCR job starting"
        );
        if images.is_empty() {
            return Ok(JobSummary {
                notes: note_ids.len(),
                images: 0,
            });
        }

        let threads = self.config.effective_threads();
        let merged = if self.config.use_batching {
            let plan = BatchPlan::build(images, self.config.batch_size)?;
            let items = plan.work_items();
            let results = dispatch::run(self.engine()?, &items, threads, observer)?;
            merge::merge_batched(&plan, &results)
        } else {
            let items = unique_image_items(&images);
            let results = dispatch::run(self.engine()?, &items, threads, observer)?;
            merge::merge_unbatched(images, &results)
        };

        let image_count = merged.len();
        let by_note = group_by_note(merged);
        let mut mutator = NoteMutator::new(self.store, self.config.text_output);
        for &note_id in note_ids {
            let Some(note_images) = by_note.get(&note_id) else {
                continue;
            };
            mutator.apply(note_id, note_images)?;
        }
        self.store.save()?;
        tracing::info!(
            notes = note_ids.len(),
            images = image_count,
            "OCR job finished"
        );
        Ok(JobSummary {
            notes: note_ids.len(),
            images: image_count,
        })
    }

    /// The configured engine, locating and validating the tesseract binary
    /// on the first call.
    fn engine(&mut self) -> Result<&dyn OcrEngine, OcrError> {
        match &mut self.engine {
            Some(engine) => Ok(&**engine),
            slot @ None => {
                let engine = Box::new(TesseractEngine::from_config(&self.config)?);
                Ok(&**slot.insert(engine))
            }
        }
    }

    /// Read every requested note and parse each field's markup against the
    /// media directory.
    fn locate_fields(&self, note_ids: &[NoteId]) -> Result<Vec<FieldContent>, OcrError> {
        let media_dir = self.store.media_dir();
        let mut fields = Vec::new();
        for &note_id in note_ids {
            let note = self.store.note(note_id)?;
            for (field_name, markup) in &note.fields {
                fields.push(FieldContent::parse(note_id, field_name, markup, &media_dir));
            }
        }
        Ok(fields)
    }
}

fn collect_images(fields: &[FieldContent]) -> Vec<ImageRef> {
    fields
        .iter()
        .flat_map(|f| f.images.iter().cloned())
        .collect()
}

/// One work item per distinct media path. The same file embedded in several
/// notes is recognized once; the merge fans the text back out.
fn unique_image_items(images: &[ImageRef]) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for image in images {
        let id = image.path.display().to_string();
        if seen.insert(id.clone()) {
            items.push(WorkItem {
                id,
                path: image.path.clone(),
            });
        }
    }
    items
}

fn group_by_note(images: Vec<ImageRef>) -> HashMap<NoteId, Vec<ImageRef>> {
    let mut by_note: HashMap<NoteId, Vec<ImageRef>> = HashMap::new();
    for image in images {
        by_note.entry(image.note_id).or_default().push(image);
    }
    by_note
}
