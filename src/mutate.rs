//! Note Mutator.
//!
//! Writes recognized text back into notes — as a `title` attribute on the
//! image tag, or into a dedicated trailing field after migrating the note
//! to a derived type — and implements the inverse removal of both. All
//! store access happens on the orchestrating thread; note-type changes go
//! through the store's own schema-change operations.

use std::collections::HashMap;

use crate::collection::{CollectionStore, NoteId, NoteType};
use crate::config::TextOutput;
use crate::error::OcrError;
use crate::locate::ImageRef;
use crate::markup;

/// Name of the appended field holding recognized text.
pub const OCR_FIELD_NAME: &str = "OCR";

/// Naming suffix of derived note types (and their primary template).
pub const OCR_TYPE_SUFFIX: &str = "_OCR";

/// Clone a note type into its OCR variant: renamed, one appended field,
/// primary template renamed. Pure; the source is untouched.
pub fn derive_ocr_note_type(src: &NoteType) -> NoteType {
    debug_assert!(!src.name.ends_with(OCR_TYPE_SUFFIX));
    let mut derived = src.clone();
    derived.id = 0;
    derived.name.push_str(OCR_TYPE_SUFFIX);
    derived.fields.push(OCR_FIELD_NAME.to_string());
    if let Some(first) = derived.templates.first_mut() {
        first.push_str(OCR_TYPE_SUFFIX);
    }
    derived
}

/// Inverse of [`derive_ocr_note_type`]: strip the naming suffix and the
/// appended field.
pub fn derive_original_note_type(src: &NoteType) -> NoteType {
    debug_assert!(src.name.ends_with(OCR_TYPE_SUFFIX));
    let mut original = src.clone();
    original.id = 0;
    original.name = original.name.replace(OCR_TYPE_SUFFIX, "");
    original.fields.retain(|f| f != OCR_FIELD_NAME);
    if let Some(first) = original.templates.first_mut() {
        *first = first.replace(OCR_TYPE_SUFFIX, "");
    }
    original
}

pub struct NoteMutator<'a> {
    store: &'a mut dyn CollectionStore,
    output: TextOutput,
}

impl<'a> NoteMutator<'a> {
    pub fn new(store: &'a mut dyn CollectionStore, output: TextOutput) -> Self {
        Self { store, output }
    }

    /// Write recognized text into one note and flush it. Idempotent per
    /// image: re-applying overwrites the previous text, never duplicates.
    pub fn apply(&mut self, note_id: NoteId, images: &[ImageRef]) -> Result<(), OcrError> {
        match self.output {
            TextOutput::Tooltip => self.apply_tooltip(note_id, images),
            TextOutput::NewField => self.apply_new_field(note_id, images),
        }
    }

    /// Inverse of [`apply`]: strip tooltip attributes from tracked image
    /// tags and, if the note sits on a derived type, migrate it back.
    pub fn remove(&mut self, note_id: NoteId, images: &[ImageRef]) -> Result<(), OcrError> {
        let note = self.store.note(note_id)?;
        let note_type = self.store.note_type(note.note_type)?;
        if note_type.name.ends_with(OCR_TYPE_SUFFIX) {
            let original = self.ensure_original_type(&note_type)?;
            self.migrate(note_id, &note_type, &original)?;
            tracing::info!(note_id, from = %note_type.name, to = %original.name, "note migrated back");
        }

        // Title attributes come off in both output modes; a tooltip job may
        // have run before a new-field job on the same note.
        let mut note = self.store.note(note_id)?;
        for (field_name, group) in group_by_field(images) {
            let Some(markup) = note.field(&field_name).map(str::to_string) else {
                continue;
            };
            let mut updated = markup;
            for image in group {
                updated =
                    markup::rewrite_tags_with_src(&updated, &image.src, markup::remove_title_attr);
            }
            note.set_field(&field_name, updated);
        }
        self.store.update_note(&note)
    }

    fn apply_tooltip(&mut self, note_id: NoteId, images: &[ImageRef]) -> Result<(), OcrError> {
        let mut note = self.store.note(note_id)?;
        for (field_name, group) in group_by_field(images) {
            let Some(markup) = note.field(&field_name).map(str::to_string) else {
                tracing::warn!(note_id, field_name, "field vanished since locate; skipping");
                continue;
            };
            let mut updated = markup;
            for image in group {
                // Empty text still sets an (empty) attribute so a later
                // remove behaves the same for every processed image.
                let text = image.text.as_deref().unwrap_or("");
                updated = markup::rewrite_tags_with_src(&updated, &image.src, |tag| {
                    markup::set_title_attr(tag, text)
                });
            }
            note.set_field(&field_name, updated);
        }
        self.store.update_note(&note)
    }

    fn apply_new_field(&mut self, note_id: NoteId, images: &[ImageRef]) -> Result<(), OcrError> {
        let note = self.store.note(note_id)?;
        let note_type = self.store.note_type(note.note_type)?;
        if !note_type.name.ends_with(OCR_TYPE_SUFFIX) {
            let derived = self.ensure_ocr_type(&note_type)?;
            self.migrate(note_id, &note_type, &derived)?;
            tracing::info!(note_id, from = %note_type.name, to = %derived.name, "note migrated to OCR type");
        }

        let mut content = String::new();
        for image in images {
            let text = image.text.as_deref().unwrap_or("");
            if text.is_empty() {
                continue;
            }
            let block = format!("Image: {}\n{}\n{}", image.name, "-".repeat(20), text);
            content.push_str(&block.replace('\n', "<br/>"));
        }

        let mut note = self.store.note(note_id)?;
        note.set_field(OCR_FIELD_NAME, content);
        self.store.update_note(&note)
    }

    /// Look up the derived type by name, creating it the first time this
    /// (type, job) combination occurs.
    fn ensure_ocr_type(&mut self, original: &NoteType) -> Result<NoteType, OcrError> {
        let name = format!("{}{}", original.name, OCR_TYPE_SUFFIX);
        if let Some(existing) = self.store.note_type_by_name(&name)? {
            tracing::debug!(%name, "derived note type exists, reusing");
            return Ok(existing);
        }
        let mut derived = derive_ocr_note_type(original);
        derived.id = self.store.add_note_type(&derived)?;
        tracing::info!(%name, "created derived note type");
        Ok(derived)
    }

    fn ensure_original_type(&mut self, derived: &NoteType) -> Result<NoteType, OcrError> {
        let name = derived.name.replace(OCR_TYPE_SUFFIX, "");
        if let Some(existing) = self.store.note_type_by_name(&name)? {
            tracing::debug!(%name, "original note type exists, reusing");
            return Ok(existing);
        }
        let mut original = derive_original_note_type(derived);
        original.id = self.store.add_note_type(&original)?;
        tracing::info!(%name, "recreated original note type");
        Ok(original)
    }

    /// Reassign one note between types, mapping fields and cards by
    /// position over the shorter of the two field lists.
    fn migrate(&mut self, note_id: NoteId, from: &NoteType, to: &NoteType) -> Result<(), OcrError> {
        let mapped_fields = from.fields.len().min(to.fields.len());
        let field_map: Vec<usize> = (0..mapped_fields).collect();
        let card_map: Vec<usize> = (0..from.templates.len().min(to.templates.len())).collect();
        self.store
            .reassign_note_type(&[note_id], from.id, to.id, &field_map, &card_map)
    }
}

fn group_by_field(images: &[ImageRef]) -> Vec<(String, Vec<&ImageRef>)> {
    let mut order = Vec::new();
    let mut groups: HashMap<&str, Vec<&ImageRef>> = HashMap::new();
    for image in images {
        if !groups.contains_key(image.field_name.as_str()) {
            order.push(image.field_name.clone());
        }
        groups.entry(image.field_name.as_str()).or_default().push(image);
    }
    order
        .into_iter()
        .map(|name| {
            let group = groups.remove(name.as_str()).unwrap_or_default();
            (name, group)
        })
        .collect()
}
