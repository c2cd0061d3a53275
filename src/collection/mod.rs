//! Contract with the external collection store.
//!
//! The host application owns note storage, scheduling, and note types. This
//! module defines the narrow surface the pipeline consumes: note lookup and
//! flush, note-type lookup/creation/reassignment, a note-id query formatter,
//! the media directory, and a save/commit hook.
//!
//! The store is not safe for concurrent access. Every method is called from
//! the orchestrating thread only; OCR worker threads never see it.

pub mod memory;

use std::path::PathBuf;

use crate::error::OcrError;

pub use memory::MemoryCollection;

pub type NoteId = i64;
pub type NoteTypeId = i64;

/// A note as read from (and written back to) the store. Field order is the
/// note type's field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub note_type: NoteTypeId,
    pub fields: Vec<(String, String)>,
}

impl Note {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Overwrite a field's markup. Returns false if the note has no such
    /// field.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => {
                *v = value;
                true
            }
            None => false,
        }
    }
}

/// A note type (model): the ordered field and template lists a note conforms
/// to. Mutated only through explicit derive-and-reassign, never in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteType {
    /// Assigned by the store; 0 for a type not yet added.
    pub id: NoteTypeId,
    pub name: String,
    pub fields: Vec<String>,
    pub templates: Vec<String>,
}

/// Narrow contract with the host application's collection store.
pub trait CollectionStore {
    fn note(&self, id: NoteId) -> Result<Note, OcrError>;

    /// Flush a mutated note back to the store.
    fn update_note(&mut self, note: &Note) -> Result<(), OcrError>;

    /// Note ids matching a search expression (see [`format_note_id_query`]).
    fn find_notes(&self, query: &str) -> Result<Vec<NoteId>, OcrError>;

    /// Root directory of the media file store.
    fn media_dir(&self) -> PathBuf;

    fn note_type(&self, id: NoteTypeId) -> Result<NoteType, OcrError>;

    fn note_type_by_name(&self, name: &str) -> Result<Option<NoteType>, OcrError>;

    /// Add a new note type (ignoring `note_type.id`) and return the assigned
    /// id. A schema change; the store provides the transactional guarantee.
    fn add_note_type(&mut self, note_type: &NoteType) -> Result<NoteTypeId, OcrError>;

    /// Move notes from one type to another. `field_map[i]` is the
    /// destination field index for source field `i`; source fields beyond
    /// the map are dropped, unfilled destination fields become empty.
    /// `card_map` maps template/card indices the same way.
    fn reassign_note_type(
        &mut self,
        note_ids: &[NoteId],
        from: NoteTypeId,
        to: NoteTypeId,
        field_map: &[usize],
        card_map: &[usize],
    ) -> Result<(), OcrError>;

    /// Commit and let the host UI refresh. Called once per job.
    fn save(&mut self) -> Result<(), OcrError>;
}

/// Build a store query matching exactly the given note ids:
/// `nid:123 OR nid:456`.
pub fn format_note_id_query(note_ids: &[NoteId]) -> String {
    note_ids
        .iter()
        .map(|nid| format!("nid:{nid}"))
        .collect::<Vec<_>>()
        .join(" OR ")
}
