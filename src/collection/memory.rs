//! In-memory collection store.
//!
//! Backs the pipeline's unit tests and makes the crate runnable without a
//! host application. Implements the same contract a real store binding
//! would, including note-type reassignment with field/card index maps.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::OcrError;

use super::{CollectionStore, Note, NoteId, NoteType, NoteTypeId};

#[derive(Debug)]
pub struct MemoryCollection {
    media_dir: PathBuf,
    notes: BTreeMap<NoteId, Note>,
    note_types: BTreeMap<NoteTypeId, NoteType>,
    next_note_id: NoteId,
    next_note_type_id: NoteTypeId,
    save_count: usize,
}

impl MemoryCollection {
    pub fn new(media_dir: impl AsRef<Path>) -> Self {
        Self {
            media_dir: media_dir.as_ref().to_path_buf(),
            notes: BTreeMap::new(),
            note_types: BTreeMap::new(),
            next_note_id: 1,
            next_note_type_id: 1,
            save_count: 0,
        }
    }

    /// Register a note type and return its assigned id.
    pub fn add_type(&mut self, name: &str, fields: &[&str], templates: &[&str]) -> NoteTypeId {
        let id = self.next_note_type_id;
        self.next_note_type_id += 1;
        self.note_types.insert(
            id,
            NoteType {
                id,
                name: name.to_string(),
                fields: fields.iter().map(|f| f.to_string()).collect(),
                templates: templates.iter().map(|t| t.to_string()).collect(),
            },
        );
        id
    }

    /// Add a note of the given type. Field values are matched to the type's
    /// field list by position; missing trailing values become empty.
    pub fn add_note(&mut self, note_type: NoteTypeId, values: &[&str]) -> NoteId {
        let id = self.next_note_id;
        self.next_note_id += 1;
        let field_names = self
            .note_types
            .get(&note_type)
            .map(|nt| nt.fields.clone())
            .unwrap_or_default();
        let fields = field_names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, values.get(i).unwrap_or(&"").to_string()))
            .collect();
        self.notes.insert(
            id,
            Note {
                id,
                note_type,
                fields,
            },
        );
        id
    }

    /// How many times `save()` has been called.
    pub fn save_count(&self) -> usize {
        self.save_count
    }

    pub fn note_type_names(&self) -> Vec<String> {
        self.note_types.values().map(|nt| nt.name.clone()).collect()
    }
}

impl CollectionStore for MemoryCollection {
    fn note(&self, id: NoteId) -> Result<Note, OcrError> {
        self.notes
            .get(&id)
            .cloned()
            .ok_or_else(|| OcrError::Collection(format!("note {id} not found")))
    }

    fn update_note(&mut self, note: &Note) -> Result<(), OcrError> {
        if !self.notes.contains_key(&note.id) {
            return Err(OcrError::Collection(format!("note {} not found", note.id)));
        }
        self.notes.insert(note.id, note.clone());
        Ok(())
    }

    fn find_notes(&self, query: &str) -> Result<Vec<NoteId>, OcrError> {
        if query.is_empty() {
            return Ok(self.notes.keys().copied().collect());
        }
        let mut ids = Vec::new();
        for token in query.split(" OR ") {
            let nid = token
                .strip_prefix("nid:")
                .and_then(|s| s.parse::<NoteId>().ok())
                .ok_or_else(|| OcrError::Collection(format!("unsupported query: {query}")))?;
            if self.notes.contains_key(&nid) {
                ids.push(nid);
            }
        }
        Ok(ids)
    }

    fn media_dir(&self) -> PathBuf {
        self.media_dir.clone()
    }

    fn note_type(&self, id: NoteTypeId) -> Result<NoteType, OcrError> {
        self.note_types
            .get(&id)
            .cloned()
            .ok_or_else(|| OcrError::Collection(format!("note type {id} not found")))
    }

    fn note_type_by_name(&self, name: &str) -> Result<Option<NoteType>, OcrError> {
        Ok(self
            .note_types
            .values()
            .find(|nt| nt.name == name)
            .cloned())
    }

    fn add_note_type(&mut self, note_type: &NoteType) -> Result<NoteTypeId, OcrError> {
        let id = self.next_note_type_id;
        self.next_note_type_id += 1;
        let mut stored = note_type.clone();
        stored.id = id;
        self.note_types.insert(id, stored);
        Ok(id)
    }

    fn reassign_note_type(
        &mut self,
        note_ids: &[NoteId],
        from: NoteTypeId,
        to: NoteTypeId,
        field_map: &[usize],
        _card_map: &[usize],
    ) -> Result<(), OcrError> {
        let to_type = self.note_type(to)?;
        for &nid in note_ids {
            let note = self
                .notes
                .get(&nid)
                .ok_or_else(|| OcrError::Collection(format!("note {nid} not found")))?;
            if note.note_type != from {
                return Err(OcrError::Collection(format!(
                    "note {nid} is not of type {from}"
                )));
            }
            let mut values = vec![String::new(); to_type.fields.len()];
            for (src_idx, &dst_idx) in field_map.iter().enumerate() {
                if let (Some((_, value)), Some(slot)) =
                    (note.fields.get(src_idx), values.get_mut(dst_idx))
                {
                    *slot = value.clone();
                }
            }
            let fields = to_type
                .fields
                .iter()
                .cloned()
                .zip(values)
                .collect::<Vec<_>>();
            self.notes.insert(
                nid,
                Note {
                    id: nid,
                    note_type: to,
                    fields,
                },
            );
        }
        Ok(())
    }

    fn save(&mut self) -> Result<(), OcrError> {
        self.save_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::format_note_id_query;

    fn basic_store() -> (MemoryCollection, NoteTypeId, NoteId) {
        let mut store = MemoryCollection::new("/tmp/media");
        let nt = store.add_type("Basic", &["Front", "Back"], &["Card 1"]);
        let nid = store.add_note(nt, &["question", "answer"]);
        (store, nt, nid)
    }

    #[test]
    fn note_round_trip() {
        let (mut store, _, nid) = basic_store();
        let mut note = store.note(nid).unwrap();
        note.set_field("Front", "updated".to_string());
        store.update_note(&note).unwrap();
        assert_eq!(store.note(nid).unwrap().field("Front"), Some("updated"));
    }

    #[test]
    fn find_notes_by_id_query() {
        let (mut store, nt, first) = basic_store();
        let second = store.add_note(nt, &["q2", "a2"]);
        let ids = store
            .find_notes(&format_note_id_query(&[first, second]))
            .unwrap();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn find_notes_empty_query_returns_all() {
        let (mut store, nt, _) = basic_store();
        store.add_note(nt, &["q2", "a2"]);
        assert_eq!(store.find_notes("").unwrap().len(), 2);
    }

    #[test]
    fn find_notes_rejects_unknown_syntax() {
        let (store, _, _) = basic_store();
        assert!(store.find_notes("deck:Default").is_err());
    }

    #[test]
    fn reassign_appends_empty_field() {
        let (mut store, nt, nid) = basic_store();
        let wide = store.add_type("Basic_OCR", &["Front", "Back", "OCR"], &["Card 1_OCR"]);
        store
            .reassign_note_type(&[nid], nt, wide, &[0, 1], &[0])
            .unwrap();
        let note = store.note(nid).unwrap();
        assert_eq!(note.note_type, wide);
        assert_eq!(note.field("Front"), Some("question"));
        assert_eq!(note.field("Back"), Some("answer"));
        assert_eq!(note.field("OCR"), Some(""));
    }

    #[test]
    fn reassign_drops_unmapped_trailing_field() {
        let mut store = MemoryCollection::new("/tmp/media");
        let wide = store.add_type("Basic_OCR", &["Front", "Back", "OCR"], &["Card 1_OCR"]);
        let narrow = store.add_type("Basic", &["Front", "Back"], &["Card 1"]);
        let nid = store.add_note(wide, &["q", "a", "ocr text"]);
        store
            .reassign_note_type(&[nid], wide, narrow, &[0, 1], &[0])
            .unwrap();
        let note = store.note(nid).unwrap();
        assert_eq!(note.fields.len(), 2);
        assert_eq!(note.field("OCR"), None);
    }

    #[test]
    fn reassign_checks_source_type() {
        let (mut store, nt, nid) = basic_store();
        let other = store.add_type("Other", &["A"], &["Card 1"]);
        assert!(store
            .reassign_note_type(&[nid], other, nt, &[0], &[0])
            .is_err());
    }

    #[test]
    fn save_counts_commits() {
        let (mut store, _, _) = basic_store();
        store.save().unwrap();
        store.save().unwrap();
        assert_eq!(store.save_count(), 2);
    }
}
