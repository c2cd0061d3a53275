//! Image Locator.
//!
//! Parses a field's markup for embedded image references and validates them
//! against the media store. A pure parse: no side effects, and the image
//! list is fixed at construction — attaching recognized text later never
//! re-parses the markup.

use std::path::{Path, PathBuf};

use crate::collection::NoteId;
use crate::markup;

/// Image formats the OCR engine accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "jfif", "pnm"];

/// One embedded image occurrence, scoped to a (note, field) pair. The same
/// filename may appear in several notes or fields; each occurrence gets its
/// own ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Filename stem, e.g. `coronary_arteries`.
    pub name: String,
    /// The reference exactly as written in the markup, needed for
    /// exact-match replacement later.
    pub src: String,
    pub note_id: NoteId,
    pub field_name: String,
    /// Absolute path in the media store.
    pub path: PathBuf,
    /// Recognized text; unset until OCR completes.
    pub text: Option<String>,
}

/// One field's raw markup plus the images parsed out of it, in document
/// order.
#[derive(Debug, Clone)]
pub struct FieldContent {
    pub note_id: NoteId,
    pub field_name: String,
    pub markup: String,
    pub images: Vec<ImageRef>,
}

impl FieldContent {
    /// Parse a field's markup against the media directory. Invalid
    /// references are excluded and logged, never fatal: the rest of the
    /// field may still carry usable images.
    pub fn parse(note_id: NoteId, field_name: &str, markup: &str, media_dir: &Path) -> Self {
        let mut images = Vec::new();
        for range in markup::img_tag_ranges(markup) {
            let tag = &markup[range];
            let Some(src) = markup::src_attr(tag) else {
                tracing::debug!(note_id, field_name, "img tag without src, ignoring");
                continue;
            };
            let path = media_dir.join(src);
            match path.try_exists() {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(
                        note_id,
                        field_name,
                        src,
                        "image does not exist in media dir, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(note_id, field_name, src, error = %e, "image path is invalid, skipping");
                    continue;
                }
            }
            if !has_supported_extension(&path) {
                tracing::debug!(note_id, field_name, src, "unsupported image format, ignoring");
                continue;
            }
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            images.push(ImageRef {
                name,
                src: src.to_string(),
                note_id,
                field_name: field_name.to_string(),
                path,
                text: None,
            });
        }
        Self {
            note_id,
            field_name: field_name.to_string(),
            markup: markup.to_string(),
            images,
        }
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
