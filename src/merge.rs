//! Result Merger.
//!
//! Splits a batch's combined engine output back into per-image text using
//! the engine's page-separator convention, and normalizes whitespace. Keyed
//! by work-item identity, so it is insensitive to completion order.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::batch::BatchPlan;
use crate::locate::ImageRef;

/// Form-feed character tesseract emits between pages when fed a manifest of
/// image paths.
pub const PAGE_SEPARATOR: char = '\u{000C}';

static COLON_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(":+").expect("colon run regex"));

/// Normalize raw engine output: strip each line, drop blank lines, rejoin
/// with newlines, and collapse runs of colons to a single colon (a frequent
/// misread near image borders). Idempotent.
pub fn clean_ocr_text(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    COLON_RUN_RE.replace_all(&joined, ":").into_owned()
}

/// Zip each manifest's separator-delimited output segments against its
/// images positionally. If the engine produced fewer segments than images
/// (an empty trailing recognition collapses its separator), the unmatched
/// trailing images get empty text instead of failing the job. Extra
/// segments are ignored.
pub fn merge_batched(plan: &BatchPlan, results: &HashMap<String, String>) -> Vec<ImageRef> {
    let mut images = Vec::new();
    for manifest in plan.manifests() {
        let manifest_id = manifest.display().to_string();
        let Some(group) = plan.images_for(&manifest_id) else {
            continue;
        };
        let raw = match results.get(&manifest_id) {
            Some(raw) => raw.as_str(),
            None => {
                tracing::warn!(manifest = %manifest_id, "no engine output for manifest");
                ""
            }
        };
        let segments: Vec<&str> = raw.split(PAGE_SEPARATOR).collect();
        if segments.len() < group.len() {
            tracing::debug!(
                manifest = %manifest_id,
                segments = segments.len(),
                images = group.len(),
                "fewer output segments than images; padding with empty text"
            );
        }
        for (idx, image) in group.iter().enumerate() {
            let text = segments.get(idx).copied().unwrap_or("");
            let mut image = image.clone();
            image.text = Some(clean_ocr_text(text));
            images.push(image);
        }
    }
    images
}

/// Unbatched mode: attach each image's own engine output, keyed by its
/// media path.
pub fn merge_unbatched(images: Vec<ImageRef>, results: &HashMap<String, String>) -> Vec<ImageRef> {
    images
        .into_iter()
        .map(|mut image| {
            let key = image.path.display().to_string();
            let raw = results.get(&key).map(String::as_str).unwrap_or_default();
            image.text = Some(clean_ocr_text(raw));
            image
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn image(n: usize) -> ImageRef {
        ImageRef {
            name: format!("img_{n}"),
            src: format!("img_{n}.png"),
            note_id: 1,
            field_name: "Front".to_string(),
            path: PathBuf::from(format!("/media/img_{n}.png")),
            text: None,
        }
    }

    #[test]
    fn clean_collapses_colon_runs_and_blank_lines() {
        assert_eq!(clean_ocr_text("a::b\n\n  \nc:::d"), "a:b\nc:d");
    }

    #[test]
    fn clean_is_idempotent() {
        let once = clean_ocr_text("x:: y\n\n\n z ::: w\n");
        let twice = clean_ocr_text(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn clean_strips_line_whitespace() {
        assert_eq!(clean_ocr_text("  left \n right  "), "left\nright");
    }

    #[test]
    fn clean_matches_engine_output_shape() {
        let input = "this is some text: with a result\n\n\nThis is some double colon :: with result\
                     \n\nwithout spaces::new word\none space:: new word\n\n\n\none space before ::new word\n\
                     triple ::: new word\n\n\n\n\nquadruple ::::newword";
        let expected = "this is some text: with a result\nThis is some double colon : with result\n\
                        without spaces:new word\none space: new word\none space before :new word\n\
                        triple : new word\nquadruple :newword";
        assert_eq!(clean_ocr_text(input), expected);
    }

    #[test]
    fn clean_empty_input_is_empty() {
        assert_eq!(clean_ocr_text(""), "");
        assert_eq!(clean_ocr_text("\n \n\t\n"), "");
    }

    #[test]
    fn batched_merge_assigns_segments_in_manifest_order() {
        let plan = BatchPlan::build((0..3).map(image).collect(), 5).unwrap();
        let manifest_id = plan.manifests()[0].display().to_string();
        let raw = format!("alpha{sep}beta{sep}gamma", sep = PAGE_SEPARATOR);
        let results = HashMap::from([(manifest_id, raw)]);

        let merged = merge_batched(&plan, &results);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].text.as_deref(), Some("alpha"));
        assert_eq!(merged[1].text.as_deref(), Some("beta"));
        assert_eq!(merged[2].text.as_deref(), Some("gamma"));
    }

    #[test]
    fn batched_merge_pads_missing_trailing_segments() {
        let plan = BatchPlan::build((0..3).map(image).collect(), 5).unwrap();
        let manifest_id = plan.manifests()[0].display().to_string();
        // Two segments for three images: last image recognized as nothing.
        let raw = format!("alpha{}beta", PAGE_SEPARATOR);
        let results = HashMap::from([(manifest_id, raw)]);

        let merged = merge_batched(&plan, &results);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[2].text.as_deref(), Some(""));
    }

    #[test]
    fn batched_merge_ignores_extra_segments() {
        let plan = BatchPlan::build(vec![image(0)], 5).unwrap();
        let manifest_id = plan.manifests()[0].display().to_string();
        let raw = format!("only{sep}spurious{sep}", sep = PAGE_SEPARATOR);
        let results = HashMap::from([(manifest_id, raw)]);

        let merged = merge_batched(&plan, &results);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text.as_deref(), Some("only"));
    }

    #[test]
    fn batched_merge_spans_multiple_manifests() {
        let plan = BatchPlan::build((0..4).map(image).collect(), 2).unwrap();
        let mut results = HashMap::new();
        for (i, manifest) in plan.manifests().iter().enumerate() {
            results.insert(
                manifest.display().to_string(),
                format!("m{i}a{}m{i}b", PAGE_SEPARATOR),
            );
        }
        let merged = merge_batched(&plan, &results);
        let texts: Vec<_> = merged.iter().map(|i| i.text.as_deref().unwrap()).collect();
        assert_eq!(texts, vec!["m0a", "m0b", "m1a", "m1b"]);
    }

    #[test]
    fn batched_merge_cleans_each_segment() {
        let plan = BatchPlan::build(vec![image(0)], 5).unwrap();
        let manifest_id = plan.manifests()[0].display().to_string();
        let results = HashMap::from([(manifest_id, "  spaced ::text  \n\n".to_string())]);
        let merged = merge_batched(&plan, &results);
        assert_eq!(merged[0].text.as_deref(), Some("spaced :text"));
    }

    #[test]
    fn unbatched_merge_attaches_by_path() {
        let results = HashMap::from([
            ("/media/img_0.png".to_string(), "zero".to_string()),
            ("/media/img_1.png".to_string(), "one\n\n".to_string()),
        ]);
        let merged = merge_unbatched(vec![image(0), image(1)], &results);
        assert_eq!(merged[0].text.as_deref(), Some("zero"));
        assert_eq!(merged[1].text.as_deref(), Some("one"));
    }

    #[test]
    fn unbatched_merge_shares_result_across_duplicate_paths() {
        let results = HashMap::from([("/media/img_0.png".to_string(), "dup".to_string())]);
        let merged = merge_unbatched(vec![image(0), image(0)], &results);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text.as_deref(), Some("dup"));
        assert_eq!(merged[1].text.as_deref(), Some("dup"));
    }
}
