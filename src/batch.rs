//! Batch Planner.
//!
//! Groups located images into bounded batches and renders each batch into a
//! manifest file (one absolute image path per line) inside a temporary
//! directory. The plan owns that directory: dropping the plan releases it,
//! so cleanup happens on every exit path.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::dispatch::WorkItem;
use crate::error::OcrError;
use crate::locate::ImageRef;

#[derive(Debug)]
pub struct BatchPlan {
    manifests: Vec<PathBuf>,
    mapping: HashMap<String, Vec<ImageRef>>,
    // Held for RAII cleanup of the manifest files.
    _dir: TempDir,
}

impl BatchPlan {
    /// Partition `images` into contiguous groups of at most `batch_size`,
    /// preserving order, and write one manifest per group.
    pub fn build(images: Vec<ImageRef>, batch_size: usize) -> Result<Self, OcrError> {
        debug_assert!(batch_size > 0, "batch_size validated at job construction");
        let dir = TempDir::new()?;
        let mut manifests = Vec::new();
        let mut mapping = HashMap::new();

        for (batch_id, group) in images.chunks(batch_size.max(1)).enumerate() {
            let manifest = dir.path().join(format!("batch_imgs_{batch_id}.txt"));
            let lines = group
                .iter()
                .map(|img| img.path.display().to_string())
                .collect::<Vec<_>>()
                .join("\n");
            fs::write(&manifest, lines)?;
            mapping.insert(manifest.display().to_string(), group.to_vec());
            manifests.push(manifest);
        }

        tracing::debug!(
            manifests = manifests.len(),
            batch_size,
            "batch plan written"
        );
        Ok(Self {
            manifests,
            mapping,
            _dir: dir,
        })
    }

    /// Manifest paths in plan order.
    pub fn manifests(&self) -> &[PathBuf] {
        &self.manifests
    }

    /// Images belonging to a manifest, in the order they were written.
    pub fn images_for(&self, manifest_id: &str) -> Option<&[ImageRef]> {
        self.mapping.get(manifest_id).map(|v| v.as_slice())
    }

    /// One dispatcher work item per manifest, keyed by the manifest path.
    pub fn work_items(&self) -> Vec<WorkItem> {
        self.manifests
            .iter()
            .map(|m| WorkItem {
                id: m.display().to_string(),
                path: m.clone(),
            })
            .collect()
    }
}
