//! Directory-walk image loader.
//!
//! Walks a folder recursively, keeps files whose extension is in the
//! allow-list, and labels each one from its parent folder or its file name.
//! Enumeration order follows the filesystem and is not stable; callers that
//! need an order must sort or shuffle.

use crate::config::DatasetConfig;
use crate::dataset::ImageRecord;
use crate::dataset::label::{EmptyLabelPolicy, LabelDecision, LabelSource, derive_label};
use crate::error::{ClassifyError, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Materializes [`ImageRecord`]s from a directory tree.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    extensions: Vec<String>,
    label_source: LabelSource,
    empty_label: EmptyLabelPolicy,
    repeat: usize,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::from_config(&DatasetConfig::default())
    }
}

impl ImageLoader {
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            extensions: normalize_extensions(&config.extensions),
            label_source: config.label_source,
            empty_label: config.empty_label,
            repeat: config.repeat.max(1),
        }
    }

    pub fn with_label_source(mut self, source: LabelSource) -> Self {
        self.label_source = source;
        self
    }

    pub fn with_empty_label(mut self, policy: EmptyLabelPolicy) -> Self {
        self.empty_label = policy;
        self
    }

    pub fn with_extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        self.extensions = normalize_extensions(extensions);
        self
    }

    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat.max(1);
        self
    }

    /// Whether `path` carries an allowed extension (exact, case-sensitive).
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }

    /// Scan `folder` and return one record per qualifying file (times `repeat`).
    pub fn load(&self, folder: &Path) -> Result<Vec<ImageRecord>> {
        if !folder.is_dir() {
            return Err(ClassifyError::filesystem(folder, "directory not found"));
        }

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for entry in WalkDir::new(folder).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(folder).to_path_buf();
                ClassifyError::filesystem(path, e.to_string())
            })?;
            if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                continue;
            }

            let raw = derive_label(entry.path(), self.label_source);
            let label = match self.empty_label.apply(raw) {
                LabelDecision::Keep(label) => label,
                LabelDecision::Skip => {
                    tracing::warn!(path = %entry.path().display(), "No label derivable, skipping");
                    skipped += 1;
                    continue;
                }
                LabelDecision::Reject => {
                    return Err(ClassifyError::schema(format!(
                        "no label derivable from {}",
                        entry.path().display()
                    )));
                }
            };

            tracing::trace!(path = %entry.path().display(), label = %label, "Image record");
            for _ in 0..self.repeat {
                records.push(ImageRecord::new(entry.path(), label.clone()));
            }
        }

        tracing::debug!(
            folder = %folder.display(),
            records = records.len(),
            skipped,
            "Loaded image records"
        );
        Ok(records)
    }
}

fn normalize_extensions<S: AsRef<str>>(extensions: &[S]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.as_ref().trim_start_matches('.').to_string())
        .filter(|e| !e.is_empty())
        .collect()
}
