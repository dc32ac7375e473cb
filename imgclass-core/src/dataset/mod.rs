//! Labelled image datasets: materialization from disk and train/test splits.

pub mod label;
pub mod loader;
pub mod split;

pub use label::{EmptyLabelPolicy, LabelSource, UNKNOWN_LABEL};
pub use loader::ImageLoader;
pub use split::{Split, shuffle_and_split, test_size};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One labelled image on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub label: String,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
        }
    }

    /// File name for display, falling back to the full path.
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
