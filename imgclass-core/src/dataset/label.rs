//! Label derivation for image files.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reserved label substituted for empty derivations under
/// [`EmptyLabelPolicy::Sentinel`].
pub const UNKNOWN_LABEL: &str = "unknown";

/// Where a record's label comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Name of the file's immediate parent directory.
    #[default]
    FolderName,
    /// Leading run of letters in the file stem (`rose12.jpg` -> `rose`).
    FilePrefix,
}

/// What to do when derivation produces an empty label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyLabelPolicy {
    /// Fail the load with a schema error.
    #[default]
    Reject,
    /// Replace the label with [`UNKNOWN_LABEL`].
    Sentinel,
    /// Drop the file and log a warning.
    Skip,
}

/// Outcome of applying an [`EmptyLabelPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelDecision {
    Keep(String),
    Skip,
    Reject,
}

impl EmptyLabelPolicy {
    pub fn apply(self, raw: String) -> LabelDecision {
        if !raw.is_empty() {
            return LabelDecision::Keep(raw);
        }
        match self {
            Self::Reject => LabelDecision::Reject,
            Self::Sentinel => LabelDecision::Keep(UNKNOWN_LABEL.to_string()),
            Self::Skip => LabelDecision::Skip,
        }
    }
}

/// Raw label for `path` under `source`. May be empty; callers apply a policy.
pub fn derive_label(path: &Path, source: LabelSource) -> String {
    match source {
        LabelSource::FolderName => path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        LabelSource::FilePrefix => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            letter_prefix(&stem).to_string()
        }
    }
}

/// Longest prefix of `name` made only of alphabetic characters.
pub fn letter_prefix(name: &str) -> &str {
    match name.char_indices().find(|(_, c)| !c.is_alphabetic()) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}
