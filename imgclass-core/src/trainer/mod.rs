//! Trainer contract and the bundled softmax baseline.
//!
//! The pipeline only talks to [`ImageClassificationTrainer`] and
//! [`TrainedModel`]; any classifier that can fit on labelled image records and
//! score single images can be plugged in.

pub mod features;
pub mod softmax;

pub use features::FeatureExtractor;
pub use softmax::{SoftmaxModel, SoftmaxTrainer};

use crate::dataset::ImageRecord;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Dense integer keys for labels, assigned in sorted label order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelKeyMap {
    labels: Vec<String>,
}

impl LabelKeyMap {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        Self {
            labels: unique.into_iter().collect(),
        }
    }

    pub fn from_records(records: &[ImageRecord]) -> Self {
        Self::from_labels(records.iter().map(|r| r.label.as_str()))
    }

    pub fn key_of(&self, label: &str) -> Option<usize> {
        self.labels
            .binary_search_by(|candidate| candidate.as_str().cmp(label))
            .ok()
    }

    pub fn label_of(&self, key: usize) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Scores for a single image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub image_path: PathBuf,
    pub true_label: String,
    pub predicted_label: String,
    pub predicted_key: usize,
    /// One probability per key of the model's [`LabelKeyMap`].
    pub scores: Vec<f32>,
}

impl PredictionResult {
    pub fn max_score(&self) -> f32 {
        self.scores.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn is_correct(&self) -> bool {
        self.true_label == self.predicted_label
    }
}

/// Progress reported after every training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub validation_accuracy: Option<f64>,
}

/// Fits a classifier on labelled image records.
pub trait ImageClassificationTrainer {
    type Model: TrainedModel;

    /// Train on `train`. When given, `validation` is scored after each epoch
    /// and the result passed to `on_epoch`.
    fn fit(
        &self,
        train: &[ImageRecord],
        validation: Option<&[ImageRecord]>,
        on_epoch: &mut dyn FnMut(&EpochMetrics),
    ) -> Result<Self::Model>;
}

/// A fitted classifier.
pub trait TrainedModel {
    fn labels(&self) -> &LabelKeyMap;

    fn predict(&self, record: &ImageRecord) -> Result<PredictionResult>;

    /// Score every record in order.
    fn transform(&self, records: &[ImageRecord]) -> Result<Vec<PredictionResult>> {
        records.iter().map(|r| self.predict(r)).collect()
    }

    /// Serialize the model to `path`.
    fn save(&self, path: &Path) -> Result<()>;
}
