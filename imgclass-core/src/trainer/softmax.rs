//! Multinomial logistic regression over pixel features.
//!
//! A small, deterministic baseline: zero-initialised weights, mini-batch
//! gradient descent on cross-entropy, batch order reshuffled every epoch from
//! a seeded RNG.

use crate::config::TrainerConfig;
use crate::dataset::ImageRecord;
use crate::error::{ClassifyError, Result};
use crate::trainer::{
    EpochMetrics, FeatureExtractor, ImageClassificationTrainer, LabelKeyMap, PredictionResult,
    TrainedModel,
};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

const MODEL_ENTRY: &str = "model.json";

/// Trainer for [`SoftmaxModel`].
#[derive(Debug, Clone)]
pub struct SoftmaxTrainer {
    config: TrainerConfig,
    seed: u64,
}

impl SoftmaxTrainer {
    pub fn new(config: TrainerConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    fn extractor(&self) -> FeatureExtractor {
        FeatureExtractor::new(self.config.image_width, self.config.image_height)
    }
}

/// Feature vectors paired with their label keys.
struct Encoded {
    features: Vec<Vec<f32>>,
    keys: Vec<usize>,
}

fn encode(
    records: &[ImageRecord],
    labels: &LabelKeyMap,
    extractor: &FeatureExtractor,
) -> Result<Encoded> {
    let mut features = Vec::with_capacity(records.len());
    let mut keys = Vec::with_capacity(records.len());
    for record in records {
        let Some(key) = labels.key_of(&record.label) else {
            tracing::warn!(
                path = %record.path.display(),
                label = %record.label,
                "Label not seen in training, ignoring record"
            );
            continue;
        };
        features.push(extractor.extract(&record.path)?);
        keys.push(key);
    }
    Ok(Encoded { features, keys })
}

impl ImageClassificationTrainer for SoftmaxTrainer {
    type Model = SoftmaxModel;

    fn fit(
        &self,
        train: &[ImageRecord],
        validation: Option<&[ImageRecord]>,
        on_epoch: &mut dyn FnMut(&EpochMetrics),
    ) -> Result<SoftmaxModel> {
        if train.is_empty() {
            return Err(ClassifyError::training("training set is empty"));
        }

        let labels = LabelKeyMap::from_records(train);
        let extractor = self.extractor();
        let train_set = encode(train, &labels, &extractor)?;
        let validation_set = validation
            .map(|v| encode(v, &labels, &extractor))
            .transpose()?;

        tracing::info!(
            records = train_set.features.len(),
            classes = labels.len(),
            features = extractor.dim(),
            epochs = self.config.epochs,
            "Training softmax classifier"
        );

        let mut model = SoftmaxModel::zeros(labels, extractor);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..train_set.features.len()).collect();
        let lr = self.config.learning_rate;
        let decay = self.config.weight_decay;
        let batch_size = self.config.batch_size.max(1);

        for epoch in 1..=self.config.epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;

            for batch in order.chunks(batch_size) {
                let mut grad_w = vec![vec![0.0f32; model.dim()]; model.classes()];
                let mut grad_b = vec![0.0f32; model.classes()];

                for &i in batch {
                    let x = &train_set.features[i];
                    let y = train_set.keys[i];
                    let probs = model.probabilities(x);
                    loss_sum -= f64::from(probs[y].max(1e-15)).ln();
                    if argmax(&probs) == y {
                        correct += 1;
                    }
                    for (k, p) in probs.iter().enumerate() {
                        let delta = if k == y { p - 1.0 } else { *p };
                        grad_b[k] += delta;
                        for (g, xi) in grad_w[k].iter_mut().zip(x) {
                            *g += delta * xi;
                        }
                    }
                }

                let scale = 1.0 / batch.len() as f32;
                for k in 0..model.classes() {
                    for (w, g) in model.weights[k].iter_mut().zip(&grad_w[k]) {
                        *w -= lr * (g * scale + decay * *w);
                    }
                    model.biases[k] -= lr * grad_b[k] * scale;
                }
            }

            let n = train_set.features.len() as f64;
            let metrics = EpochMetrics {
                epoch,
                train_loss: loss_sum / n,
                train_accuracy: correct as f64 / n,
                validation_accuracy: validation_set.as_ref().and_then(|v| model.accuracy(v)),
            };
            tracing::debug!(
                epoch,
                loss = metrics.train_loss,
                accuracy = metrics.train_accuracy,
                validation = ?metrics.validation_accuracy,
                "Epoch complete"
            );
            on_epoch(&metrics);
        }

        model.trained_at = Utc::now();
        Ok(model)
    }
}

/// Fitted softmax classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxModel {
    labels: LabelKeyMap,
    extractor: FeatureExtractor,
    /// One row of `extractor.dim()` weights per class key.
    weights: Vec<Vec<f32>>,
    biases: Vec<f32>,
    trained_at: DateTime<Utc>,
}

impl SoftmaxModel {
    fn zeros(labels: LabelKeyMap, extractor: FeatureExtractor) -> Self {
        let classes = labels.len();
        Self {
            weights: vec![vec![0.0; extractor.dim()]; classes],
            biases: vec![0.0; classes],
            labels,
            extractor,
            trained_at: Utc::now(),
        }
    }

    fn classes(&self) -> usize {
        self.labels.len()
    }

    fn dim(&self) -> usize {
        self.extractor.dim()
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Class probabilities for a feature vector.
    pub fn probabilities(&self, x: &[f32]) -> Vec<f32> {
        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.biases)
            .map(|(row, b)| row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f32>() + b)
            .collect();
        softmax(&logits)
    }

    fn accuracy(&self, set: &Encoded) -> Option<f64> {
        if set.features.is_empty() {
            return None;
        }
        let correct = set
            .features
            .iter()
            .zip(&set.keys)
            .filter(|(x, y)| argmax(&self.probabilities(x)) == **y)
            .count();
        Some(correct as f64 / set.features.len() as f64)
    }

    /// Read a model written by [`TrainedModel::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| ClassifyError::filesystem(path, format!("cannot open model: {e}")))?;
        let mut archive = zip::ZipArchive::new(file)?;
        let entry = archive.by_name(MODEL_ENTRY)?;
        let model: SoftmaxModel = serde_json::from_reader(entry)?;

        let consistent = model.weights.len() == model.classes()
            && model.biases.len() == model.classes()
            && model.weights.iter().all(|row| row.len() == model.dim());
        if !consistent || model.labels.is_empty() {
            return Err(ClassifyError::training(format!(
                "model file {} has inconsistent dimensions",
                path.display()
            )));
        }
        // Keys are positions in the sorted, deduplicated label list.
        let canonical = LabelKeyMap::from_labels(model.labels.labels().iter().map(String::as_str));
        if canonical != model.labels {
            return Err(ClassifyError::training(format!(
                "model file {} has labels out of key order",
                path.display()
            )));
        }
        Ok(model)
    }
}

impl TrainedModel for SoftmaxModel {
    fn labels(&self) -> &LabelKeyMap {
        &self.labels
    }

    fn predict(&self, record: &ImageRecord) -> Result<PredictionResult> {
        let x = self.extractor.extract(&record.path)?;
        let scores = self.probabilities(&x);
        let key = argmax(&scores);
        let predicted_label = self
            .labels
            .label_of(key)
            .ok_or_else(|| ClassifyError::training(format!("model has no label for key {key}")))?
            .to_string();
        Ok(PredictionResult {
            image_path: record.path.clone(),
            true_label: record.label.clone(),
            predicted_label,
            predicted_key: key,
            scores,
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(MODEL_ENTRY, SimpleFileOptions::default())?;
        zip.write_all(&serde_json::to_vec(self)?)?;
        zip.finish()?;
        tracing::info!(path = %path.display(), "Saved model");
        Ok(())
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first one wins ties.
fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v { (i, v) } else { (best, best_v) }
        })
        .0
}
