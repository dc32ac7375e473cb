//! Multiclass evaluation metrics.

use crate::error::{ClassifyError, Result};
use crate::trainer::{LabelKeyMap, PredictionResult};
use serde::{Deserialize, Serialize};

/// Probabilities are clamped to this floor before taking logs.
const PROB_EPSILON: f64 = 1e-15;

/// Quality of a set of multiclass predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulticlassMetrics {
    /// Fraction of predictions that are correct.
    pub micro_accuracy: f64,
    /// Mean per-class recall over classes present in the evaluated set.
    pub macro_accuracy: f64,
    pub log_loss: f64,
    /// Relative improvement of `log_loss` over predicting the class prior.
    pub log_loss_reduction: f64,
    /// Mean log loss per key; `None` for classes absent from the evaluated set.
    pub per_class_log_loss: Vec<Option<f64>>,
    /// `confusion_matrix[truth][predicted]`.
    pub confusion_matrix: Vec<Vec<usize>>,
    /// Number of predictions that contributed.
    pub evaluated: usize,
}

/// Score `predictions` against their true labels.
///
/// Predictions whose true label has no key in `labels` are left out.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(
    predictions: &[PredictionResult],
    labels: &LabelKeyMap,
) -> Result<MulticlassMetrics> {
    let k = labels.len();
    let mut confusion = vec![vec![0usize; k]; k];
    let mut class_loss = vec![0.0f64; k];
    let mut support = vec![0usize; k];
    let mut total_loss = 0.0f64;
    let mut correct = 0usize;
    let mut n = 0usize;

    for pred in predictions {
        let Some(truth) = labels.key_of(&pred.true_label) else {
            tracing::warn!(
                path = %pred.image_path.display(),
                label = %pred.true_label,
                "Label unknown to the model, excluded from metrics"
            );
            continue;
        };
        if pred.predicted_key >= k || pred.scores.len() != k {
            return Err(ClassifyError::evaluation(format!(
                "prediction for {} does not match the {k}-class key map",
                pred.image_path.display()
            )));
        }

        let p = f64::from(pred.scores[truth]).max(PROB_EPSILON);
        let loss = -p.ln();
        total_loss += loss;
        class_loss[truth] += loss;
        support[truth] += 1;
        confusion[truth][pred.predicted_key] += 1;
        if truth == pred.predicted_key {
            correct += 1;
        }
        n += 1;
    }

    if n == 0 {
        return Err(ClassifyError::evaluation("no predictions to evaluate"));
    }

    let nf = n as f64;
    let present: Vec<usize> = (0..k).filter(|&c| support[c] > 0).collect();
    let macro_accuracy = present
        .iter()
        .map(|&c| confusion[c][c] as f64 / support[c] as f64)
        .sum::<f64>()
        / present.len() as f64;

    let prior_log_loss: f64 = present
        .iter()
        .map(|&c| {
            let prior = support[c] as f64 / nf;
            -prior * prior.ln()
        })
        .sum();
    let log_loss = total_loss / nf;
    let log_loss_reduction = if prior_log_loss > 0.0 {
        (prior_log_loss - log_loss) / prior_log_loss
    } else {
        0.0
    };

    Ok(MulticlassMetrics {
        micro_accuracy: correct as f64 / nf,
        macro_accuracy,
        log_loss,
        log_loss_reduction,
        per_class_log_loss: (0..k)
            .map(|c| (support[c] > 0).then(|| class_loss[c] / support[c] as f64))
            .collect(),
        confusion_matrix: confusion,
        evaluated: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn pred(
        truth: &str,
        predicted: &str,
        labels: &LabelKeyMap,
        scores: Vec<f32>,
    ) -> PredictionResult {
        PredictionResult {
            image_path: PathBuf::from(format!("{truth}.jpg")),
            true_label: truth.into(),
            predicted_label: predicted.into(),
            predicted_key: labels.key_of(predicted).unwrap(),
            scores,
        }
    }

    #[test]
    fn test_micro_and_macro_accuracy_differ_on_imbalance() {
        let labels = LabelKeyMap::from_labels(["daisy", "rose"]);
        let preds = vec![
            pred("daisy", "daisy", &labels, vec![0.9, 0.1]),
            pred("daisy", "daisy", &labels, vec![0.8, 0.2]),
            pred("daisy", "daisy", &labels, vec![0.7, 0.3]),
            pred("rose", "daisy", &labels, vec![0.6, 0.4]),
        ];
        let m = evaluate(&preds, &labels).unwrap();
        assert_eq!(m.micro_accuracy, 0.75);
        assert_eq!(m.macro_accuracy, 0.5);
        assert_eq!(m.confusion_matrix, vec![vec![3, 0], vec![1, 0]]);
        assert_eq!(m.evaluated, 4);
    }

    #[test]
    fn test_log_loss_and_reduction() {
        let labels = LabelKeyMap::from_labels(["a", "b"]);
        let preds = vec![
            pred("a", "a", &labels, vec![0.5, 0.5]),
            pred("b", "a", &labels, vec![0.5, 0.5]),
        ];
        let m = evaluate(&preds, &labels).unwrap();
        let ln2 = std::f64::consts::LN_2;
        assert!((m.log_loss - ln2).abs() < 1e-9);
        // Uniform scores are exactly as good as the balanced prior.
        assert!(m.log_loss_reduction.abs() < 1e-9);
        assert_eq!(m.per_class_log_loss.len(), 2);
        assert!((m.per_class_log_loss[0].unwrap() - ln2).abs() < 1e-9);
    }

    #[test]
    fn test_absent_class_has_no_log_loss() {
        let labels = LabelKeyMap::from_labels(["a", "b", "c"]);
        let preds = vec![pred("a", "a", &labels, vec![1.0, 0.0, 0.0])];
        let m = evaluate(&preds, &labels).unwrap();
        assert_eq!(m.per_class_log_loss[1], None);
        assert_eq!(m.macro_accuracy, 1.0);
        // Single-class prior has zero entropy.
        assert_eq!(m.log_loss_reduction, 0.0);
    }

    #[test]
    fn test_zero_probability_is_clamped() {
        let labels = LabelKeyMap::from_labels(["a", "b"]);
        let preds = vec![pred("a", "b", &labels, vec![0.0, 1.0])];
        let m = evaluate(&preds, &labels).unwrap();
        assert!(m.log_loss.is_finite());
        assert!((m.log_loss - (-(1e-15f64).ln())).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_labels_are_excluded() {
        let labels = LabelKeyMap::from_labels(["a", "b"]);
        let mut unknown = pred("a", "a", &labels, vec![0.9, 0.1]);
        unknown.true_label = "lily".into();
        let preds = vec![unknown, pred("b", "b", &labels, vec![0.1, 0.9])];
        let m = evaluate(&preds, &labels).unwrap();
        assert_eq!(m.evaluated, 1);
        assert_eq!(m.micro_accuracy, 1.0);
    }

    #[test]
    fn test_empty_predictions_fail() {
        let labels = LabelKeyMap::from_labels(["a"]);
        let err = evaluate(&[], &labels).unwrap_err();
        assert!(matches!(err, ClassifyError::Evaluation(_)));
    }

    #[test]
    fn test_mismatched_scores_fail() {
        let labels = LabelKeyMap::from_labels(["a", "b"]);
        let preds = vec![pred("a", "a", &labels, vec![1.0])];
        assert!(evaluate(&preds, &labels).is_err());
    }
}
