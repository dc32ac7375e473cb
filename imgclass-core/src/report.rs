//! Console report formatting.
//!
//! Every function here is pure: it returns styled text segments and leaves
//! colouring and writing to the presentation layer in the binary.

use crate::dataset::display_name;
use crate::metrics::MulticlassMetrics;
use crate::trainer::{EpochMetrics, LabelKeyMap, PredictionResult};
use std::path::Path;

/// Semantic style of a text segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Plain,
    /// File names and labels.
    Label,
    /// Probabilities and scores.
    Score,
    Heading,
    /// Metric values.
    Metric,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub style: Style,
}

impl Segment {
    pub fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, Style::Plain)
    }
}

/// One output line.
pub type Line = Vec<Segment>;

/// Concatenate a line's segments without styling.
pub fn line_text(line: &[Segment]) -> String {
    line.iter().map(|s| s.text.as_str()).collect()
}

/// Render lines as unstyled text, one per row.
pub fn plain_text(lines: &[Line]) -> String {
    lines
        .iter()
        .map(|l| line_text(l))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `Image File: <name> original labeled as <truth> predicted as <label> with score <p>`
pub fn prediction_line(pred: &PredictionResult) -> Line {
    vec![
        Segment::plain("Image File: "),
        Segment::new(display_name(&pred.image_path), Style::Label),
        Segment::plain(" original labeled as "),
        Segment::new(pred.true_label.clone(), Style::Label),
        Segment::plain(" predicted as "),
        Segment::new(pred.predicted_label.clone(), Style::Label),
        Segment::plain(" with score "),
        Segment::new(pred.max_score().to_string(), Style::Score),
    ]
}

/// Header line plus one row per prediction.
pub fn predictions_block(predictions: &[PredictionResult]) -> Vec<Line> {
    let mut lines = vec![vec![Segment::new(
        "*** Showing all the predictions ***",
        Style::Heading,
    )]];
    lines.extend(predictions.iter().map(prediction_line));
    lines
}

/// `ImageFile : [<name>], Scores : [<s1>,<s2>,...], Predicted Label : <label>`
pub fn single_prediction_line(pred: &PredictionResult) -> Line {
    let scores = pred
        .scores
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    vec![
        Segment::plain("ImageFile : ["),
        Segment::new(display_name(&pred.image_path), Style::Label),
        Segment::plain("], Scores : ["),
        Segment::new(scores, Style::Score),
        Segment::plain("], Predicted Label : "),
        Segment::new(pred.predicted_label.clone(), Style::Label),
    ]
}

/// Framed block with micro/macro accuracy and log-loss figures.
pub fn metrics_block(name: &str, metrics: &MulticlassMetrics, labels: &LabelKeyMap) -> Vec<Line> {
    let rule = "*".repeat(60);
    let metric = |label: &str, value: f64, hint: &str| -> Line {
        vec![
            Segment::plain(format!("    {label} = ")),
            Segment::new(format!("{value:.4}"), Style::Metric),
            Segment::plain(hint.to_string()),
        ]
    };

    let mut lines = vec![
        vec![Segment::new(rule.clone(), Style::Heading)],
        vec![Segment::new(
            format!("*    Metrics for {name} multi-class classification model"),
            Style::Heading,
        )],
        vec![Segment::new(format!("*{}", "-".repeat(59)), Style::Heading)],
        metric(
            "AccuracyMacro",
            metrics.macro_accuracy,
            ", a value between 0 and 1, the closer to 1, the better",
        ),
        metric(
            "AccuracyMicro",
            metrics.micro_accuracy,
            ", a value between 0 and 1, the closer to 1, the better",
        ),
        metric("LogLoss", metrics.log_loss, ", the closer to 0, the better"),
        metric(
            "LogLossReduction",
            metrics.log_loss_reduction,
            ", the closer to 1, the better",
        ),
    ];

    for (key, loss) in metrics.per_class_log_loss.iter().enumerate() {
        let class = labels.label_of(key).unwrap_or("?");
        let value = match loss {
            Some(v) => Segment::new(format!("{v:.4}"), Style::Metric),
            None => Segment::plain("n/a"),
        };
        lines.push(vec![
            Segment::plain("    LogLoss for class "),
            Segment::new(class.to_string(), Style::Label),
            Segment::plain(" = "),
            value,
            Segment::plain(", the closer to 0, the better"),
        ]);
    }
    lines.push(vec![Segment::new(rule, Style::Heading)]);
    lines
}

/// `<what> took: <secs> seconds`
pub fn elapsed_line(what: &str, secs: u64) -> Line {
    vec![
        Segment::plain(format!("{what} took: ")),
        Segment::new(secs.to_string(), Style::Metric),
        Segment::plain(" seconds"),
    ]
}

pub fn epoch_line(m: &EpochMetrics) -> Line {
    let mut line = vec![
        Segment::plain(format!("Epoch {:>3}: loss = ", m.epoch)),
        Segment::new(format!("{:.4}", m.train_loss), Style::Metric),
        Segment::plain(", train accuracy = "),
        Segment::new(format!("{:.4}", m.train_accuracy), Style::Metric),
    ];
    if let Some(v) = m.validation_accuracy {
        line.push(Segment::plain(", validation accuracy = "));
        line.push(Segment::new(format!("{v:.4}"), Style::Metric));
    }
    line
}

pub fn model_saved_line(path: &Path) -> Line {
    vec![
        Segment::plain("Model saved to: "),
        Segment::new(path.display().to_string(), Style::Label),
    ]
}
