//! # imgclass-core
//!
//! Image-classification training on a directory of labelled photos:
//!
//! 1. **Acquisition**: download and unpack an image-set archive ([`acquire`])
//! 2. **Materialization**: walk the tree and label every image ([`dataset`])
//! 3. **Splitting**: seeded shuffle and train/test partition ([`dataset::split`])
//! 4. **Training**: fit a classifier behind the [`trainer`] traits
//! 5. **Evaluation**: micro/macro accuracy and log loss ([`metrics`])
//! 6. **Reporting**: styled, side-effect-free console lines ([`report`])
//!
//! [`pipeline::run`] chains the stages.

pub mod acquire;
pub mod config;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod trainer;

// Re-exports
pub use acquire::{DatasetFetcher, HttpFetcher};
pub use config::{ClassifierConfig, SplitMode, load_config};
pub use dataset::{ImageLoader, ImageRecord, Split};
pub use error::ClassifyError;
pub use metrics::MulticlassMetrics;
pub use pipeline::RunSummary;
pub use trainer::{
    ImageClassificationTrainer, PredictionResult, SoftmaxModel, SoftmaxTrainer, TrainedModel,
};
