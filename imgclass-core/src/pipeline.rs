//! End-to-end training run.
//!
//! acquire -> materialize -> split -> fit -> transform + evaluate ->
//! single prediction -> save. Every stage error aborts the run.

use crate::acquire::{DatasetFetcher, DatasetSource, ensure_dataset};
use crate::config::{ClassifierConfig, SplitMode};
use crate::dataset::{ImageLoader, ImageRecord, LabelSource, Split, shuffle_and_split};
use crate::error::{ClassifyError, Result};
use crate::metrics::{MulticlassMetrics, evaluate};
use crate::trainer::{
    EpochMetrics, ImageClassificationTrainer, LabelKeyMap, PredictionResult, TrainedModel,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Everything a run produced, for display.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub train_count: usize,
    pub test_count: usize,
    pub epochs: Vec<EpochMetrics>,
    /// Whole seconds, truncated.
    pub training_secs: u64,
    pub evaluation_secs: u64,
    pub labels: LabelKeyMap,
    pub metrics: MulticlassMetrics,
    pub predictions: Vec<PredictionResult>,
    /// Prediction for the first image of the prediction-sample folder.
    pub sample_prediction: PredictionResult,
    pub model_path: PathBuf,
}

/// Resolved input and output locations for one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub images_dir: PathBuf,
    pub predictions_dir: PathBuf,
    pub model_path: PathBuf,
}

impl RunPaths {
    pub fn from_config(config: &ClassifierConfig, assets_root: &Path) -> Self {
        Self {
            images_dir: config.assets.images_path(assets_root),
            predictions_dir: config.assets.predictions_path(assets_root),
            model_path: config.assets.model_path(assets_root),
        }
    }
}

/// Produce the train/test split for the image set at `dataset_folder`.
///
/// In shuffle mode the distinct files are split first and the repeat factor
/// is applied inside each side, so no file is in both train and test.
pub fn load_split(config: &ClassifierConfig, dataset_folder: &Path) -> Result<Split> {
    let loader = ImageLoader::from_config(&config.dataset);
    match config.split.mode {
        SplitMode::Shuffle => {
            let mut records = loader.clone().with_repeat(1).load(dataset_folder)?;
            // Directory enumeration order varies; sort so the seed alone decides.
            records.sort_by(|a, b| a.path.cmp(&b.path));
            tracing::info!(records = records.len(), "Loaded full image set");
            let split = shuffle_and_split(
                records,
                config.split.test_fraction,
                config.component_seed("split"),
            )?;
            let repeat = config.dataset.repeat.max(1);
            Ok(Split {
                train: repeated(split.train, repeat),
                test: repeated(split.test, repeat),
            })
        }
        SplitMode::Presplit => {
            let train = loader.load(&dataset_folder.join(&config.split.train_folder))?;
            let test = loader.load(&dataset_folder.join(&config.split.test_folder))?;
            tracing::info!(
                train = train.len(),
                test = test.len(),
                "Loaded pre-split image sets"
            );
            Ok(Split { train, test })
        }
    }
}

fn repeated(records: Vec<ImageRecord>, repeat: usize) -> Vec<ImageRecord> {
    if repeat <= 1 {
        return records;
    }
    records
        .into_iter()
        .flat_map(|r| std::iter::repeat_n(r, repeat))
        .collect()
}

/// First image (by path) of the prediction-sample folder, labelled by folder name.
///
/// A missing folder or one without images is a filesystem error.
pub fn first_sample(folder: &Path, config: &ClassifierConfig) -> Result<ImageRecord> {
    let records = ImageLoader::from_config(&config.dataset)
        .with_label_source(LabelSource::FolderName)
        .with_repeat(1)
        .load(folder)?;
    records
        .into_iter()
        .min_by(|a, b| a.path.cmp(&b.path))
        .ok_or_else(|| ClassifyError::filesystem(folder, "no images for the single prediction"))
}

/// Fit, evaluate, try one prediction and save, given an already built split.
pub fn train_and_evaluate<T>(
    config: &ClassifierConfig,
    trainer: &T,
    split: &Split,
    paths: &RunPaths,
    on_epoch: &mut dyn FnMut(&EpochMetrics),
) -> Result<RunSummary>
where
    T: ImageClassificationTrainer,
{
    if split.train.is_empty() {
        return Err(ClassifyError::training("no training records after split"));
    }
    if split.test.is_empty() {
        return Err(ClassifyError::evaluation("no test records after split"));
    }

    tracing::info!(
        train = split.train.len(),
        test = split.test.len(),
        "Training the image classification model"
    );
    let mut epochs = Vec::new();
    let started = Instant::now();
    let model = trainer.fit(&split.train, Some(split.test.as_slice()), &mut |m| {
        on_epoch(m);
        epochs.push(m.clone());
    })?;
    let training_secs = started.elapsed().as_secs();

    tracing::info!("Making bulk predictions and evaluating model quality");
    let started = Instant::now();
    let predictions = model.transform(&split.test)?;
    let metrics = evaluate(&predictions, model.labels())?;
    let evaluation_secs = started.elapsed().as_secs();

    let sample = first_sample(&paths.predictions_dir, config)?;
    let sample_prediction = model.predict(&sample)?;

    model.save(&paths.model_path)?;

    Ok(RunSummary {
        train_count: split.train.len(),
        test_count: split.test.len(),
        epochs,
        training_secs,
        evaluation_secs,
        labels: model.labels().clone(),
        metrics,
        predictions,
        sample_prediction,
        model_path: paths.model_path.clone(),
    })
}

/// Full run: make sure the image set is on disk, then split, train, evaluate.
pub async fn run<T>(
    config: &ClassifierConfig,
    assets_root: &Path,
    fetcher: &dyn DatasetFetcher,
    trainer: &T,
    on_epoch: &mut dyn FnMut(&EpochMetrics),
) -> Result<RunSummary>
where
    T: ImageClassificationTrainer,
{
    config.validate()?;
    let paths = RunPaths::from_config(config, assets_root);
    let folder_name = config.dataset.folder_name();
    let source = DatasetSource {
        url: &config.dataset.url,
        archive_name: &config.dataset.archive_name,
        folder_name: &folder_name,
    };
    let dataset_folder = ensure_dataset(fetcher, &source, &paths.images_dir).await?;

    tracing::info!(folder = %dataset_folder.display(), "Using image set");

    let split = load_split(config, &dataset_folder)?;
    train_and_evaluate(config, trainer, &split, &paths, on_epoch)
}
