//! Configuration for imgclass.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace `imgclass.toml` -> explicit file -> environment (`IMGCLASS_*`).
//! CLI flags are applied by the binary on top of the extracted value.

use crate::dataset::label::{EmptyLabelPolicy, LabelSource};
use crate::error::{ClassifyError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Global seed; component seeds are derived from it.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            assets: AssetsConfig::default(),
            dataset: DatasetConfig::default(),
            split: SplitConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

fn default_seed() -> u64 {
    1
}

impl ClassifierConfig {
    /// Seed for a named component (`"split"`, `"trainer"`, ...).
    ///
    /// Stable for a given global seed, distinct per component name.
    pub fn component_seed(&self, component: &str) -> u64 {
        component
            .bytes()
            .fold(self.seed, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        let fraction = self.split.test_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ClassifyError::config(format!(
                "split.test_fraction must be within [0, 1], got {fraction}"
            )));
        }
        if self.dataset.repeat == 0 {
            return Err(ClassifyError::config("dataset.repeat must be at least 1"));
        }
        if self.dataset.extensions.is_empty() {
            return Err(ClassifyError::config(
                "dataset.extensions must list at least one extension",
            ));
        }
        let t = &self.trainer;
        if t.epochs == 0 || t.batch_size == 0 {
            return Err(ClassifyError::config(
                "trainer.epochs and trainer.batch_size must be at least 1",
            ));
        }
        if t.image_width == 0 || t.image_height == 0 {
            return Err(ClassifyError::config(
                "trainer image dimensions must be non-zero",
            ));
        }
        if t.learning_rate.is_nan() || t.learning_rate <= 0.0 {
            return Err(ClassifyError::config(format!(
                "trainer.learning_rate must be positive, got {}",
                t.learning_rate
            )));
        }
        if !t.weight_decay.is_finite() || t.weight_decay < 0.0 {
            return Err(ClassifyError::config(format!(
                "trainer.weight_decay must be a finite non-negative number, got {}",
                t.weight_decay
            )));
        }
        Ok(())
    }
}

/// Locations of inputs and outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Assets root. When unset, `../../../assets` relative to the executable.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Download/extract folder for image sets, relative to the root.
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
    /// Folder holding images for the smoke-test prediction.
    #[serde(default = "default_predictions_dir")]
    pub predictions_dir: PathBuf,
    /// Serialized model output path.
    #[serde(default = "default_model_output")]
    pub model_output: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: None,
            images_dir: default_images_dir(),
            predictions_dir: default_predictions_dir(),
            model_output: default_model_output(),
        }
    }
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("inputs").join("images")
}

fn default_predictions_dir() -> PathBuf {
    PathBuf::from("inputs")
        .join("images-for-predictions")
        .join("FlowersForPredictions")
}

fn default_model_output() -> PathBuf {
    PathBuf::from("outputs").join("imageClassifier.zip")
}

impl AssetsConfig {
    /// Resolve the assets root, falling back to the executable-relative default.
    pub fn resolve_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| ClassifyError::filesystem(&exe, "executable has no parent directory"))?;
        Ok(dir.join("..").join("..").join("..").join("assets"))
    }

    pub fn images_path(&self, root: &Path) -> PathBuf {
        root.join(&self.images_dir)
    }

    pub fn predictions_path(&self, root: &Path) -> PathBuf {
        root.join(&self.predictions_dir)
    }

    pub fn model_path(&self, root: &Path) -> PathBuf {
        root.join(&self.model_output)
    }
}

/// Dataset source and materializer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Archive download URL.
    #[serde(default = "default_dataset_url")]
    pub url: String,
    /// Local archive file name; its stem names the extracted folder.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    /// Extension allow-list, without dots. Matched exactly (case-sensitive).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub label_source: LabelSource,
    #[serde(default)]
    pub empty_label: EmptyLabelPolicy,
    /// Number of times each image is emitted.
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            url: default_dataset_url(),
            archive_name: default_archive_name(),
            extensions: default_extensions(),
            label_source: LabelSource::default(),
            empty_label: EmptyLabelPolicy::default(),
            repeat: default_repeat(),
        }
    }
}

fn default_dataset_url() -> String {
    concat!(
        "https://mlnetfilestorage.file.core.windows.net/imagesets/flower_images/",
        "flower_photos_small_set.zip",
        "?st=2019-08-07T21%3A27%3A44Z&se=2030-08-08T21%3A27%3A00Z&sp=rl&sv=2018-03-28&sr=f",
        "&sig=SZ0UBX47pXD0F1rmrOM%2BfcwbPVob8hlgFtIlN89micM%3D",
    )
    .to_string()
}

fn default_archive_name() -> String {
    "flower_photos_small_set.zip".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "png".to_string()]
}

fn default_repeat() -> usize {
    1
}

impl DatasetConfig {
    /// Folder name the archive extracts to (archive name without extension).
    pub fn folder_name(&self) -> String {
        Path::new(&self.archive_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.archive_name.clone())
    }
}

/// How train and test sets are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Load the whole image set, shuffle, and split by fraction.
    #[default]
    Shuffle,
    /// Load separate train and test folders inside the image set.
    Presplit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default)]
    pub mode: SplitMode,
    /// Proportion of records reserved for evaluation.
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_train_folder")]
    pub train_folder: String,
    #[serde(default = "default_test_folder")]
    pub test_folder: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            mode: SplitMode::default(),
            test_fraction: default_test_fraction(),
            train_folder: default_train_folder(),
            test_folder: default_test_folder(),
        }
    }
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_train_folder() -> String {
    "train-dataset".to_string()
}

fn default_test_folder() -> String {
    "test-dataset".to_string()
}

/// Hyperparameters for the softmax trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_image_side")]
    pub image_width: u32,
    #[serde(default = "default_image_side")]
    pub image_height: u32,
    /// One epoch is a full pass over the training set.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// L2 penalty applied to the weights.
    #[serde(default)]
    pub weight_decay: f32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            image_width: default_image_side(),
            image_height: default_image_side(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            weight_decay: 0.0,
        }
    }
}

fn default_image_side() -> u32 {
    32
}

fn default_epochs() -> usize {
    20
}

fn default_batch_size() -> usize {
    10
}

fn default_learning_rate() -> f32 {
    0.01
}

/// Load configuration from all layers.
///
/// `workspace` is searched for `imgclass.toml`; `explicit` is a file given on
/// the command line and must exist.
pub fn load_config(workspace: Option<&Path>, explicit: Option<&Path>) -> Result<ClassifierConfig> {
    let mut figment = Figment::from(Serialized::defaults(ClassifierConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "imgclass", "imgclass") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join("imgclass.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ClassifyError::filesystem(path, "config file not found"));
        }
        figment = figment.merge(Toml::file(path));
    }

    // IMGCLASS_SEED, IMGCLASS_SPLIT__TEST_FRACTION, IMGCLASS_TRAINER__EPOCHS, ...
    figment = figment.merge(Env::prefixed("IMGCLASS_").split("__"));

    let config: ClassifierConfig = figment
        .extract()
        .map_err(|e| ClassifyError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
