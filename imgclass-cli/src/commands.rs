//! Subcommand handlers.

use crate::render::Renderer;
use imgclass_core::dataset::LabelSource;
use imgclass_core::report::{self, Segment, Style};
use imgclass_core::{
    ClassifierConfig, HttpFetcher, ImageLoader, SoftmaxModel, SoftmaxTrainer, TrainedModel,
    pipeline,
};
use std::path::Path;

/// Full training run with console report.
pub async fn train(config: &ClassifierConfig, assets_root: &Path) -> anyhow::Result<()> {
    let renderer = Renderer::detect();
    renderer.print(&[Segment::new(
        "*** Training the image classification model on pixel features ***",
        Style::Heading,
    )]);

    let fetcher = HttpFetcher::default();
    let trainer = SoftmaxTrainer::new(config.trainer.clone(), config.component_seed("trainer"));
    let summary = pipeline::run(config, assets_root, &fetcher, &trainer, &mut |m| {
        renderer.print(&report::epoch_line(m));
    })
    .await?;

    renderer.print(&report::elapsed_line("Training", summary.training_secs));
    renderer.print_all(&report::metrics_block(
        "Softmax pixel baseline",
        &summary.metrics,
        &summary.labels,
    ));
    renderer.print(&report::elapsed_line(
        "Predicting and Evaluation",
        summary.evaluation_secs,
    ));
    renderer.print_all(&report::predictions_block(&summary.predictions));
    renderer.print(&report::single_prediction_line(&summary.sample_prediction));
    renderer.print(&report::model_saved_line(&summary.model_path));
    Ok(())
}

/// Score every image under `dir` with a saved model.
pub fn predict(
    config: &ClassifierConfig,
    assets_root: &Path,
    dir: &Path,
    model: Option<&Path>,
) -> anyhow::Result<()> {
    let renderer = Renderer::detect();
    let model_path = model
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.assets.model_path(assets_root));
    let model = SoftmaxModel::load(&model_path)?;
    tracing::info!(
        model = %model_path.display(),
        classes = model.labels().len(),
        trained_at = %model.trained_at(),
        "Loaded model"
    );

    let mut records = ImageLoader::from_config(&config.dataset)
        .with_label_source(LabelSource::FolderName)
        .with_repeat(1)
        .load(dir)?;
    if records.is_empty() {
        println!("No images found in {}", dir.display());
        return Ok(());
    }
    records.sort_by(|a, b| a.path.cmp(&b.path));

    for prediction in model.transform(&records)? {
        renderer.print(&report::prediction_line(&prediction));
    }
    Ok(())
}
