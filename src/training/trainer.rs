//! Fine-tuning loop
//!
//! A plain epoch loop over Burn primitives: seeded shuffling, lazy batching
//! from the preloaded dataset, cross-entropy on logits, Adam updates, and
//! evaluation on the non-autodiff inner backend.

use std::time::Instant;

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use super::config::TrainingConfig;
use super::early_stopping::EarlyStopping;
use super::history::{EpochMetrics, TrainingHistory};
use crate::dataset::{
    Augmenter, DatasetSplits, WasteBatch, WasteBatcher, WasteDataset, WasteImageDataset, WasteItem,
};
use crate::model::{
    load_backbone_weights, save_artifact, ArtifactMetadata, ArtifactPaths, WasteClassifier,
    WasteClassifierConfig,
};
use crate::utils::logging::TrainingLogger;
use crate::utils::{Result, WasteSortError};

/// What a finished training run produced
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub class_names: Vec<String>,
    pub paths: ArtifactPaths,
    pub history: TrainingHistory,
    /// 1-based epoch whose weights were saved
    pub kept_epoch: usize,
}

impl TrainingSummary {
    pub fn epochs_run(&self) -> usize {
        self.history.epochs.len()
    }

    /// Training accuracy reported for the last epoch
    pub fn final_train_accuracy(&self) -> f64 {
        self.history.last().map(|m| m.train_accuracy).unwrap_or(0.0)
    }

    /// Validation accuracy reported for the last epoch
    pub fn final_val_accuracy(&self) -> Option<f64> {
        self.history.last().and_then(|m| m.val_accuracy)
    }
}

/// Loss and accuracy over one pass
#[derive(Debug, Clone, Copy, Default)]
struct PassStats {
    loss_sum: f64,
    correct: usize,
    total: usize,
}

impl PassStats {
    fn add(&mut self, mean_loss: f64, correct: usize, count: usize) {
        self.loss_sum += mean_loss * count as f64;
        self.correct += correct;
        self.total += count;
    }

    fn loss(&self) -> f64 {
        self.loss_sum / self.total.max(1) as f64
    }

    fn accuracy(&self) -> f64 {
        self.correct as f64 / self.total.max(1) as f64
    }
}

/// Train a classifier on `config.data_dir` and save it to `config.model_path`
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingSummary> {
    config.validate()?;
    println!("{}", "Initializing Training...".green().bold());

    // Dataset
    println!("{}", "Loading Dataset...".cyan());
    let dataset = WasteDataset::new(&config.data_dir)?;
    println!(
        "  Found {} images belonging to {} classes",
        dataset.len(),
        dataset.num_classes()
    );
    println!("  Class names: {:?}", dataset.class_names);

    let splits = DatasetSplits::from_samples(&dataset.samples, &config.split_config())?;

    println!("{}", "Pre-loading Training Data...".cyan());
    let train_data = WasteImageDataset::load(&splits.train, config.image_size)?;
    println!("{}", "Pre-loading Validation Data...".cyan());
    let val_data = WasteImageDataset::load(&splits.validation, config.image_size)?;

    // Model
    println!("{}", "Creating Model...".cyan());
    let classifier_config = config.classifier_config(dataset.num_classes());
    let mut model = build_model::<B>(config, &classifier_config, device)?;
    let mut optimizer = AdamConfig::new().init::<B, WasteClassifier<B>>();

    let train_batcher = if config.augmentation.enabled {
        info!("Augmenting training batches: {:?}", config.augmentation);
        WasteBatcher::augmenting(Augmenter::new(config.augmentation.clone()), config.seed)
    } else {
        WasteBatcher::new()
    };

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Backbone:            {}", classifier_config.backbone);
    println!("  Training samples:    {}", train_data.len());
    println!("  Validation samples:  {}", val_data.len());
    println!("  Image size:          {}x{}", config.image_size, config.image_size);
    println!("  Epochs:              {}", config.epochs);
    println!(
        "  Batch size:          {} (validation {})",
        config.train_batch_size, config.val_batch_size
    );
    println!("  Learning rate:       {}", config.learning_rate);
    println!(
        "  Augmentation:        {}",
        if train_batcher.is_augmenting() { "on" } else { "off" }
    );
    println!();
    println!("{}", "Starting Training...".green().bold());

    let mut history = TrainingHistory::new(dataset.class_names.clone());
    let mut stopper = EarlyStopping::new(config.early_stopping.clone());
    let mut best_model: Option<WasteClassifier<B>> = None;
    let mut logger = TrainingLogger::new(config.epochs);
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);

    if val_data.is_empty() {
        warn!("No validation split; early stopping and best-weight restore are inactive");
    }

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        let epoch_start = Instant::now();
        println!("{}", format!("Epoch {}/{}", epoch + 1, config.epochs).yellow().bold());

        let (trained, train_stats) = train_epoch(
            model,
            &mut optimizer,
            &train_data,
            &train_batcher,
            config,
            &mut epoch_rng,
            device,
        )?;
        model = trained;

        let val_stats = if val_data.is_empty() {
            None
        } else {
            Some(evaluate(&model.valid(), &val_data, config.val_batch_size))
        };

        let mut is_best = false;
        let mut stop = false;
        if let Some(stats) = &val_stats {
            let decision = stopper.update(epoch, stats.loss());
            is_best = decision.improved;
            stop = decision.stop;
            if is_best {
                logger.log_new_best(stats.loss());
                if stopper.should_restore_best() {
                    best_model = Some(model.clone());
                }
            }
        }

        let metrics = EpochMetrics {
            epoch: epoch + 1,
            train_loss: train_stats.loss(),
            train_accuracy: train_stats.accuracy(),
            val_loss: val_stats.map(|s| s.loss()),
            val_accuracy: val_stats.map(|s| s.accuracy()),
            duration_secs: epoch_start.elapsed().as_secs_f64(),
        };
        logger.end_epoch(
            metrics.train_loss,
            metrics.train_accuracy,
            metrics.val_loss.unwrap_or(f64::NAN),
            metrics.val_accuracy.unwrap_or(f64::NAN),
        );
        print_epoch_line(&metrics, is_best);
        history.push(metrics);

        if stop {
            logger.log_early_stop(stopper.patience());
            println!(
                "  {} No val_loss improvement for {} epochs, stopping after epoch {}",
                "Early stop:".yellow(),
                stopper.patience(),
                stopper.stopped_epoch().unwrap_or(epoch) + 1
            );
            history.stopped_early = true;
            break;
        }
    }

    let mut kept_epoch = history.epochs.len();
    if let (Some(best), Some(best_epoch)) = (best_model, stopper.best_epoch()) {
        if best_epoch + 1 != kept_epoch {
            println!(
                "  Restoring weights from epoch {} (val_loss {:.4})",
                best_epoch + 1,
                stopper.best_loss().unwrap_or(f64::NAN)
            );
        }
        model = best;
        kept_epoch = best_epoch + 1;
    }
    history.best_epoch = Some(kept_epoch);

    // Save
    println!();
    println!("{}", "Saving Model...".cyan());
    let mut metadata = ArtifactMetadata::new(dataset.class_names.clone(), config.image_size, &classifier_config);
    metadata.best_epoch = Some(kept_epoch);
    metadata.best_val_loss = history
        .epochs
        .get(kept_epoch - 1)
        .and_then(|m| m.val_loss);

    let paths = save_artifact(model.valid(), &metadata, &config.model_path)?;
    history.save(&paths.history)?;
    println!("  Saved to: {}", paths.weights.display());
    println!("  Metadata: {}", paths.metadata.display());

    logger.log_complete(history.epochs.len(), stopper.best_loss().unwrap_or(f64::NAN));

    let summary = TrainingSummary {
        class_names: dataset.class_names,
        paths,
        history,
        kept_epoch,
    };

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  Final training accuracy:   {:.2}%",
        summary.final_train_accuracy() * 100.0
    );
    match summary.final_val_accuracy() {
        Some(acc) => println!("  Final validation accuracy: {:.2}%", acc * 100.0),
        None => println!("  Final validation accuracy: n/a (no validation split)"),
    }

    Ok(summary)
}

/// Fresh model, with pretrained backbone weights when configured
fn build_model<B: AutodiffBackend>(
    config: &TrainingConfig,
    classifier_config: &WasteClassifierConfig,
    device: &B::Device,
) -> Result<WasteClassifier<B>> {
    let mut model = WasteClassifier::<B>::new(classifier_config, device);

    match &config.model.backbone_weights {
        Some(path) => {
            let backbone = load_backbone_weights(model.backbone.clone(), path, device)?;
            model = model.with_backbone(backbone);
        }
        None => warn!(
            "No backbone_weights configured; {} starts from random initialization",
            classifier_config.backbone
        ),
    }

    if config.model.freeze_backbone {
        info!("Backbone frozen; only the classification head is trained");
        let backbone = model.backbone.clone().no_grad();
        model = model.with_backbone(backbone);
    }

    Ok(model)
}

fn train_epoch<B, O>(
    mut model: WasteClassifier<B>,
    optimizer: &mut O,
    dataset: &WasteImageDataset,
    batcher: &WasteBatcher,
    config: &TrainingConfig,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) -> Result<(WasteClassifier<B>, PassStats)>
where
    B: AutodiffBackend,
    O: Optimizer<WasteClassifier<B>, B>,
{
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let mut indices: Vec<usize> = (0..dataset.len()).collect();
    indices.shuffle(rng);

    let num_batches = indices.len().div_ceil(config.train_batch_size);
    let mut stats = PassStats::default();

    for (batch_idx, chunk) in indices.chunks(config.train_batch_size).enumerate() {
        let items: Vec<WasteItem> = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
        let batch = make_batch::<B>(batcher, items, device);
        let count = batch.targets.dims()[0];

        let output = model.forward(batch.images);
        let loss = loss_fn.forward(output.clone(), batch.targets.clone());

        let loss_value: f64 = loss.clone().into_scalar().elem();
        if !loss_value.is_finite() {
            return Err(WasteSortError::Training(format!(
                "Loss became {} at batch {}",
                loss_value,
                batch_idx + 1
            )));
        }
        let correct = count_correct(output, batch.targets);
        stats.add(loss_value, correct, count);

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(config.learning_rate, model, grads);

        if (batch_idx + 1) % 10 == 0 || batch_idx + 1 == num_batches {
            println!(
                "  Batch {:>4}/{}: loss = {:.4}, acc = {:.2}%",
                batch_idx + 1,
                num_batches,
                loss_value,
                stats.accuracy() * 100.0
            );
        }
    }

    Ok((model, stats))
}

/// Validation loss and accuracy, without gradients or dropout
fn evaluate<B: Backend>(
    model: &WasteClassifier<B>,
    dataset: &WasteImageDataset,
    batch_size: usize,
) -> PassStats {
    let device = model.devices().into_iter().next().unwrap_or_default();
    let loss_fn = CrossEntropyLossConfig::new().init(&device);
    let batcher = WasteBatcher::new();

    let mut stats = PassStats::default();
    let indices: Vec<usize> = (0..dataset.len()).collect();

    for chunk in indices.chunks(batch_size) {
        let items: Vec<WasteItem> = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
        let batch = make_batch::<B>(&batcher, items, &device);
        let count = batch.targets.dims()[0];

        let output = model.forward(batch.images);
        let loss: f64 = loss_fn
            .forward(output.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        stats.add(loss, count_correct(output, batch.targets), count);
    }

    stats
}

fn make_batch<B: Backend>(batcher: &WasteBatcher, items: Vec<WasteItem>, device: &B::Device) -> WasteBatch<B> {
    Batcher::<B, WasteItem, WasteBatch<B>>::batch(batcher, items, device)
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = logits.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

fn print_epoch_line(metrics: &EpochMetrics, is_best: bool) {
    let val = match (metrics.val_loss, metrics.val_accuracy) {
        (Some(loss), Some(acc)) => format!(" | Val Loss: {:.4} | Val Acc: {:.2}%", loss, acc * 100.0),
        _ => String::new(),
    };
    println!(
        "  {} Loss: {:.4} | Train Acc: {:.2}%{} {}",
        "→".cyan(),
        metrics.train_loss,
        metrics.train_accuracy * 100.0,
        val,
        if is_best { "(best)".green().to_string() } else { String::new() }
    );
}
