//! Waste Sort CLI
//!
//! Train the waste classifier, classify a single photo, or run the live camera
//! predictor.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use waste_sort::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use waste_sort::camera::{CameraConfig, SourceKind};
use waste_sort::dataset::{DatasetSplits, SplitConfig, WasteDataset};
use waste_sort::inference::{display, Predictor};
use waste_sort::model::{load_metadata, ArtifactPaths, BackboneArch};
use waste_sort::training::{run_training, TrainingConfig, TrainingHistory};
use waste_sort::utils::logging::{init_logging, LogConfig};

/// Waste image classification with Burn
///
/// Fine-tunes a pretrained CNN on a folder of labelled waste photos and serves
/// it from the command line or a live camera page.
#[derive(Parser, Debug)]
#[command(name = "waste_sort")]
#[command(version)]
#[command(about = "Waste image classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune the classifier on a class-per-folder dataset
    Train {
        /// TOML config file; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset root with one subdirectory per class
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Where to write the trained classifier
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Adam learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Training batch size
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Validation batch size
        #[arg(long)]
        val_batch_size: Option<usize>,

        /// Square input size in pixels
        #[arg(long)]
        image_size: Option<usize>,

        /// Seed for the split shuffle and augmentation
        #[arg(long)]
        seed: Option<u64>,

        /// Fraction of images held out for validation
        #[arg(long)]
        validation_split: Option<f64>,

        /// Enable random augmentation of training images
        #[arg(long, default_value = "false")]
        augmentation: bool,

        /// Backbone architecture
        #[arg(long, value_enum)]
        backbone: Option<BackboneArch>,

        /// Pretrained backbone weights (.mpk, or .pt/.pth with the `pytorch` feature)
        #[arg(long, env = "WASTE_SORT_BACKBONE_WEIGHTS")]
        backbone_weights: Option<PathBuf>,

        /// Train only the classification head
        #[arg(long, default_value = "false")]
        freeze_backbone: bool,

        /// Cap on the number of images used, after shuffling
        #[arg(long)]
        max_samples: Option<usize>,

        /// Disable early stopping on validation loss
        #[arg(long, default_value = "false")]
        no_early_stop: bool,

        /// Epochs without validation-loss improvement before stopping
        #[arg(long)]
        patience: Option<usize>,
    },

    /// Classify a single image
    Predict {
        /// Image to classify
        #[arg(short, long)]
        image: PathBuf,

        /// Trained classifier
        #[arg(short, long, default_value = waste_sort::DEFAULT_MODEL_PATH)]
        model: PathBuf,

        /// Show the image in a window until a key is pressed
        #[arg(long, default_value = "false")]
        show: bool,
    },

    /// Live camera preview with Capture and Predict buttons
    Camera {
        /// Trained classifier
        #[arg(short, long, default_value = waste_sort::DEFAULT_MODEL_PATH)]
        model: PathBuf,

        /// Frame source
        #[arg(long, value_enum, default_value = "camera")]
        source: SourceKind,

        /// Camera device index
        #[arg(long, default_value = "0")]
        camera_index: u32,

        /// Address for the browser UI
        #[arg(long, default_value = "127.0.0.1:8550")]
        bind: SocketAddr,

        /// File written by Capture and read by Predict
        #[arg(long, default_value = waste_sort::DEFAULT_CAPTURE_PATH)]
        capture_path: PathBuf,
    },

    /// Show class distribution of a dataset
    Stats {
        /// Dataset root with one subdirectory per class
        #[arg(short, long, default_value = waste_sort::DEFAULT_DATA_DIR)]
        data_dir: PathBuf,

        /// Also show the train/validation split sizes
        #[arg(long, default_value = "false")]
        show_splits: bool,
    },

    /// Print the metadata and history stored next to a trained classifier
    Inspect {
        /// Trained classifier
        #[arg(short, long, default_value = waste_sort::DEFAULT_MODEL_PATH)]
        model: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    print_banner();
    info!("Backend: {}", backend_name());

    match cli.command {
        Commands::Train {
            config,
            data_dir,
            model,
            epochs,
            learning_rate,
            batch_size,
            val_batch_size,
            image_size,
            seed,
            validation_split,
            augmentation,
            backbone,
            backbone_weights,
            freeze_backbone,
            max_samples,
            no_early_stop,
            patience,
        } => {
            let mut train_config = match config {
                Some(path) => TrainingConfig::from_toml(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => TrainingConfig::default(),
            };

            if let Some(v) = data_dir {
                train_config.data_dir = v;
            }
            if let Some(v) = model {
                train_config.model_path = v;
            }
            if let Some(v) = epochs {
                train_config.epochs = v;
            }
            if let Some(v) = learning_rate {
                train_config.learning_rate = v;
            }
            if let Some(v) = batch_size {
                train_config.train_batch_size = v;
            }
            if let Some(v) = val_batch_size {
                train_config.val_batch_size = v;
            }
            if let Some(v) = image_size {
                train_config.image_size = v;
            }
            if let Some(v) = seed {
                train_config.seed = v;
            }
            if let Some(v) = validation_split {
                train_config.validation_split = v;
            }
            if augmentation {
                train_config.augmentation.enabled = true;
            }
            if let Some(v) = backbone {
                train_config.model.backbone = v;
            }
            if let Some(v) = backbone_weights {
                train_config.model.backbone_weights = Some(v);
            }
            if freeze_backbone {
                train_config.model.freeze_backbone = true;
            }
            if let Some(v) = max_samples {
                train_config.max_samples = Some(v);
            }
            if no_early_stop {
                train_config.early_stopping.enabled = false;
            }
            if let Some(v) = patience {
                train_config.early_stopping.patience = v;
            }

            cmd_train(&train_config)?;
        }

        Commands::Predict { image, model, show } => {
            cmd_predict(&image, &model, show)?;
        }

        Commands::Camera {
            model,
            source,
            camera_index,
            bind,
            capture_path,
        } => {
            let camera_config = CameraConfig {
                model_path: model,
                source,
                camera_index,
                bind,
                capture_path,
                ..CameraConfig::default()
            };
            cmd_camera(&camera_config)?;
        }

        Commands::Stats {
            data_dir,
            show_splits,
        } => {
            cmd_stats(&data_dir, show_splits)?;
        }

        Commands::Inspect { model } => {
            cmd_inspect(&model)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +--------------------------------------------------+
 |   Waste Sort                                     |
 |   Waste Image Classification with Burn + Rust    |
 +--------------------------------------------------+
  "#
        .green()
    );
}

fn cmd_train(config: &TrainingConfig) -> Result<()> {
    info!("Training on {}", config.data_dir.display());
    let device = default_device();

    let summary = run_training::<TrainingBackend>(config, &device).context("Training failed")?;

    println!();
    println!("{}", "Artifacts:".cyan().bold());
    println!("  Weights:  {}", summary.paths.weights.display());
    println!("  Metadata: {}", summary.paths.metadata.display());
    println!("  History:  {}", summary.paths.history.display());
    Ok(())
}

fn cmd_predict(image: &Path, model: &Path, show: bool) -> Result<()> {
    info!("Loading classifier from {}", model.display());
    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::load(model, &device)
        .with_context(|| format!("Failed to load classifier {}", model.display()))?;

    let result = predictor.predict_path(image)?;
    result.display();

    if show {
        let original = waste_sort::dataset::preprocess::load_rgb(image)?;
        let title = format!("{} - {}", result.label, image.display());
        if let Err(e) = display::show_until_keypress(&original, &title) {
            warn!("Cannot show image: {}", e);
        }
    }
    Ok(())
}

fn cmd_camera(config: &CameraConfig) -> Result<()> {
    info!("Loading classifier from {}", config.model_path.display());
    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::load(&config.model_path, &device)
        .with_context(|| format!("Failed to load classifier {}", config.model_path.display()))?;

    println!(
        "{} open http://{} in a browser; close the page or press Ctrl-C to stop",
        "Camera:".cyan().bold(),
        config.bind
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let report = runtime.block_on(waste_sort::camera::run(config, predictor))?;

    println!(
        "{} {} frames captured",
        "Stopped:".green(),
        report.frames
    );
    Ok(())
}

fn cmd_stats(data_dir: &Path, show_splits: bool) -> Result<()> {
    info!("Computing dataset statistics for: {}", data_dir.display());

    let dataset = WasteDataset::new(data_dir)?;
    dataset.stats().print();

    if show_splits {
        let split_config = SplitConfig::default();
        let splits = DatasetSplits::from_samples(&dataset.samples, &split_config)?;
        println!();
        println!("{}", "Splits:".cyan().bold());
        println!(
            "  Using {} files for training",
            splits.train.len().to_string().green()
        );
        println!(
            "  Using {} files for validation",
            splits.validation.len().to_string().green()
        );
    }
    Ok(())
}

fn cmd_inspect(model: &Path) -> Result<()> {
    let metadata = load_metadata(model)
        .with_context(|| format!("No classifier metadata next to {}", model.display()))?;

    println!("{}", "Classifier:".cyan().bold());
    println!("  Weights:    {}", model.display());
    println!("  Backbone:   {}", metadata.backbone);
    println!("  Input size: {}x{}", metadata.image_size, metadata.image_size);
    println!("  Dropout:    {}", metadata.dropout);
    println!("  Created:    {}", metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Version:    {}", metadata.crate_version);
    if let (Some(epoch), Some(loss)) = (metadata.best_epoch, metadata.best_val_loss) {
        println!("  Kept epoch: {} (val_loss {:.4})", epoch, loss);
    }

    println!();
    println!("{}", "Classes:".cyan().bold());
    for (i, name) in metadata.class_names.iter().enumerate() {
        println!("  {:>3}  {}", i, name);
    }

    let history_path = ArtifactPaths::from_model_path(model).history;
    match TrainingHistory::load(&history_path) {
        Ok(history) => {
            println!();
            println!("{}", "History:".cyan().bold());
            println!(
                "  {:>5}  {:>10}  {:>9}  {:>10}  {:>9}",
                "epoch", "loss", "accuracy", "val_loss", "val_acc"
            );
            for m in &history.epochs {
                println!(
                    "  {:>5}  {:>10.4}  {:>9.4}  {:>10}  {:>9}",
                    m.epoch,
                    m.train_loss,
                    m.train_accuracy,
                    m.val_loss.map_or("-".to_string(), |v| format!("{:.4}", v)),
                    m.val_accuracy.map_or("-".to_string(), |v| format!("{:.4}", v)),
                );
            }
            if history.stopped_early {
                println!("  {}", "Stopped early".yellow());
            }
        }
        Err(e) => warn!("No training history: {}", e),
    }
    Ok(())
}
