//! End-to-end: train on a generated dataset, reload the artifact, predict

use std::path::Path;

use image::{Rgb, RgbImage};

use waste_sort::backend::{DefaultBackend, TrainingBackend};
use waste_sort::inference::Predictor;
use waste_sort::model::{load_metadata, ArtifactPaths};
use waste_sort::training::{run_training, TrainingConfig, TrainingHistory};

type Backend = DefaultBackend;
type TrainBackend = TrainingBackend;

const CLASSES: [(&str, [u8; 3]); 3] = [
    ("Biological", [120, 80, 30]),
    ("Green-Glass", [30, 160, 60]),
    ("plastic", [40, 90, 200]),
];

/// Noisy solid-colour images, one folder per class
fn write_dataset(root: &Path, per_class: usize) {
    for (name, base) in CLASSES {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let img = RgbImage::from_fn(36, 28, |x, y| {
                let jitter = ((x * 7 + y * 13 + i as u32 * 31) % 21) as u8;
                Rgb([
                    base[0].saturating_add(jitter),
                    base[1].saturating_add(jitter),
                    base[2].saturating_add(jitter),
                ])
            });
            img.save(dir.join(format!("img_{:03}.png", i))).unwrap();
        }
    }
    // non-image files are ignored
    std::fs::write(root.join("plastic").join("notes.txt"), "not an image").unwrap();
}

/// 0-based index of the first epoch with the lowest validation loss
fn argmin_val_loss(history: &TrainingHistory) -> usize {
    let losses: Vec<f64> = history.epochs.iter().map(|m| m.val_loss.unwrap()).collect();
    let mut best = 0;
    for (i, loss) in losses.iter().enumerate() {
        if *loss < losses[best] {
            best = i;
        }
    }
    best
}

fn small_config(data_dir: &Path, model_path: &Path) -> TrainingConfig {
    let mut config = TrainingConfig {
        data_dir: data_dir.to_path_buf(),
        model_path: model_path.to_path_buf(),
        image_size: 32,
        epochs: 2,
        learning_rate: 1e-3,
        train_batch_size: 4,
        val_batch_size: 8,
        ..TrainingConfig::default()
    };
    config.early_stopping.patience = 1;
    config
}

#[test]
fn train_save_load_predict() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("classes");
    let model_path = dir.path().join("out").join("classifier.mpk");
    write_dataset(&data_dir, 5);

    let config = small_config(&data_dir, &model_path);
    let device = Default::default();
    let summary = run_training::<TrainBackend>(&config, &device).unwrap();

    // class names are the sorted folder names
    assert_eq!(summary.class_names, vec!["Biological", "Green-Glass", "plastic"]);
    assert!(summary.epochs_run() >= 1 && summary.epochs_run() <= 2);
    assert!(summary.final_val_accuracy().is_some());

    let paths = ArtifactPaths::from_model_path(&model_path);
    assert!(paths.weights.exists());
    assert!(paths.metadata.exists());
    assert!(paths.history.exists());

    let metadata = load_metadata(&model_path).unwrap();
    assert_eq!(metadata.class_names, summary.class_names);
    assert_eq!(metadata.image_size, 32);

    let history = TrainingHistory::load(&paths.history).unwrap();
    assert_eq!(history.epochs.len(), summary.epochs_run());
    assert!(history.epochs.iter().all(|m| m.train_loss.is_finite()));

    // the saved weights are those of the lowest-val_loss epoch
    assert_eq!(summary.kept_epoch, 1 + argmin_val_loss(&history));
    assert_eq!(metadata.best_epoch, Some(summary.kept_epoch));
    assert_eq!(history.best_epoch, Some(summary.kept_epoch));
    assert_eq!(
        metadata.best_val_loss,
        history.epochs[summary.kept_epoch - 1].val_loss
    );

    let predictor = Predictor::<Backend>::load(&model_path, &device).unwrap();
    assert_eq!(predictor.image_size(), 32);

    let sample = data_dir.join("Green-Glass").join("img_000.png");
    let first = predictor.predict_path(&sample).unwrap();
    assert!(summary.class_names.contains(&first.label));
    assert_eq!(first.probabilities.len(), 3);
    let total: f32 = first.probabilities.iter().sum();
    assert!((total - 1.0).abs() < 1e-4);

    // reloading gives the same answer
    let reloaded = Predictor::<Backend>::load(&model_path, &device).unwrap();
    let second = reloaded.predict_path(&sample).unwrap();
    assert_eq!(first.label, second.label);
    for (a, b) in first.probabilities.iter().zip(&second.probabilities) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn without_early_stopping_last_epoch_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("classes");
    let model_path = dir.path().join("classifier.mpk");
    write_dataset(&data_dir, 4);

    let mut config = small_config(&data_dir, &model_path);
    config.early_stopping.enabled = false;
    let summary = run_training::<TrainBackend>(&config, &Default::default()).unwrap();

    assert_eq!(summary.epochs_run(), 2);
    assert!(!summary.history.stopped_early);
    assert_eq!(summary.kept_epoch, 2);

    let metadata = load_metadata(&model_path).unwrap();
    assert_eq!(metadata.best_epoch, Some(2));
    let saved = metadata.best_val_loss.unwrap();
    let last = summary.history.epochs[1].val_loss.unwrap();
    assert!((saved - last).abs() < 1e-9);
}

#[test]
fn training_fails_on_missing_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(&dir.path().join("nope"), &dir.path().join("classifier.mpk"));

    let result = run_training::<TrainBackend>(&config, &Default::default());
    assert!(result.is_err());
    assert!(!dir.path().join("classifier.mpk").exists());
}

#[test]
fn predictor_rejects_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let result = Predictor::<Backend>::load(dir.path().join("classifier.mpk"), &Default::default());
    assert!(result.is_err());
}
