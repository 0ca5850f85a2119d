//! Burn dataset and batcher for waste images
//!
//! Images are decoded and resized once, in parallel, and kept in memory as
//! 8-bit RGB. Batching converts them to `[N, 3, H, W]` float tensors in
//! [0, 1], optionally passing each image through the [`Augmenter`] first.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::augmentation::Augmenter;
use super::loader::ImageSample;
use super::preprocess;
use crate::utils::Result;

/// A resized image with its label
#[derive(Debug, Clone)]
pub struct WasteItem {
    pub image: RgbImage,
    pub label: usize,
    pub path: PathBuf,
}

impl WasteItem {
    pub fn from_sample(sample: &ImageSample, image_size: usize) -> Result<Self> {
        let img = preprocess::load_rgb(&sample.path)?;
        Ok(Self {
            image: preprocess::resize(&img, image_size),
            label: sample.label,
            path: sample.path.clone(),
        })
    }
}

/// In-memory dataset of resized images
#[derive(Debug, Clone)]
pub struct WasteImageDataset {
    items: Vec<WasteItem>,
}

impl WasteImageDataset {
    /// Decode and resize every sample up front
    ///
    /// Fails on the first image that cannot be decoded.
    pub fn load(samples: &[ImageSample], image_size: usize) -> Result<Self> {
        let total = samples.len();

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let loaded = AtomicUsize::new(0);
        let items = samples
            .par_iter()
            .map(|sample| {
                let item = WasteItem::from_sample(sample, image_size);
                let count = loaded.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 50 == 0 || count == total {
                    pb.set_position(count as u64);
                }
                item
            })
            .collect::<Result<Vec<_>>>();

        pb.finish_and_clear();
        let items = items?;

        Ok(Self { items })
    }
}

impl Dataset<WasteItem> for WasteImageDataset {
    fn get(&self, index: usize) -> Option<WasteItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of images and integer class targets
#[derive(Clone, Debug)]
pub struct WasteBatch<B: Backend> {
    /// `[batch_size, 3, height, width]`, values in [0, 1]
    pub images: Tensor<B, 4>,
    /// `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher with optional per-image augmentation
///
/// Each call derives its RNG from the base seed and a shared call counter, so
/// a training run is reproducible while every batch sees fresh transforms.
#[derive(Clone, Debug)]
pub struct WasteBatcher {
    augmenter: Option<Augmenter>,
    seed: u64,
    calls: Arc<AtomicU64>,
}

impl WasteBatcher {
    /// Plain batcher: rescale only
    pub fn new() -> Self {
        Self {
            augmenter: None,
            seed: 0,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Batcher that augments every image it sees
    pub fn augmenting(augmenter: Augmenter, seed: u64) -> Self {
        Self {
            augmenter: Some(augmenter),
            seed,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_augmenting(&self) -> bool {
        self.augmenter.is_some()
    }
}

impl Default for WasteBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Batcher<B, WasteItem, WasteBatch<B>> for WasteBatcher {
    fn batch(&self, items: Vec<WasteItem>, device: &B::Device) -> WasteBatch<B> {
        let batch_size = items.len();
        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();

        let images: Vec<RgbImage> = match &self.augmenter {
            Some(augmenter) => {
                let call = self.calls.fetch_add(1, Ordering::Relaxed);
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(call));
                items
                    .iter()
                    .map(|item| augmenter.augment(&item.image, &mut rng))
                    .collect()
            }
            None => items.into_iter().map(|item| item.image).collect(),
        };

        let images = preprocess::images_to_tensor::<B>(&images, device);
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        WasteBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use crate::dataset::loader::tests::write_dataset;
    use crate::dataset::loader::WasteDataset;
    use crate::backend::DefaultBackend;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_load_and_batch_shapes() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &["a", "b"], &[3, 2]);
        let loader = WasteDataset::new(dir.path()).unwrap();

        let dataset = WasteImageDataset::load(&loader.samples, 12).unwrap();
        assert_eq!(dataset.len(), 5);
        assert_eq!(dataset.get(0).unwrap().image.dimensions(), (12, 12));

        let items: Vec<_> = (0..4).filter_map(|i| dataset.get(i)).collect();
        let device = Default::default();
        let batch: WasteBatch<TestBackend> = WasteBatcher::new().batch(items, &device);

        assert_eq!(batch.images.dims(), [4, 3, 12, 12]);
        assert_eq!(batch.targets.dims(), [4]);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_load_fails_on_corrupt_image() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &["a"], &[2]);
        std::fs::write(dir.path().join("a").join("zzz.jpg"), b"garbage").unwrap();
        let loader = WasteDataset::new(dir.path()).unwrap();

        assert!(WasteImageDataset::load(&loader.samples, 8).is_err());
    }

    #[test]
    fn test_augmenting_batcher_keeps_shape() {
        let item = WasteItem {
            image: RgbImage::from_fn(10, 10, |x, y| image::Rgb([x as u8 * 20, y as u8 * 20, 5])),
            label: 1,
            path: PathBuf::from("x.png"),
        };
        let config = AugmentationConfig {
            enabled: true,
            ..AugmentationConfig::default()
        };
        let batcher = WasteBatcher::augmenting(Augmenter::new(config), 42);
        assert!(batcher.is_augmenting());

        let device = Default::default();
        let batch: WasteBatch<TestBackend> = batcher.batch(vec![item.clone(), item], &device);
        assert_eq!(batch.images.dims(), [2, 3, 10, 10]);
        assert_eq!(batch.targets.into_data().to_vec::<i64>().unwrap(), vec![1, 1]);
    }
}
