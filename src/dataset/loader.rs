//! Directory-of-folders dataset loader
//!
//! Every immediate subdirectory of the root is a class; the label order is
//! the alphabetical order of the folder names. Image files anywhere below a
//! class folder, nested subfolders included, are samples of that class.

use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::{format_progress_bar, Result, WasteSortError};

/// File extensions accepted as samples (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png"];

/// A single image on disk with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    /// Index into [`WasteDataset::class_names`]
    pub label: usize,
}

/// Labeled image dataset discovered from a directory tree
#[derive(Debug, Clone)]
pub struct WasteDataset {
    pub root_dir: PathBuf,
    /// Class names in label order
    pub class_names: Vec<String>,
    /// Samples in label order, files in sorted walk order within each class
    pub samples: Vec<ImageSample>,
}

impl WasteDataset {
    /// Scan a dataset root laid out as:
    /// ```text
    /// root_dir/
    /// ├── Clothes/
    /// │   ├── 0001.jpg
    /// │   └── 0002.png
    /// ├── Green-Glass/
    /// └── Plastic/
    /// ```
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading dataset from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(WasteSortError::PathNotFound(root_dir));
        }

        let mut class_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_names.push(name.to_string());
                }
            }
        }
        class_names.sort();

        if class_names.is_empty() {
            return Err(WasteSortError::Dataset(format!(
                "No class subdirectories found in {}",
                root_dir.display()
            )));
        }

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let before = samples.len();

            for entry in WalkDir::new(root_dir.join(class_name))
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if is_image_file(entry.path()) {
                    samples.push(ImageSample {
                        path: entry.path().to_path_buf(),
                        label,
                    });
                }
            }

            debug!(
                "Class '{}' (label {}): {} samples",
                class_name,
                label,
                samples.len() - before
            );
        }

        if samples.is_empty() {
            return Err(WasteSortError::Dataset(format!(
                "No images found in {} (looked for {})",
                root_dir.display(),
                IMAGE_EXTENSIONS.join(", ")
            )));
        }

        info!(
            "Found {} images belonging to {} classes",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            root_dir,
            class_names,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Number of samples per class, in label order
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            root_dir: self.root_dir.clone(),
            class_names: self.class_names.clone(),
            class_counts: self.class_counts(),
        }
    }
}

/// Whether the path carries one of the accepted image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Per-class sample counts of a dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub root_dir: PathBuf,
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
}

impl DatasetStats {
    pub fn total(&self) -> usize {
        self.class_counts.iter().sum()
    }

    /// Print a class distribution table with bars
    pub fn print(&self) {
        let total = self.total().max(1);
        let max_count = self.class_counts.iter().copied().max().unwrap_or(0).max(1);
        let name_width = self
            .class_names
            .iter()
            .map(|n| n.len())
            .max()
            .unwrap_or(5)
            .max(5);

        println!("{}", "Dataset Statistics:".cyan().bold());
        println!("  Root:    {}", self.root_dir.display());
        println!("  Classes: {}", self.class_names.len());
        println!("  Images:  {}", self.total());
        println!();

        for (name, count) in self.class_names.iter().zip(&self.class_counts) {
            println!(
                "  {:<width$}  {:>6}  {:>5.1}%  {}",
                name,
                count,
                100.0 * *count as f64 / total as f64,
                format_progress_bar(*count as f64 / max_count as f64, 30).green(),
                width = name_width
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Write a small solid-color dataset: `counts[i]` images for class `names[i]`
    pub(crate) fn write_dataset(root: &Path, names: &[&str], counts: &[usize]) {
        for (class_idx, (name, count)) in names.iter().zip(counts).enumerate() {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                let shade = (class_idx * 80 + i * 5) as u8;
                let img = RgbImage::from_pixel(20, 16, Rgb([shade, 255 - shade, 40]));
                img.save(dir.join(format!("{:03}.png", i))).unwrap();
            }
        }
    }

    #[test]
    fn test_discovers_sorted_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &["plastic", "Clothes", "Green-Glass"], &[2, 3, 1]);

        let dataset = WasteDataset::new(dir.path()).unwrap();
        assert_eq!(dataset.class_names, vec!["Clothes", "Green-Glass", "plastic"]);
        assert_eq!(dataset.len(), 6);
        assert_eq!(dataset.class_counts(), vec![3, 1, 2]);
    }

    #[test]
    fn test_ignores_non_image_files() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &["glass"], &[2]);
        std::fs::write(dir.path().join("glass").join("notes.txt"), "hi").unwrap();
        std::fs::write(dir.path().join("glass").join("UPPER.JPG"), "").unwrap();

        let dataset = WasteDataset::new(dir.path()).unwrap();
        // The .JPG counts, the .txt does not
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn test_includes_nested_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &["plastic"], &[1]);
        write_dataset(&dir.path().join("plastic"), &["bottles"], &[2]);

        let dataset = WasteDataset::new(dir.path()).unwrap();
        assert_eq!(dataset.class_names, vec!["plastic"]);
        assert_eq!(dataset.len(), 3);
        assert!(dataset
            .samples
            .iter()
            .any(|s| s.path.parent().unwrap().ends_with("bottles")));
    }

    #[test]
    fn test_missing_directory() {
        let result = WasteDataset::new("/no/such/dataset");
        assert!(matches!(result, Err(WasteSortError::PathNotFound(_))));
    }

    #[test]
    fn test_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("empty_class")).unwrap();

        let result = WasteDataset::new(dir.path());
        assert!(matches!(result, Err(WasteSortError::Dataset(_))));
    }

    #[test]
    fn test_no_class_folders() {
        let dir = tempfile::tempdir().unwrap();
        let result = WasteDataset::new(dir.path());
        assert!(matches!(result, Err(WasteSortError::Dataset(_))));
    }
}
