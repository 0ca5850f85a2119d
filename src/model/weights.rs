//! Pretrained backbone weights
//!
//! Two sources are understood:
//! - a Burn record (`.mpk`) of a [`ResNetBackbone`], as written by
//!   [`save_backbone`]
//! - a torchvision state dict (`.pt` / `.pth`), with the `pytorch` feature

use std::path::Path;

use burn::module::Module;
use burn::record::Recorder;
use burn::tensor::backend::Backend;
use tracing::info;

use super::backbone::{ResNetBackbone, ResNetBackboneRecord};
use super::WeightsRecorder;
use crate::utils::{Result, WasteSortError};

/// Load pretrained weights into `backbone`, choosing the format by extension
pub fn load_backbone_weights<B: Backend>(
    backbone: ResNetBackbone<B>,
    path: &Path,
    device: &B::Device,
) -> Result<ResNetBackbone<B>> {
    if !path.exists() {
        return Err(WasteSortError::PathNotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let backbone = match ext.as_str() {
        "mpk" => {
            let record: ResNetBackboneRecord<B> = WeightsRecorder::new()
                .load(path.to_path_buf(), device)
                .map_err(|e| WasteSortError::Model(format!("Failed to load backbone record: {:?}", e)))?;
            backbone.load_record(record)
        }
        "pt" | "pth" => load_torchvision(backbone, path, device)?,
        other => {
            return Err(WasteSortError::Model(format!(
                "Unsupported backbone weight format '.{}' (expected .mpk, .pt or .pth)",
                other
            )))
        }
    };

    info!("Loaded backbone weights from {}", path.display());
    Ok(backbone)
}

/// Save a backbone alone, e.g. after converting torchvision weights once
pub fn save_backbone<B: Backend>(backbone: ResNetBackbone<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    backbone
        .save_file(path.to_path_buf(), &WeightsRecorder::new())
        .map_err(|e| WasteSortError::Model(format!("Failed to save backbone: {:?}", e)))
}

#[cfg(feature = "pytorch")]
fn load_torchvision<B: Backend>(
    backbone: ResNetBackbone<B>,
    path: &Path,
    device: &B::Device,
) -> Result<ResNetBackbone<B>> {
    use burn::record::FullPrecisionSettings;
    use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

    // torchvision names the shortcut branch `downsample.0` / `downsample.1`
    let args = LoadArgs::new(path.to_path_buf())
        .with_key_remap(r"downsample\.0\.(.+)", "downsample.conv.$1")
        .with_key_remap(r"downsample\.1\.(.+)", "downsample.bn.$1");

    let record: ResNetBackboneRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .map_err(|e| WasteSortError::Model(format!("Failed to import PyTorch weights: {:?}", e)))?;

    Ok(backbone.load_record(record))
}

#[cfg(not(feature = "pytorch"))]
fn load_torchvision<B: Backend>(
    _backbone: ResNetBackbone<B>,
    path: &Path,
    _device: &B::Device,
) -> Result<ResNetBackbone<B>> {
    Err(WasteSortError::Config(format!(
        "{} is a PyTorch file; rebuild with `--features pytorch` to import it",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::backbone::BackboneArch;
    use burn::tensor::Tensor;
    use crate::backend::DefaultBackend;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_backbone_record_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backbone.mpk");
        let device = Default::default();

        let source = ResNetBackbone::<TestBackend>::new(BackboneArch::ResNet18, &device);
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let expected = source.forward(input.clone()).into_data();
        save_backbone(source, &path).unwrap();

        let fresh = ResNetBackbone::<TestBackend>::new(BackboneArch::ResNet18, &device);
        let loaded = load_backbone_weights(fresh, &path, &device).unwrap();
        let actual = loaded.forward(input).into_data();

        let expected = expected.to_vec::<f32>().unwrap();
        let actual = actual.to_vec::<f32>().unwrap();
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_missing_weights_file() {
        let device = Default::default();
        let backbone = ResNetBackbone::<TestBackend>::new(BackboneArch::ResNet18, &device);
        let result = load_backbone_weights(backbone, Path::new("/no/weights.mpk"), &device);
        assert!(matches!(result, Err(WasteSortError::PathNotFound(_))));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.onnx");
        std::fs::write(&path, b"x").unwrap();

        let device = Default::default();
        let backbone = ResNetBackbone::<TestBackend>::new(BackboneArch::ResNet18, &device);
        assert!(matches!(
            load_backbone_weights(backbone, &path, &device),
            Err(WasteSortError::Model(_))
        ));
    }
}
