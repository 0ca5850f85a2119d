//! Image preprocessing shared by training and both predictors
//!
//! Decode to RGB, resize to a square `image_size`, rescale each channel value
//! `v` to `v / 255`, lay out as CHW. Any further normalization happens inside
//! the model.

use std::path::Path;

use burn::prelude::*;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};

use crate::utils::{Result, WasteSortError};

/// Scale factor applied to raw 8-bit channel values
pub const RESCALE: f32 = 1.0 / 255.0;

/// Decode an image file into RGB, labelling failures with the path
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| WasteSortError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| WasteSortError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    let img = reader
        .decode()
        .map_err(|e| WasteSortError::image_at(path, e))?;

    Ok(img.to_rgb8())
}

/// Resize to `size` x `size` with bilinear filtering
pub fn resize(img: &RgbImage, size: usize) -> RgbImage {
    let size = size as u32;
    if img.width() == size && img.height() == size {
        return img.clone();
    }
    image::imageops::resize(img, size, size, FilterType::Triangle)
}

#[inline]
pub fn rescale(value: u8) -> f32 {
    value as f32 * RESCALE
}

/// Convert an RGB image into CHW float data in [0, 1]
pub fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; 3 * plane];

    for (i, pixel) in img.pixels().enumerate() {
        data[i] = rescale(pixel[0]);
        data[plane + i] = rescale(pixel[1]);
        data[2 * plane + i] = rescale(pixel[2]);
    }

    data
}

/// Stack already-resized images into a `[N, 3, H, W]` tensor
pub fn images_to_tensor<B: Backend>(images: &[RgbImage], device: &B::Device) -> Tensor<B, 4> {
    let batch_size = images.len();
    let (height, width) = images
        .first()
        .map(|img| (img.height() as usize, img.width() as usize))
        .unwrap_or((0, 0));

    let data: Vec<f32> = images.iter().flat_map(to_chw).collect();
    Tensor::<B, 4>::from_floats(TensorData::new(data, [batch_size, 3, height, width]), device)
}

/// Full single-image path used by the predictors: resize, rescale, batch of one
pub fn prepare_single<B: Backend>(img: &RgbImage, size: usize, device: &B::Device) -> Tensor<B, 4> {
    images_to_tensor(&[resize(img, size)], device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use image::Rgb;

    type TestBackend = DefaultBackend;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
        })
    }

    #[test]
    fn test_rescale_range() {
        assert_eq!(rescale(0), 0.0);
        assert!((rescale(255) - 1.0).abs() < 1e-6);
        assert!((rescale(51) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_resize_to_declared_size() {
        let img = gradient_image(320, 180);
        let resized = resize(&img, 240);
        assert_eq!(resized.dimensions(), (240, 240));
    }

    #[test]
    fn test_to_chw_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 51]));

        let data = to_chw(&img);
        assert_eq!(data.len(), 6);
        // R plane, then G plane, then B plane
        assert_eq!(&data[0..2], &[1.0, 0.0]);
        assert_eq!(&data[2..4], &[0.0, 1.0]);
        assert!((data[5] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_single_shape_and_range() {
        let device = Default::default();
        let img = gradient_image(64, 48);
        let tensor = prepare_single::<TestBackend>(&img, 32, &device);
        assert_eq!(tensor.dims(), [1, 3, 32, 32]);

        let values = tensor.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_load_rgb_unreadable_path() {
        let result = load_rgb(Path::new("/definitely/not/here.png"));
        match result {
            Err(WasteSortError::ImageLoad(path, _)) => {
                assert_eq!(path, Path::new("/definitely/not/here.png"))
            }
            other => panic!("expected ImageLoad error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_rgb_garbage_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image at all").unwrap();

        assert!(matches!(load_rgb(&path), Err(WasteSortError::ImageLoad(_, _))));
    }
}
