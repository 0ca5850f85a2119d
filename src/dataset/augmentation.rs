//! Random affine augmentation for training batches
//!
//! Each training image gets an independent random transform: rotation,
//! horizontal/vertical shift, shear, per-axis zoom and an optional horizontal
//! flip. Pixels sampled outside the source are filled from the nearest edge.
//! Augmentation is opt-in (`enabled = false` by default) and never touches
//! validation data or inference inputs.

use image::{Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::{Result, WasteSortError};

/// Configuration for training-time augmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Apply augmentation to training batches
    pub enabled: bool,
    /// Rotation range in degrees (uniform in ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Horizontal shift as a fraction of the width
    pub width_shift: f32,
    /// Vertical shift as a fraction of the height
    pub height_shift: f32,
    /// Shear angle range in degrees, counter-clockwise
    pub shear_degrees: f32,
    /// Zoom range; each axis scales by a factor in [1 - zoom, 1 + zoom]
    pub zoom: f32,
    /// Mirror half of the images left-to-right
    pub horizontal_flip: bool,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rotation_degrees: 30.0,
            width_shift: 0.2,
            height_shift: 0.2,
            shear_degrees: 0.2,
            zoom: 0.3,
            horizontal_flip: true,
        }
    }
}

impl AugmentationConfig {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("rotation_degrees", self.rotation_degrees, 0.0, 180.0),
            ("width_shift", self.width_shift, 0.0, 1.0),
            ("height_shift", self.height_shift, 0.0, 1.0),
            ("shear_degrees", self.shear_degrees, 0.0, 89.0),
            ("zoom", self.zoom, 0.0, 0.99),
        ];

        for (name, value, min, max) in checks {
            if !(min..=max).contains(&value) {
                return Err(WasteSortError::Config(format!(
                    "augmentation.{} must be in [{}, {}], got {}",
                    name, min, max, value
                )));
            }
        }
        Ok(())
    }
}

/// One concrete draw of transform parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineParams {
    pub rotation_degrees: f32,
    /// Shift in pixels along x
    pub shift_x: f32,
    /// Shift in pixels along y
    pub shift_y: f32,
    pub shear_degrees: f32,
    pub zoom_x: f32,
    pub zoom_y: f32,
    pub flip_horizontal: bool,
}

impl AffineParams {
    pub fn identity() -> Self {
        Self {
            rotation_degrees: 0.0,
            shift_x: 0.0,
            shift_y: 0.0,
            shear_degrees: 0.0,
            zoom_x: 1.0,
            zoom_y: 1.0,
            flip_horizontal: false,
        }
    }

    fn is_geometric_identity(&self) -> bool {
        self.rotation_degrees == 0.0
            && self.shift_x == 0.0
            && self.shift_y == 0.0
            && self.shear_degrees == 0.0
            && self.zoom_x == 1.0
            && self.zoom_y == 1.0
    }
}

/// Applies random augmentations drawn from an [`AugmentationConfig`]
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Draw transform parameters for an image of the given size
    pub fn sample_params(&self, width: u32, height: u32, rng: &mut ChaCha8Rng) -> AffineParams {
        let c = &self.config;
        AffineParams {
            rotation_degrees: symmetric(rng, c.rotation_degrees),
            shift_x: symmetric(rng, c.width_shift) * width as f32,
            shift_y: symmetric(rng, c.height_shift) * height as f32,
            shear_degrees: symmetric(rng, c.shear_degrees),
            zoom_x: 1.0 + symmetric(rng, c.zoom),
            zoom_y: 1.0 + symmetric(rng, c.zoom),
            flip_horizontal: c.horizontal_flip && rng.gen_bool(0.5),
        }
    }

    /// Augment one image; dimensions are preserved
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let params = self.sample_params(img.width(), img.height(), rng);
        apply_affine(img, &params)
    }
}

fn symmetric(rng: &mut ChaCha8Rng, range: f32) -> f32 {
    if range > 0.0 {
        rng.gen_range(-range..=range)
    } else {
        0.0
    }
}

/// Warp `img` with `params`, mapping each output pixel back into the source
///
/// The transform is centred on the image: zoom, then shear, then shift, then
/// rotation. Coordinates that land outside the source clamp to the edge.
pub fn apply_affine(img: &RgbImage, params: &AffineParams) -> RgbImage {
    let (width, height) = img.dimensions();

    let warped = if params.is_geometric_identity() {
        img.clone()
    } else {
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;

        let (sin_r, cos_r) = params.rotation_degrees.to_radians().sin_cos();
        let (sin_s, cos_s) = params.shear_degrees.to_radians().sin_cos();

        RgbImage::from_fn(width, height, |x, y| {
            let dx = (x as f32 - cx) * params.zoom_x;
            let dy = (y as f32 - cy) * params.zoom_y;

            let sx = dx - sin_s * dy + params.shift_x;
            let sy = cos_s * dy + params.shift_y;

            let src_x = cos_r * sx - sin_r * sy + cx;
            let src_y = sin_r * sx + cos_r * sy + cy;

            sample_edge_clamped(img, src_x, src_y)
        })
    };

    if params.flip_horizontal {
        image::imageops::flip_horizontal(&warped)
    } else {
        warped
    }
}

/// Bilinear sample with out-of-range coordinates clamped to the border
fn sample_edge_clamped(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
