//! Frame sources for the capture thread
//!
//! A source is created on the capture thread and dropped there; dropping it
//! releases the device.

use std::f32::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::utils::Result;

/// Anything that can produce RGB frames on demand
pub trait FrameSource {
    /// Human-readable device name for logs
    fn name(&self) -> String;

    /// Block until the next frame is available
    fn next_frame(&mut self) -> Result<RgbImage>;
}

/// Which source the camera app should open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Physical camera via nokhwa (`camera` feature)
    #[default]
    Camera,
    /// Moving test pattern, no hardware needed
    Synthetic,
}

/// Webcam opened through nokhwa
#[cfg(feature = "camera")]
pub struct NokhwaSource {
    camera: nokhwa::Camera,
}

#[cfg(feature = "camera")]
impl NokhwaSource {
    /// Open camera `index`, asking for the format closest to `width`x`height`
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self> {
        use crate::utils::WasteSortError;
        use nokhwa::pixel_format::RgbFormat;
        use nokhwa::utils::{
            CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
        };

        let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, 30);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = nokhwa::Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| WasteSortError::Camera(format!("Failed to open camera {}: {}", index, e)))?;
        camera
            .open_stream()
            .map_err(|e| WasteSortError::Camera(format!("Failed to start camera stream: {}", e)))?;

        tracing::info!(
            "Opened camera {} ({}) at {}",
            index,
            camera.info().human_name(),
            camera.camera_format()
        );
        Ok(Self { camera })
    }
}

#[cfg(feature = "camera")]
impl FrameSource for NokhwaSource {
    fn name(&self) -> String {
        self.camera.info().human_name()
    }

    fn next_frame(&mut self) -> Result<RgbImage> {
        use crate::utils::WasteSortError;
        use nokhwa::pixel_format::RgbFormat;

        let frame = self
            .camera
            .frame()
            .map_err(|e| WasteSortError::Camera(format!("Failed to read frame: {}", e)))?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| WasteSortError::Camera(format!("Failed to decode frame: {}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| WasteSortError::Camera("Decoded frame has the wrong size".to_string()))
    }
}

#[cfg(feature = "camera")]
impl Drop for NokhwaSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

/// Animated gradient paced at a fixed frame rate
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    frame_index: u64,
    last_frame: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            frame_index: 0,
            last_frame: None,
        }
    }

    fn render(&self) -> RgbImage {
        let phase = self.frame_index as f32 * 0.05;
        let (w, h) = (self.width as f32, self.height as f32);
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let u = x as f32 / w;
            let v = y as f32 / h;
            let r = 127.5 * (1.0 + (2.0 * PI * (u + phase)).sin());
            let g = 127.5 * (1.0 + (2.0 * PI * (v - phase)).sin());
            let b = 255.0 * (0.5 * (u + v));
            Rgb([r as u8, g as u8, b as u8])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<RgbImage> {
        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());

        let frame = self.render();
        self.frame_index += 1;
        Ok(frame)
    }
}
