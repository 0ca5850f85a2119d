//! Preview window for the static predictor (`display` feature)

use image::RgbImage;

use crate::utils::Result;
#[cfg(not(feature = "display"))]
use crate::utils::WasteSortError;

/// Largest window edge; bigger images are shrunk to fit
const MAX_WINDOW_EDGE: u32 = 1280;

/// Pack RGB pixels into minifb's 0RGB u32 format
pub fn to_argb_buffer(image: &RgbImage) -> Vec<u32> {
    image
        .pixels()
        .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32)
        .collect()
}

/// Size the window so its longer edge is at most [`MAX_WINDOW_EDGE`]
pub fn fit_to_screen(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if longest <= MAX_WINDOW_EDGE {
        return image.clone();
    }
    let scale = MAX_WINDOW_EDGE as f64 / longest as f64;
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    image::imageops::resize(image, nw, nh, image::imageops::FilterType::Triangle)
}

/// Show `image` in a window and block until a key is pressed or it is closed
#[cfg(feature = "display")]
pub fn show_until_keypress(image: &RgbImage, title: &str) -> Result<()> {
    use crate::utils::WasteSortError;
    use minifb::{Window, WindowOptions};

    let shown = fit_to_screen(image);
    let (width, height) = (shown.width() as usize, shown.height() as usize);
    let buffer = to_argb_buffer(&shown);

    let mut window = Window::new(title, width, height, WindowOptions::default())
        .map_err(|e| WasteSortError::InvalidInput(format!("Failed to create window: {}", e)))?;
    window.set_target_fps(30);

    while window.is_open() && window.get_keys().is_empty() {
        window
            .update_with_buffer(&buffer, width, height)
            .map_err(|e| WasteSortError::InvalidInput(format!("Window update failed: {}", e)))?;
    }
    Ok(())
}

#[cfg(not(feature = "display"))]
pub fn show_until_keypress(_image: &RgbImage, _title: &str) -> Result<()> {
    Err(WasteSortError::Config(
        "this build has no display support; rebuild with `--features display`".to_string(),
    ))
}
