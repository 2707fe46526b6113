use crate::transforms::Transform;
use anyhow::{ensure, Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array3;

// ============================================================================
// ToArray
// ============================================================================

/// Converts an image to a channel-last `(height, width, 3)` f32 array.
///
/// Values keep the 8-bit range `[0.0, 255.0]`; scaling is left to
/// [`Normalize`](super::Normalize). Non-RGB8 input is converted to RGB first.
///
/// # Example
/// ```ignore
/// let pixels: Array3<f32> = ToArray.apply(image)?;
/// assert_eq!(pixels.dim().2, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ToArray;

impl Transform<DynamicImage, Array3<f32>> for ToArray {
    fn apply(&self, img: DynamicImage) -> Result<Array3<f32>> {
        let (width, height) = img.dimensions();
        ensure!(
            width > 0 && height > 0,
            "Image dimensions must be positive (got {}x{})",
            width,
            height
        );

        let raw = match img {
            DynamicImage::ImageRgb8(rgb) => rgb.into_raw(),
            other => other.to_rgb8().into_raw(),
        };
        let values: Vec<f32> = raw.into_iter().map(f32::from).collect();

        Array3::from_shape_vec((height as usize, width as usize, 3), values)
            .context("RGB buffer does not match image dimensions")
    }
}
