use crate::transforms::Transform;
use anyhow::{ensure, Result};
use image::{imageops::FilterType, DynamicImage};

// ============================================================================
// EnsureRgb
// ============================================================================

/// Converts any colour type (grey, grey+alpha, RGBA, 16-bit, float) to
/// 8-bit three-channel RGB. RGB8 input passes through untouched.
#[derive(Debug, Clone)]
pub struct EnsureRgb;

impl Transform<DynamicImage, DynamicImage> for EnsureRgb {
    fn apply(&self, img: DynamicImage) -> Result<DynamicImage> {
        Ok(match img {
            DynamicImage::ImageRgb8(_) => img,
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        })
    }
}

// ============================================================================
// Resize
// ============================================================================

/// Resizes an image to exactly `width` x `height`, ignoring aspect ratio,
/// so every item image in a batch has the same shape.
///
/// # Filter Types
/// - `Nearest`: Nearest neighbour, fastest
/// - `Triangle`: Bilinear
/// - `CatmullRom`: Bicubic (the loader default)
/// - `Gaussian`: Blurring/smoothing
/// - `Lanczos3`: Highest quality, slowest
///
/// # Examples
/// ```ignore
/// let resize = Resize::new(224, 224, FilterType::CatmullRom)?;
/// let resized = resize.apply(img)?;
/// ```
#[derive(Debug, Clone)]
pub struct Resize {
    width: u32,
    height: u32,
    filter: FilterType,
}

impl Resize {
    pub fn new(width: u32, height: u32, filter: FilterType) -> Result<Self> {
        ensure!(
            width > 0 && height > 0,
            "Image dimensions must be positive after resizing (got {}x{})",
            width,
            height
        );
        Ok(Self {
            width,
            height,
            filter,
        })
    }
}

impl Transform<DynamicImage, DynamicImage> for Resize {
    fn apply(&self, img: DynamicImage) -> Result<DynamicImage> {
        if img.width() == self.width && img.height() == self.height {
            return Ok(img);
        }
        Ok(img.resize_exact(self.width, self.height, self.filter))
    }
}
