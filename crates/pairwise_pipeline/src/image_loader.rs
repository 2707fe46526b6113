//! Item image loading.
//!
//! An item's image lives at `<root>/<item>.<ext>`. Loading reads and decodes
//! it, converts to RGB, resizes to the configured size and normalizes pixels
//! to `(v - 127.5) / 127.5`. A file that is missing or cannot be decoded is
//! not fatal: a warning is logged and a black canvas stands in for it, so the
//! caller always receives an array of the configured shape.

use crate::error::PipelineError;
use crate::interactions::ItemId;
use crate::transforms::vision::{EnsureRgb, LoadImage, Normalize, Resize, ToArray};
use crate::transforms::{Chain, Transform};
use anyhow::Result;
use image::{imageops::FilterType, DynamicImage};
use ndarray::Array3;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Extension of item image files unless overridden.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Per-channel mean and std: 8-bit pixels normalize to `(v - 127.5) / 127.5`.
const PIXEL_CENTRE: f32 = 127.5;

/// Pixel value every channel of a substitute (black) image normalizes to.
const BLANK_VALUE: f32 = -1.0;

type PreparePipeline = Chain<
    Chain<Chain<EnsureRgb, Resize, DynamicImage>, ToArray, DynamicImage>,
    Normalize,
    Array3<f32>,
>;

/// A loaded item image: `(height, width, 3)` normalized pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSample {
    pub item: ItemId,
    pub pixels: Array3<f32>,
}

/// Stateless loader configured with an image root and a target size.
///
/// Holds no mutable state, so one instance is shared (via `Arc`) by every
/// loading worker.
///
/// # Example
/// ```ignore
/// let loader = ImageLoader::new("data/images", 224, 224)?
///     .with_extension("png");
/// let sample = loader.load_single(17);
/// assert_eq!(sample.pixels.dim(), (224, 224, 3));
/// ```
#[derive(Debug)]
pub struct ImageLoader {
    root: PathBuf,
    extension: String,
    width: u32,
    height: u32,
    filter: FilterType,
    reader: LoadImage,
    prepare: PreparePipeline,
}

impl ImageLoader {
    /// Creates a loader producing `width` x `height` images.
    ///
    /// # Errors
    /// `PipelineError::Configuration` if either dimension is zero.
    pub fn new(root: impl Into<PathBuf>, width: u32, height: u32) -> Result<Self> {
        Self::build(root.into(), DEFAULT_EXTENSION.to_string(), width, height, FilterType::CatmullRom)
    }

    /// Uses `<root>/<item>.<extension>` instead of the `.jpg` default.
    /// A leading dot is ignored.
    pub fn with_extension(mut self, extension: impl AsRef<str>) -> Self {
        self.extension = extension.as_ref().trim_start_matches('.').to_string();
        self
    }

    /// Chooses the resampling filter.
    pub fn with_filter(self, filter: FilterType) -> Result<Self> {
        Self::build(self.root, self.extension, self.width, self.height, filter)
    }

    fn build(
        root: PathBuf,
        extension: String,
        width: u32,
        height: u32,
        filter: FilterType,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::config(format!(
                "image size must be positive, but got {}x{}",
                width, height
            ))
            .into());
        }

        let prepare = EnsureRgb
            .then(Resize::new(width, height, filter)?)
            .then(ToArray)
            .then(Normalize::new(&[PIXEL_CENTRE; 3], &[PIXEL_CENTRE; 3])?);

        Ok(Self {
            root,
            extension,
            width,
            height,
            filter,
            reader: LoadImage::new(),
            prepare,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `(width, height)` of every produced image.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }

    /// Location of `item`'s image file.
    pub fn path_for(&self, item: ItemId) -> PathBuf {
        self.root.join(format!("{}.{}", item, self.extension))
    }

    /// Loads and normalizes `item`'s image.
    ///
    /// Never fails: read or decode problems are logged at `warn` and a black
    /// canvas is used instead.
    pub fn load_single(&self, item: ItemId) -> ImageSample {
        let path = self.path_for(item);

        let decoded = match self.reader.apply(path.clone()) {
            Ok(image) => image,
            Err(err) => {
                warn!(
                    item,
                    path = %path.display(),
                    error = %format!("{:#}", err),
                    "image was not loaded correctly, using a blank image"
                );
                DynamicImage::new_rgb8(self.width, self.height)
            }
        };

        let pixels = match self.prepare.apply(decoded) {
            Ok(pixels) => pixels,
            Err(err) => {
                warn!(
                    item,
                    path = %path.display(),
                    error = %format!("{:#}", err),
                    "image preparation failed, using a blank image"
                );
                self.blank()
            }
        };

        ImageSample { item, pixels }
    }

    /// Loads the positive and negative images of a triple. Each side is
    /// handled independently; a broken file on one side does not affect the
    /// other.
    pub fn load_pair(&self, positive: ItemId, negative: ItemId) -> (ImageSample, ImageSample) {
        (self.load_single(positive), self.load_single(negative))
    }

    fn blank(&self) -> Array3<f32> {
        Array3::from_elem((self.height as usize, self.width as usize, 3), BLANK_VALUE)
    }
}

impl Transform<ItemId, ImageSample> for ImageLoader {
    fn apply(&self, item: ItemId) -> Result<ImageSample> {
        Ok(self.load_single(item))
    }
}

/// Evaluation-time image lookup.
///
/// Exposes only single-item loading, with the same decode and normalization
/// as the training stream, for scoring items outside the sampling loop.
#[derive(Debug)]
pub struct ImageAccessor {
    loader: ImageLoader,
}

impl ImageAccessor {
    pub fn new(loader: ImageLoader) -> Self {
        Self { loader }
    }

    /// Returns `(item, pixels)` for one item.
    pub fn load_single(&self, item: ItemId) -> ImageSample {
        self.loader.load_single(item)
    }
}

impl From<ImageLoader> for ImageAccessor {
    fn from(loader: ImageLoader) -> Self {
        Self::new(loader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    fn in_range(sample: &ImageSample) -> bool {
        sample.pixels.iter().all(|v| (-1.0..=1.0).contains(v))
    }

    #[test]
    fn test_load_single_resizes_and_normalizes() -> Result<()> {
        let dir = TempDir::new()?;
        let img = RgbImage::from_pixel(10, 6, Rgb([255, 0, 128]));
        img.save_with_format(dir.path().join("3.jpg"), image::ImageFormat::Png)?;

        let loader = ImageLoader::new(dir.path(), 4, 5)?.with_filter(FilterType::Nearest)?;
        let sample = loader.load_single(3);

        assert_eq!(sample.item, 3);
        assert_eq!(sample.pixels.dim(), (5, 4, 3));
        assert!(in_range(&sample));
        assert_eq!(sample.pixels[[0, 0, 0]], 1.0);
        assert_eq!(sample.pixels[[0, 0, 1]], -1.0);
        assert!((sample.pixels[[4, 3, 2]] - 0.5 / 127.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_grey_image_becomes_three_channels() -> Result<()> {
        let dir = TempDir::new()?;
        GrayImage::from_pixel(2, 2, Luma([0]))
            .save_with_format(dir.path().join("8.png"), image::ImageFormat::Png)?;

        let loader = ImageLoader::new(dir.path(), 2, 2)?.with_extension(".png");
        let sample = loader.load_single(8);
        assert_eq!(sample.pixels.dim(), (2, 2, 3));
        assert!(sample.pixels.iter().all(|v| *v == -1.0));
        Ok(())
    }

    #[test]
    fn test_unreadable_image_falls_back_to_blank() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("1.jpg"), b"\xff\xd8 truncated")?;

        let loader = ImageLoader::new(dir.path(), 3, 3)?;
        for item in [1, 2] {
            // 1 is corrupt, 2 does not exist.
            let sample = loader.load_single(item);
            assert_eq!(sample.pixels.dim(), (3, 3, 3));
            assert!(sample.pixels.iter().all(|v| *v == BLANK_VALUE));
        }
        Ok(())
    }

    #[test]
    fn test_load_pair_sides_are_independent() -> Result<()> {
        let dir = TempDir::new()?;
        RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]))
            .save_with_format(dir.path().join("5.jpg"), image::ImageFormat::Png)?;

        let loader = ImageLoader::new(dir.path(), 2, 2)?;
        let (pos, neg) = loader.load_pair(5, 6);
        assert_eq!(pos.item, 5);
        assert_eq!(neg.item, 6);
        assert!(pos.pixels.iter().all(|v| *v == 1.0));
        assert!(neg.pixels.iter().all(|v| *v == BLANK_VALUE));
        Ok(())
    }

    #[test]
    fn test_paths_and_configuration() -> Result<()> {
        let loader = ImageLoader::new("/data/images", 8, 8)?;
        assert_eq!(loader.path_for(42), PathBuf::from("/data/images/42.jpg"));
        assert_eq!(loader.size(), (8, 8));

        let err = ImageLoader::new("/data/images", 0, 8).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Configuration(_))
        ));
        Ok(())
    }

    #[test]
    fn test_accessor_matches_loader() -> Result<()> {
        let dir = TempDir::new()?;
        RgbImage::from_pixel(3, 3, Rgb([10, 20, 30]))
            .save_with_format(dir.path().join("0.jpg"), image::ImageFormat::Png)?;

        let expected = ImageLoader::new(dir.path(), 2, 2)?.load_single(0);
        let accessor = ImageAccessor::from(ImageLoader::new(dir.path(), 2, 2)?);
        assert_eq!(accessor.load_single(0), expected);
        Ok(())
    }
}
