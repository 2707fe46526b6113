#![allow(dead_code)]

use anyhow::Result;
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array3;
use pairwise_pipeline::{ImageLoader, ItemId};
use std::path::Path;
use tempfile::TempDir;

/// Side length of the test images.
pub const SIZE: u32 = 4;

/// Installs a test-friendly subscriber once; `RUST_LOG=debug` shows pipeline logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Red channel value that identifies `item` in its image.
fn marker(item: ItemId) -> u8 {
    (item * 10 % 250) as u8 + 5
}

/// Writes one uniformly coloured PNG per item, coloured by item id.
pub fn write_item_images(dir: &Path, items: impl IntoIterator<Item = ItemId>) -> Result<()> {
    for item in items {
        RgbImage::from_pixel(SIZE, SIZE, Rgb([marker(item), 0, 255]))
            .save_with_format(dir.join(format!("{}.png", item)), ImageFormat::Png)?;
    }
    Ok(())
}

/// Overwrites `item`'s image with a `side` x `side` one, so loading it takes
/// far longer than loading the others.
pub fn write_slow_image(dir: &Path, item: ItemId, side: u32) -> Result<()> {
    RgbImage::from_fn(side, side, |x, y| Rgb([marker(item), (x % 251) as u8, (y % 241) as u8]))
        .save_with_format(dir.join(format!("{}.png", item)), ImageFormat::Png)?;
    Ok(())
}

/// A temp dir holding images for `items` plus a loader reading them.
pub fn image_fixture(items: impl IntoIterator<Item = ItemId>) -> Result<(TempDir, ImageLoader)> {
    let dir = TempDir::new()?;
    write_item_images(dir.path(), items)?;
    let loader = ImageLoader::new(dir.path(), SIZE, SIZE)?.with_extension("png");
    Ok((dir, loader))
}

/// Checks that `pixels` is the normalized image written for `item`.
pub fn depicts(pixels: &Array3<f32>, item: ItemId) -> bool {
    let expected_red = (marker(item) as f32 - 127.5) / 127.5;
    pixels.dim() == (SIZE as usize, SIZE as usize, 3)
        && (pixels[[0, 0, 0]] - expected_red).abs() < 1e-5
        && pixels[[SIZE as usize - 1, SIZE as usize - 1, 2]] == 1.0
}

/// True when every value is within the normalized range.
pub fn in_unit_range(pixels: &Array3<f32>) -> bool {
    pixels.iter().all(|v| (-1.0..=1.0).contains(v))
}
