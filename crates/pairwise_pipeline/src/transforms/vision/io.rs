use crate::transforms::Transform;
use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;

// ============================================================================
// LoadImage
// ============================================================================

/// Reads an image file and decodes it.
///
/// The format is guessed from the file contents, not the extension, so an
/// item stored as PNG under a `.jpg` name still decodes.
///
/// # Input/Output
/// - **Input**: `PathBuf` - file path to the image
/// - **Output**: `DynamicImage` - decoded image in its native colour type
///
/// # Errors
/// Missing files, read failures and undecodable contents are returned as
/// errors with the path attached. The item loader turns these into
/// warnings and a best-effort image.
///
/// # Example
/// ```ignore
/// let loader = LoadImage::new();
/// let image = loader.apply(PathBuf::from("images/17.jpg"))?;
/// ```
#[derive(Debug, Clone)]
pub struct LoadImage {
    buffer_size: usize,
}

impl LoadImage {
    /// Creates a loader with an 8KB read buffer.
    pub fn new() -> Self {
        Self { buffer_size: 8192 }
    }

    fn read_bytes(&self, path: &PathBuf) -> Result<Vec<u8>> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open image: {}", path.display()))?;

        let file_size = file.metadata().map(|m| m.len() as usize).unwrap_or(0);
        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut buffer = Vec::with_capacity(file_size);
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        Ok(buffer)
    }
}

impl Default for LoadImage {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform<PathBuf, DynamicImage> for LoadImage {
    fn apply(&self, path: PathBuf) -> Result<DynamicImage> {
        let buffer = self.read_bytes(&path)?;

        ImageReader::new(Cursor::new(buffer))
            .with_guessed_format()
            .with_context(|| format!("Failed to detect image format: {}", path.display()))?
            .decode()
            .with_context(|| format!("Failed to decode image: {}", path.display()))
    }
}
