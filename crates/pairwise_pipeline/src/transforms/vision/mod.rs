//! src/transforms/vision/mod.rs
//!
//! Image preparation steps used by the item image loader.
//!
//! ```text
//! transforms/vision/
//! ├── io.rs           → File reading and decoding
//! ├── geometric.rs    → RGB conversion and exact resizing
//! ├── conversion.rs   → Image → HWC float array
//! └── photometric.rs  → Per-channel normalization
//! ```
//!
//! ```ignore
//! use crate::transforms::Transform;
//! use crate::transforms::vision::{EnsureRgb, Normalize, Resize, ToArray};
//! use image::imageops::FilterType;
//!
//! let pipeline = EnsureRgb
//!     .then(Resize::new(224, 224, FilterType::CatmullRom)?)
//!     .then(ToArray)
//!     .then(Normalize::new(&[127.5; 3], &[127.5; 3])?);
//! ```

pub mod conversion;
pub mod geometric;
pub mod io;
pub mod photometric;

pub use conversion::ToArray;
pub use geometric::{EnsureRgb, Resize};
pub use io::LoadImage;
pub use photometric::Normalize;
