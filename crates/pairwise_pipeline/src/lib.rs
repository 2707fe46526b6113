//! Pairwise visual training streams.
//!
//! Samples `(user, positive item, negative item)` triples from an
//! interaction history, loads and normalizes both items' images in parallel,
//! and delivers them in fixed-size, prefetched batches.

pub mod batch;
pub mod error;
pub mod image_loader;
pub mod interactions;
pub mod pipeline;
pub mod sampler;
pub mod transforms;

pub use batch::{Batch, StackedBatch, TrainingRecord};
pub use error::PipelineError;
pub use image_loader::{ImageAccessor, ImageLoader, ImageSample};
pub use interactions::{InteractionIndex, ItemId, UserId};
pub use pipeline::{BatchStream, PipelineConfig, StreamPipeline};
pub use sampler::{total_triples, Triple, TripleSampler};
