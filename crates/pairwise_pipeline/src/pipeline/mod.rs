//! src/pipeline/mod.rs
//!
//! The streaming pipeline that turns an interaction history into batches of
//! pairwise training records.
//!
//! # Architecture Overview
//!
//! ```text
//!               ┌──────────────────┐
//!               │ InteractionIndex │ (immutable, shared)
//!               └────────┬─────────┘
//!                        ↓
//!               ┌──────────────────┐
//!               │  TripleSampler   │ (seeded, bounded, sequential)
//!               └────────┬─────────┘
//!                        │ (seq, user, positive, negative)
//!                        ↓  bounded task channel
//!                 [Loader Workers]  (ImageLoader::load_pair, any order)
//!                        │
//!                        ↓  bounded output channel
//!               ┌──────────────────┐
//!               │     Batcher      │ (reorder by seq, group batch_size)
//!               └────────┬─────────┘
//!                        ↓  prefetch channel (prefetch_batches deep)
//!                    BatchStream ──→ training loop
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/pipeline/
//! ├── mod.rs        # Public API exports + architecture docs
//! ├── config.rs     # PipelineConfig, builder, and validation
//! ├── stream.rs     # StreamPipeline constructors and run entry points
//! ├── iterator.rs   # BatchStream (inline and parallel variants)
//! ├── reorder.rs    # Sequence-ordered reassembly
//! ├── workers/
//! │   ├── mod.rs    # Load task protocol and worker body
//! │   └── pool.rs   # Generic `WorkerPool<Task, Output>`
//! └── common/
//!     ├── mod.rs
//!     └── thread.rs # Thread-local worker ID
//! ```
//!
//! # Example Usage
//! ```ignore
//! let index = InteractionIndex::new(history)?;
//! let loader = ImageLoader::new("data/images", 224, 224)?;
//! let config = PipelineConfig::builder()
//!     .batch_size(32)
//!     .events_per_epoch(10_000)
//!     .epochs(5)
//!     .num_workers(8)
//!     .build();
//!
//! let pipeline = StreamPipeline::new(index, loader, config)?;
//! for batch in pipeline.stream()? {
//!     let batch = batch?;
//!     assert_eq!(batch.len(), 32);
//! }
//! ```
//!
//! # Memory Usage
//! - Inline (`num_workers = 0`): one batch of records.
//! - Parallel: up to `2 x num_workers x prefetch_batches x batch_size` records
//!   in the channels plus `prefetch_batches` finished batches.

mod common;
mod config;
mod iterator;
mod reorder;
mod stream;
mod workers;

pub use common::thread::{current_worker_id, WORKER_ID};
pub use config::{default_num_workers, PipelineConfig, PipelineConfigBuilder, DEFAULT_SEED};
pub use iterator::BatchStream;
pub use stream::StreamPipeline;
