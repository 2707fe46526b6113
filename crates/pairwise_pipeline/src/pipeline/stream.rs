//! src/pipeline/stream.rs
//!
//! `StreamPipeline`: the entry point tying an interaction index, an image
//! loader and a configuration together.
//!
//! # Seed Coordination
//!
//! `stream()` seeds a fresh `StdRng` from `config.seed` on every call, so
//! each call replays the same run. To drive the sampler from your own random
//! source instead, use `stream_with_rng()`:
//!
//! ```ignore
//! let pipeline = StreamPipeline::new(index, loader, config)?;
//! for batch in pipeline.stream_with_rng(StdRng::seed_from_u64(7))? {
//!     let stacked = batch?.stack()?;
//!     // train_step(stacked)
//! }
//! ```

use crate::image_loader::ImageLoader;
use crate::interactions::InteractionIndex;
use crate::sampler::TripleSampler;
use anyhow::{Context, Result};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;
use tracing::warn;

use super::config::PipelineConfig;
use super::iterator::BatchStream;

/// Pairwise training stream over a fixed interaction history.
///
/// Sampling runs sequentially on a single producer; image loading runs on
/// `config.num_workers` threads; records are put back in generation order,
/// grouped into batches of `config.batch_size` and buffered
/// `config.prefetch_batches` deep ahead of the consumer.
///
/// # Thread safety
/// `StreamPipeline` is `Send + Sync`; each `BatchStream` it hands out is an
/// independent run with its own sampler and threads.
#[derive(Debug)]
pub struct StreamPipeline {
    index: Arc<InteractionIndex>,
    loader: Arc<ImageLoader>,
    config: PipelineConfig,
}

impl StreamPipeline {
    /// # Errors
    /// `PipelineError::Configuration` for any invalid count in `config`.
    /// Index and loader problems are caught by their own constructors.
    pub fn new(
        index: impl Into<Arc<InteractionIndex>>,
        loader: impl Into<Arc<ImageLoader>>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate().context("Invalid pipeline configuration")?;

        if config.triples_per_run() == 0 {
            warn!(
                events_per_epoch = config.events_per_epoch,
                batch_size = config.batch_size,
                "events_per_epoch is smaller than batch_size; runs will yield no batches"
            );
        }

        Ok(Self {
            index: index.into(),
            loader: loader.into(),
            config,
        })
    }

    /// Starts a run seeded from `config.seed`.
    pub fn stream(&self) -> Result<BatchStream> {
        self.stream_with_rng(StdRng::seed_from_u64(self.config.seed))
    }

    /// Starts a run drawing from `rng`.
    pub fn stream_with_rng(&self, rng: StdRng) -> Result<BatchStream> {
        let sampler = self.sampler_with_rng(rng)?;
        BatchStream::new(sampler, self.loader.clone(), &self.config)
    }

    /// The triple sampler a `stream()` run would use, without image loading.
    pub fn sampler(&self) -> Result<TripleSampler> {
        self.sampler_with_rng(StdRng::seed_from_u64(self.config.seed))
    }

    fn sampler_with_rng(&self, rng: StdRng) -> Result<TripleSampler> {
        TripleSampler::new(
            self.index.clone(),
            self.config.events_per_epoch,
            self.config.batch_size,
            self.config.epochs,
            rng,
        )?
        .with_max_retries(self.config.max_user_retries)
    }

    pub fn index(&self) -> &InteractionIndex {
        &self.index
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn batches_per_run(&self) -> usize {
        self.config.batches_per_run()
    }
}
