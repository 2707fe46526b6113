//! src/pipeline/config.rs
//!
//! Configuration for a pairwise sampling run.
//!
//! Example:
//! ```ignore
//! let config = PipelineConfig::builder()
//!     .batch_size(64)
//!     .events_per_epoch(100_000)
//!     .epochs(10)
//!     .seed(42)
//!     .num_workers(8)
//!     .prefetch_batches(4)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `num_workers`: image decoding is the expensive stage; more workers raise
//!                  throughput until I/O or cores saturate.
//! - `prefetch_batches`: batches buffered ahead of the consumer. Memory grows
//!                  with `prefetch_batches x batch_size x 2` images.

use crate::error::PipelineError;
use crate::sampler::{total_triples, DEFAULT_MAX_USER_RETRIES};
use anyhow::Result;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 42;

/// Configuration for [`StreamPipeline`](super::StreamPipeline). Fixed for the
/// lifetime of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Records per batch.
    pub batch_size: usize,
    /// Draws attributed to each epoch.
    pub events_per_epoch: usize,
    /// Number of epochs in one run.
    pub epochs: usize,
    /// Seed of the sampler's random source for `StreamPipeline::stream`.
    pub seed: u64,
    /// Image loading threads (0 = load inline on the consuming thread).
    pub num_workers: usize,
    /// Number of complete batches buffered ahead of the consumer
    /// (must be > 0 when using workers).
    pub prefetch_batches: usize,
    /// Users a single draw may try before reporting that no negative exists.
    pub max_user_retries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            events_per_epoch: 0,
            epochs: 1,
            seed: DEFAULT_SEED,
            num_workers: default_num_workers(),
            prefetch_batches: 2,
            max_user_retries: DEFAULT_MAX_USER_RETRIES,
        }
    }
}

/// One worker per available hardware thread.
pub fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Triples (and records) one run produces. 0 when the counts overflow,
    /// which `validate()` rejects.
    pub fn triples_per_run(&self) -> usize {
        total_triples(self.events_per_epoch, self.batch_size, self.epochs).unwrap_or(0)
    }

    /// Slots in each worker channel, and the most draws that may be sampled
    /// ahead of the oldest record not yet batched:
    /// `num_workers x prefetch_batches x batch_size`.
    pub(crate) fn in_flight_limit(&self) -> Option<usize> {
        self.num_workers
            .checked_mul(self.prefetch_batches)?
            .checked_mul(self.batch_size)
    }

    /// Batches one run produces.
    pub fn batches_per_run(&self) -> usize {
        if self.batch_size == 0 {
            0
        } else {
            self.triples_per_run() / self.batch_size
        }
    }

    /// Checks every count.
    ///
    /// # Errors
    /// `PipelineError::Configuration` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("events_per_epoch", self.events_per_epoch),
            ("epochs", self.epochs),
            ("max_user_retries", self.max_user_retries),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(PipelineError::config(format!(
                    "{} must be greater than 0",
                    name
                ))
                .into());
            }
        }

        if self.num_workers > 0 && self.prefetch_batches == 0 {
            return Err(PipelineError::config(format!(
                "prefetch_batches must be > 0 when using {} workers",
                self.num_workers
            ))
            .into());
        }

        if total_triples(self.events_per_epoch, self.batch_size, self.epochs).is_none() {
            return Err(PipelineError::config(format!(
                "{} epochs x {} events_per_epoch overflows the triple count",
                self.epochs, self.events_per_epoch
            ))
            .into());
        }

        if self.in_flight_limit().is_none() {
            return Err(PipelineError::config(format!(
                "{} workers x {} prefetch_batches x {} batch_size overflows the channel capacity",
                self.num_workers, self.prefetch_batches, self.batch_size
            ))
            .into());
        }
        Ok(())
    }
}

/// Builder for PipelineConfig with method chaining
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn events_per_epoch(mut self, events: usize) -> Self {
        self.config.events_per_epoch = events;
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = epochs;
        self
    }

    /// Set the seed of the sampler's random source.
    ///
    /// The same seed, history and counts reproduce the same sequence of
    /// triples, and therefore the same batches, regardless of `num_workers`.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Higher values smooth out slow image reads but hold more decoded
    /// images in memory.
    pub fn prefetch_batches(mut self, batches: usize) -> Self {
        self.config.prefetch_batches = batches;
        self
    }

    pub fn max_user_retries(mut self, retries: usize) -> Self {
        self.config.max_user_retries = retries;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let config = PipelineConfig::builder()
            .batch_size(3)
            .events_per_epoch(5)
            .epochs(2)
            .seed(7)
            .num_workers(0)
            .prefetch_batches(4)
            .max_user_retries(9)
            .build();

        assert_eq!(config.batch_size, 3);
        assert_eq!(config.seed, 7);
        assert_eq!(config.num_workers, 0);
        assert_eq!(config.max_user_retries, 9);
        assert_eq!(config.triples_per_run(), 6);
        assert_eq!(config.batches_per_run(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.prefetch_batches, 2);
        assert!(config.num_workers >= 1);
        // events_per_epoch has no sensible default and must be set.
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let base = PipelineConfig::builder()
            .batch_size(2)
            .events_per_epoch(4)
            .epochs(1);

        let cases = [
            base_with(|b| b.batch_size(0)),
            base_with(|b| b.events_per_epoch(0)),
            base_with(|b| b.epochs(0)),
            base_with(|b| b.max_user_retries(0)),
            base_with(|b| b.num_workers(2).prefetch_batches(0)),
        ];
        for config in cases {
            let err = config.validate().unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::Configuration(_))
            ));
        }

        // No workers: prefetch depth is irrelevant.
        let inline = base.num_workers(0).prefetch_batches(0).build();
        assert!(inline.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overflowing_products() {
        let cases = [
            base_with(|b| b.events_per_epoch(usize::MAX).batch_size(1).epochs(2)),
            base_with(|b| b.num_workers(usize::MAX / 2).prefetch_batches(4)),
        ];
        for config in cases {
            let err = config.validate().unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::Configuration(msg)) if msg.contains("overflows")
            ));
        }
    }

    #[test]
    fn test_in_flight_limit() {
        let config = base_with(|b| b.num_workers(3).prefetch_batches(2));
        assert_eq!(config.in_flight_limit(), Some(12));
    }

    fn base_with(f: impl FnOnce(PipelineConfigBuilder) -> PipelineConfigBuilder) -> PipelineConfig {
        f(PipelineConfig::builder()
            .batch_size(2)
            .events_per_epoch(4)
            .epochs(1))
        .build()
    }
}
