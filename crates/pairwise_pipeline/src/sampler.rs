use crate::error::PipelineError;
use crate::interactions::{InteractionIndex, ItemId, UserId};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

/// How many users a single draw may try before giving up because every
/// candidate had interacted with the whole item universe.
pub const DEFAULT_MAX_USER_RETRIES: usize = 64;

/// A `(user, positive, negative)` draw for pairwise ranking.
///
/// `positive` is in the user's observed set, `negative` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triple {
    pub user: UserId,
    pub positive: ItemId,
    pub negative: ItemId,
}

/// Number of triples a whole run emits:
/// `epochs * floor(events_per_epoch / batch_size) * batch_size`.
///
/// The count is computed once over the run. It is always a multiple of
/// `batch_size`, so batching never leaves a partial tail. `None` when the
/// product does not fit in `usize`.
pub fn total_triples(events_per_epoch: usize, batch_size: usize, epochs: usize) -> Option<usize> {
    if batch_size == 0 {
        return Some(0);
    }
    (events_per_epoch / batch_size)
        .checked_mul(batch_size)?
        .checked_mul(epochs)
}

/// ============================================================================
/// Bounded, seeded generator of pairwise training triples.
///
/// # Arguments:
/// - `index`: Shared interaction index. Read-only for the sampler's lifetime.
/// - `events_per_epoch`: Draws attributed to each epoch.
/// - `batch_size`: Downstream batch size; the run total is truncated to a multiple of it.
/// - `epochs`: Number of epochs in the run.
/// - `rng`: Caller-owned random source. The sampler never touches global RNG state.
///
/// # Termination
/// Draws are handed out epoch by epoch, `events_per_epoch` at a time, and the
/// iterator stops the moment [`total_triples`] have been produced. Because the
/// bound is global, truncation happens in the last epoch(s): with
/// `events_per_epoch = 5`, `batch_size = 3` and `epochs = 2` the run yields
/// 6 triples, 5 attributed to epoch 0 and 1 to epoch 1.
///
/// # Per-draw procedure
/// 1. Draw a user uniformly.
/// 2. If the user has interacted with every item, draw another user, at most
///    `max_retries` times in total, then fail with
///    [`PipelineError::NoEligibleNegative`].
/// 3. Draw the positive uniformly from the user's observed items.
/// 4. Draw the negative uniformly from the item universe, rejecting observed items.
///
/// Sampling is with replacement: the same triple may recur.
///
/// # Example
/// ```ignore
/// let index = Arc::new(InteractionIndex::new(history)?);
/// let sampler = TripleSampler::from_seed(index, 4, 2, 1, 42)?;
/// for triple in sampler {
///     let triple = triple?;
/// }
/// ```
#[derive(Debug)]
pub struct TripleSampler {
    index: Arc<InteractionIndex>,
    rng: StdRng,
    events_per_epoch: usize,
    max_retries: usize,
    total: usize,
    emitted: usize,
    epoch: usize,
    drawn_in_epoch: usize,
    failed: bool,
}

impl TripleSampler {
    pub fn new(
        index: Arc<InteractionIndex>,
        events_per_epoch: usize,
        batch_size: usize,
        epochs: usize,
        rng: StdRng,
    ) -> Result<Self> {
        for (name, value) in [
            ("events_per_epoch", events_per_epoch),
            ("batch_size", batch_size),
            ("epochs", epochs),
        ] {
            if value == 0 {
                return Err(PipelineError::config(format!(
                    "{} must be a positive integer, but got {}",
                    name, value
                ))
                .into());
            }
        }

        let total = total_triples(events_per_epoch, batch_size, epochs).ok_or_else(|| {
            PipelineError::config(format!(
                "a run of {} epochs x {} events overflows the triple count",
                epochs, events_per_epoch
            ))
        })?;

        Ok(Self {
            index,
            rng,
            events_per_epoch,
            max_retries: DEFAULT_MAX_USER_RETRIES,
            total,
            emitted: 0,
            epoch: 0,
            drawn_in_epoch: 0,
            failed: false,
        })
    }

    /// Same as [`TripleSampler::new`] with a `StdRng` seeded from `seed`.
    pub fn from_seed(
        index: Arc<InteractionIndex>,
        events_per_epoch: usize,
        batch_size: usize,
        epochs: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::new(
            index,
            events_per_epoch,
            batch_size,
            epochs,
            StdRng::seed_from_u64(seed),
        )
    }

    /// Overrides the number of users a single draw may try.
    pub fn with_max_retries(mut self, max_retries: usize) -> Result<Self> {
        if max_retries == 0 {
            return Err(PipelineError::config("max_retries must be greater than 0").into());
        }
        self.max_retries = max_retries;
        Ok(self)
    }

    /// Total triples this run will emit.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Triples emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn remaining(&self) -> usize {
        if self.failed {
            0
        } else {
            self.total - self.emitted
        }
    }

    /// Epoch the most recent draw was attributed to.
    pub fn current_epoch(&self) -> usize {
        self.epoch
    }

    /// Performs one draw without touching the run counters.
    fn draw(&mut self) -> Result<Triple, PipelineError> {
        let users = self.index.users();
        let items = self.index.items();

        for _ in 0..self.max_retries {
            let user = users[self.rng.random_range(0..users.len())];
            if self.index.is_saturated(user) {
                continue;
            }

            // Unknown users cannot appear: `users` comes from the same index.
            let observed = self.index.observed(user).unwrap_or_default();
            let positive = observed[self.rng.random_range(0..observed.len())];

            // Terminates: the user is not saturated, so some item is unobserved.
            let negative = loop {
                let candidate = items[self.rng.random_range(0..items.len())];
                if !self.index.contains(user, candidate) {
                    break candidate;
                }
            };

            return Ok(Triple {
                user,
                positive,
                negative,
            });
        }

        Err(PipelineError::NoEligibleNegative {
            attempts: self.max_retries,
        })
    }
}

impl Iterator for TripleSampler {
    type Item = Result<Triple, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.emitted >= self.total {
            return None;
        }

        if self.drawn_in_epoch == self.events_per_epoch {
            self.epoch += 1;
            self.drawn_in_epoch = 0;
        }

        match self.draw() {
            Ok(triple) => {
                self.emitted += 1;
                self.drawn_in_epoch += 1;
                Some(Ok(triple))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}
