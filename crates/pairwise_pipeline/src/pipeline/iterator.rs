//! src/pipeline/iterator.rs
//!
//! The batch stream returned by `StreamPipeline::stream()`.
//!
//! # Iterator Variants
//! - `Inline` (`num_workers = 0`): sample, load and batch on the consuming
//!   thread inside `next()`.
//! - `Parallel` (`num_workers > 0`): three stages on their own threads,
//!   joined by bounded channels:
//!
//! ```text
//!  sampler thread ──tasks──▶ loader workers ──records──▶ batcher thread ──batches──▶ next()
//!   (seq-tagged)    bounded    (any order)     bounded   (reorder+group)  prefetch
//!        ▲                                                    │
//!        └──────────────────── permits ◀──────────────────────┘
//! ```
//!
//! The sampler takes a permit before each draw and the batcher hands one
//! back for every record it releases in order. A slow load therefore stalls
//! sampling once `num_workers x prefetch_batches x batch_size` draws are
//! outstanding, instead of piling later records up in the reorder buffer.
//!
//! Both variants produce identical batches for the same sampler seed.

use crate::batch::Batch;
use crate::error::PipelineError;
use crate::image_loader::ImageLoader;
use crate::sampler::TripleSampler;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::config::PipelineConfig;
use super::reorder::ReorderBuffer;
use super::workers::pool::WorkerPool;
use super::workers::{load_record, spawn_loader_pool, LoadOutput, LoadTask};

/// Single-pass stream of fixed-size batches.
///
/// Yields `Ok(batch)` with exactly `batch_size` records until the run's
/// bound is reached. If sampling runs out of eligible users, the batches
/// generated before the failure are delivered, then one `Err` carrying
/// [`PipelineError::NoEligibleNegative`], then `None`. A partial batch is
/// never yielded.
///
/// Dropping the stream cancels the run: in-flight loads are discarded and
/// every pipeline thread is joined.
pub struct BatchStream {
    inner: IteratorImpl,
    batches_per_run: usize,
}

enum IteratorImpl {
    Inline {
        sampler: TripleSampler,
        loader: Arc<ImageLoader>,
        batch_size: usize,
    },
    Parallel(ParallelStages),
}

struct ParallelStages {
    batch_rx: Option<Receiver<Result<Batch>>>,
    // Observation only; the batcher never blocks on permits.
    permits: Sender<()>,
    in_flight_limit: usize,
    sampler_thread: Option<JoinHandle<()>>,
    batcher_thread: Option<JoinHandle<()>>,
    // Dropped after `Drop::drop` runs, so workers are joined last.
    pool: WorkerPool<LoadTask, LoadOutput>,
    shutdown: Arc<AtomicBool>,
}

impl BatchStream {
    pub(crate) fn new(
        sampler: TripleSampler,
        loader: Arc<ImageLoader>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let batch_size = config.batch_size;
        let batches_per_run = sampler.total() / batch_size;

        info!(
            triples = sampler.total(),
            batches = batches_per_run,
            batch_size,
            workers = config.num_workers,
            "starting pairwise batch stream"
        );

        let inner = if config.num_workers == 0 {
            IteratorImpl::Inline {
                sampler,
                loader,
                batch_size,
            }
        } else {
            IteratorImpl::Parallel(ParallelStages::spawn(sampler, loader, config)?)
        };

        Ok(Self {
            inner,
            batches_per_run,
        })
    }

    /// Batches a complete run yields.
    pub fn batches_per_run(&self) -> usize {
        self.batches_per_run
    }

    /// Batches already loaded and waiting in the prefetch buffer.
    /// Always 0 for inline streams.
    pub fn queued_batches(&self) -> usize {
        match &self.inner {
            IteratorImpl::Inline { .. } => 0,
            IteratorImpl::Parallel(stages) => stages.batch_rx.as_ref().map_or(0, |rx| rx.len()),
        }
    }

    /// Draws sampled but not yet released in order to the batcher.
    /// Always 0 for inline streams.
    pub fn draws_in_flight(&self) -> usize {
        match &self.inner {
            IteratorImpl::Inline { .. } => 0,
            IteratorImpl::Parallel(stages) => stages.permits.len(),
        }
    }

    /// Upper bound on [`draws_in_flight`](Self::draws_in_flight).
    pub fn in_flight_limit(&self) -> usize {
        match &self.inner {
            IteratorImpl::Inline { .. } => 0,
            IteratorImpl::Parallel(stages) => stages.in_flight_limit,
        }
    }

    /// Loader threads behind this stream (0 for inline streams).
    pub fn num_workers(&self) -> usize {
        match &self.inner {
            IteratorImpl::Inline { .. } => 0,
            IteratorImpl::Parallel(stages) => stages.pool.num_workers(),
        }
    }
}

impl Iterator for BatchStream {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IteratorImpl::Inline {
                sampler,
                loader,
                batch_size,
            } => {
                let mut records = Vec::with_capacity(*batch_size);
                while records.len() < *batch_size {
                    // The run total is a multiple of batch_size, so the
                    // sampler only ends on a batch boundary.
                    match sampler.next()? {
                        Ok(triple) => records.push(load_record(loader, triple)),
                        Err(error) => return Some(Err(error.into())),
                    }
                }
                Some(Ok(Batch::new(records)))
            }
            IteratorImpl::Parallel(stages) => stages.batch_rx.as_ref()?.recv().ok(),
        }
    }
}

impl ParallelStages {
    fn spawn(
        sampler: TripleSampler,
        loader: Arc<ImageLoader>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let buffer_size = config.in_flight_limit().ok_or_else(|| {
            PipelineError::config("worker channel capacity overflows usize")
        })?;
        let expected = sampler.total();
        let batch_size = config.batch_size;

        let mut pool = spawn_loader_pool(loader, config.num_workers, buffer_size)
            .with_context(|| format!("Failed to start {} loader workers", config.num_workers))?;
        let output_rx = pool.take_output_receiver()?;
        let (batch_tx, batch_rx) = bounded(config.prefetch_batches);
        let (permit_tx, permit_rx) = bounded(buffer_size);

        // Assembled before the threads start so that a failed spawn still
        // shuts down whatever is already running.
        let mut stages = Self {
            batch_rx: Some(batch_rx),
            permits: permit_tx,
            in_flight_limit: buffer_size,
            sampler_thread: None,
            batcher_thread: None,
            shutdown: pool.shutdown_flag(),
            pool,
        };

        stages.batcher_thread = Some(
            thread::Builder::new()
                .name("pairwise-batcher".into())
                .spawn(move || run_batcher(output_rx, batch_tx, permit_rx, batch_size, expected))
                .context("Failed to spawn batcher thread")?,
        );

        // Taken only now: a live task sender would keep idle workers waiting
        // if the stages had to be torn down above.
        let task_tx = stages.pool.take_task_sender()?;
        let permit_tx = stages.permits.clone();
        let shutdown = stages.shutdown.clone();
        stages.sampler_thread = Some(
            thread::Builder::new()
                .name("pairwise-sampler".into())
                .spawn(move || run_sampler(sampler, task_tx, permit_tx, shutdown))
                .context("Failed to spawn sampler thread")?,
        );

        Ok(stages)
    }
}

impl Drop for ParallelStages {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // Closing the prefetch buffer unblocks the batcher, whose exit
        // disconnects the workers and the permit channel, either of which
        // disconnects the sampler.
        self.batch_rx.take();

        for handle in [self.batcher_thread.take(), self.sampler_thread.take()]
            .into_iter()
            .flatten()
        {
            let _ = handle.join();
        }
    }
}

/// Stage 1: draws triples in order and tags each with its sequence number.
/// Blocks while the permit window is exhausted.
fn run_sampler(
    sampler: TripleSampler,
    task_tx: Sender<LoadTask>,
    permits: Sender<()>,
    shutdown: Arc<AtomicBool>,
) {
    for (seq, draw) in sampler.enumerate() {
        if shutdown.load(Ordering::Relaxed) {
            debug!(seq, "sampler stopped by shutdown");
            return;
        }

        if permits.send(()).is_err() {
            debug!(seq, "batcher gone, sampler exiting");
            return;
        }

        let task = match draw {
            Ok(triple) => LoadTask::Pair { seq, triple },
            Err(error) => {
                warn!(seq, %error, "sampling stopped");
                LoadTask::Failed { seq, error }
            }
        };

        if task_tx.send(task).is_err() {
            debug!(seq, "loader workers gone, sampler exiting");
            return;
        }
    }
}

/// Stage 3: restores generation order and groups records into batches.
/// Returns one permit for every record released in order.
fn run_batcher(
    output_rx: Receiver<LoadOutput>,
    batch_tx: Sender<Result<Batch>>,
    permits: Receiver<()>,
    batch_size: usize,
    expected: usize,
) {
    let mut reorder = ReorderBuffer::new();
    let mut pending = Vec::with_capacity(batch_size);

    for (seq, result) in output_rx.iter() {
        reorder.insert(seq, result);

        while let Some(result) = reorder.pop_next() {
            // The sampler took this permit before sending the task.
            let _ = permits.try_recv();
            match result {
                Ok(record) => {
                    pending.push(record);
                    if pending.len() == batch_size {
                        let records =
                            std::mem::replace(&mut pending, Vec::with_capacity(batch_size));
                        if batch_tx.send(Ok(Batch::new(records))).is_err() {
                            debug!("batch stream dropped, batcher exiting");
                            return;
                        }
                    }
                }
                Err(error) => {
                    if !pending.is_empty() {
                        debug!(discarded = pending.len(), "dropping incomplete batch");
                    }
                    let _ = batch_tx.send(Err(error.into()));
                    return;
                }
            }
        }
    }

    let released = reorder.released();
    if released < expected {
        let error = PipelineError::WorkerFailure(format!(
            "loading stage closed after {} of {} records",
            released, expected
        ));
        // Also reached on cancellation, where nobody is listening any more.
        let _ = batch_tx.send(Err(error.into()));
    } else {
        debug!(records = released, "batch stream complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::TrainingRecord;
    use crate::image_loader::ImageSample;
    use crate::sampler::Triple;
    use ndarray::Array3;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn record(seq: usize) -> TrainingRecord {
        let image = |item| ImageSample {
            item,
            pixels: Array3::zeros((1, 1, 3)),
        };
        let triple = Triple {
            user: seq as u64,
            positive: 1,
            negative: 2,
        };
        TrainingRecord::new(triple, image(1), image(2))
    }

    #[test]
    fn test_stalled_record_blocks_producer_at_window() -> Result<()> {
        const WINDOW: usize = 4;
        const TOTAL: usize = 100;

        let (output_tx, output_rx) = bounded::<LoadOutput>(WINDOW);
        let (batch_tx, batch_rx) = bounded(TOTAL);
        let (permit_tx, permit_rx) = bounded(WINDOW);

        let batcher = thread::spawn(move || run_batcher(output_rx, batch_tx, permit_rx, 4, TOTAL));

        // Sequence 0 takes its permit but its load does not finish yet.
        permit_tx.send(())?;
        let sent = Arc::new(AtomicUsize::new(0));
        let producer = {
            let output_tx = output_tx.clone();
            let permit_tx = permit_tx.clone();
            let sent = sent.clone();
            thread::spawn(move || {
                for seq in 1..TOTAL {
                    if permit_tx.send(()).is_err() {
                        return;
                    }
                    sent.fetch_add(1, Ordering::SeqCst);
                    if output_tx.send((seq, Ok(record(seq)))).is_err() {
                        return;
                    }
                }
            })
        };

        thread::sleep(Duration::from_millis(200));
        assert_eq!(sent.load(Ordering::SeqCst), WINDOW - 1);
        assert!(batch_rx.is_empty());

        output_tx.send((0, Ok(record(0))))?;
        drop(output_tx);
        drop(permit_tx);
        producer.join().expect("producer thread");
        batcher.join().expect("batcher thread");

        let users: Vec<u64> = batch_rx
            .try_iter()
            .map(|batch| batch.map(|b| b.triples().map(|t| t.user).collect::<Vec<_>>()))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(users, (0..TOTAL as u64).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_batcher_returns_permits_in_order() -> Result<()> {
        let (output_tx, output_rx) = bounded::<LoadOutput>(8);
        let (batch_tx, batch_rx) = bounded(8);
        let (permit_tx, permit_rx) = bounded(8);

        for _ in 0..3 {
            permit_tx.send(())?;
        }
        output_tx.send((2, Ok(record(2))))?;
        output_tx.send((1, Ok(record(1))))?;
        drop(output_tx);

        // Sequence 0 never arrives: nothing is released, no permit returned.
        run_batcher(output_rx, batch_tx, permit_rx, 1, 3);
        assert_eq!(permit_tx.len(), 3);

        let err = batch_rx.recv()?.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::WorkerFailure(_))
        ));
        Ok(())
    }
}
