//! Image loading workers.
//!
//! - `pool`: generic bounded worker pool
//! - this module: the task protocol and the loading worker body
//!
//! Every sampled draw is tagged with its generation sequence number before it
//! enters the pool so the batching stage can put completed records back in
//! order.

pub(crate) mod pool;

use crate::batch::TrainingRecord;
use crate::error::PipelineError;
use crate::image_loader::ImageLoader;
use crate::sampler::Triple;
use anyhow::Result;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace};

use super::common::thread::current_worker_id;
use self::pool::WorkerPool;

/// Work sent from the sampling stage to the loaders.
#[derive(Debug)]
pub(crate) enum LoadTask {
    /// Load both images of draw number `seq`.
    Pair { seq: usize, triple: Triple },
    /// Draw number `seq` failed; forwarded untouched so the failure surfaces
    /// in generation order.
    Failed { seq: usize, error: PipelineError },
}

/// A loaded draw, still tagged with its sequence number.
pub(crate) type LoadOutput = (usize, Result<TrainingRecord, PipelineError>);

/// Spawns the loader pool. Each worker handles tasks until the task channel
/// closes, the output channel closes, or shutdown is signalled.
pub(crate) fn spawn_loader_pool(
    loader: Arc<ImageLoader>,
    num_workers: usize,
    buffer_size: usize,
) -> Result<WorkerPool<LoadTask, LoadOutput>> {
    WorkerPool::new(num_workers, buffer_size, move |task_rx, output_tx, shutdown| {
        let worker = current_worker_id();
        debug!(?worker, "loader worker started");

        for task in task_rx.iter() {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            let output = match task {
                LoadTask::Pair { seq, triple } => {
                    trace!(?worker, seq, positive = triple.positive, negative = triple.negative, "loading pair");
                    (seq, load_record_guarded(&loader, triple))
                }
                LoadTask::Failed { seq, error } => (seq, Err(error)),
            };

            if output_tx.send(output).is_err() {
                // Batching stage is gone; nothing left to deliver to.
                break;
            }
        }

        debug!(?worker, "loader worker stopped");
    })
}

/// Loads both images of `triple` into a record.
pub(crate) fn load_record(loader: &ImageLoader, triple: Triple) -> TrainingRecord {
    let (positive, negative) = loader.load_pair(triple.positive, triple.negative);
    TrainingRecord::new(triple, positive, negative)
}

/// [`load_record`] on a worker thread: a panic inside the image stack becomes
/// a reportable failure instead of a record that silently never arrives.
fn load_record_guarded(
    loader: &ImageLoader,
    triple: Triple,
) -> Result<TrainingRecord, PipelineError> {
    catch_unwind(AssertUnwindSafe(|| load_record(loader, triple))).map_err(|_| {
        PipelineError::WorkerFailure(format!(
            "loading items {} and {} panicked",
            triple.positive, triple.negative
        ))
    })
}
