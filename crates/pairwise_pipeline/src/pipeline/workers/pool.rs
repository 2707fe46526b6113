//! Worker pool for parallel image loading.
//!
//! Workers pull tasks from one shared bounded channel and push results to one
//! shared bounded output channel. Results arrive in completion order; the
//! batching stage restores generation order.
//!
//! # Key features
//! - Bounded channels apply backpressure instead of growing memory
//! - Channel endpoints are handed to the stages that drive them, so a stage
//!   exiting disconnects its neighbours and the whole pipeline winds down
//! - Graceful shutdown and join on drop
//! - Thread-local worker IDs for logging

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::pipeline::common::thread::set_worker_id;

/// Thread pool for parallel loading.
///
/// - Task channel: sampling stage -> workers
/// - Output channel: workers -> batching stage
/// - Shutdown flag: checked by workers between tasks
///
/// # Type Parameters
/// - `Task`: Work items sent to workers
/// - `Output`: Results returned from workers
pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    output_rx: Option<Receiver<Output>>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads running `worker_fn`, joined by channels of
    /// `buffer_size` slots.
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with 0 workers. \
                Either set num_workers > 0 or load images inline."
            ));
        }

        if buffer_size == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with buffer_size 0. \
                Buffer size must be > 0 to prevent deadlocks."
            ));
        }

        let (task_tx, task_rx) = bounded(buffer_size);
        let (output_tx, output_rx) = bounded(buffer_size);

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let shutdown_clone = shutdown.clone();
            let worker_fn_clone = worker_fn.clone();

            let spawned = thread::Builder::new()
                .name(format!("pairwise-loader-{}", worker_id))
                .spawn(move || {
                    set_worker_id(worker_id);
                    worker_fn_clone(task_rx, output_tx, shutdown_clone);
                })
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    // Release the workers already running before bailing out.
                    shutdown.store(true, Ordering::Relaxed);
                    drop(task_tx);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(err);
                }
            }
        }

        Ok(Self {
            workers,
            task_tx: Some(task_tx),
            output_rx: Some(output_rx),
            shutdown,
        })
    }

    /// Hands the task sender to the stage feeding the workers. Workers exit
    /// once it (and every clone) is dropped.
    pub(crate) fn take_task_sender(&mut self) -> Result<Sender<Task>> {
        self.task_tx
            .take()
            .ok_or_else(|| anyhow!("Worker pool task sender was already taken"))
    }

    /// Hands the output receiver to the stage consuming results. Workers stop
    /// once it is dropped.
    pub(crate) fn take_output_receiver(&mut self) -> Result<Receiver<Output>> {
        self.output_rx
            .take()
            .ok_or_else(|| anyhow!("Worker pool output receiver was already taken"))
    }

    pub(crate) fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.workers.len()
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // Close whichever endpoints were never handed out
        self.task_tx.take();
        self.output_rx.take();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
