//! End-to-end pipeline driver.
//!
//! [`run`] wires a [`Source`] of opaque items through a [`Transform`] to an
//! ordered output sink, overlapping transformation across two threads: one
//! dedicated worker, and the driver itself when the load balancer says so.
//! Output is byte-identical to a strictly sequential run.
//!
//! The driver moves through three phases:
//!
//! 1. **Running**: the worker loops claim → transform → complete; the driver
//!    feeds items, stealing when the queue is full (leaving one pending slot
//!    for the worker) and opportunistically right after each enqueue.
//! 2. **Draining**: input is exhausted; the driver steals every remaining
//!    pending slot, then enqueues the terminal sentinel.
//! 3. **Done**: the worker exits on the sentinel; the driver joins it, checks
//!    the pending aggregates are zero, and flushes the sink.
//!
//! On any failure the queue is aborted so the peer thread unblocks; the first
//! real error (not the secondary `Aborted`) is the one returned.

use std::io::{self, Write};
use std::thread;

use log::debug;

use crate::balance::BalancerConfig;
use crate::errors::{PipelineError, Result};
use crate::progress::ProgressTracker;
use crate::queue::{Claim, Enqueue, WorkQueue};

/// Default queue capacity: just high enough to provide parallelism for two
/// transformer threads.
pub const DEFAULT_CAPACITY: usize = 8;

/// Produces a lazy, finite, non-restartable sequence of opaque items in the
/// order that must be reproduced on output.
pub trait Source {
    /// The next item, or `None` once the sequence is exhausted.
    fn next_item(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Name of the input, for diagnostics.
    fn name(&self) -> &str;
}

/// Turns one opaque item into its result.
///
/// May be called concurrently from two threads on independent buffers. The
/// input buffer is consumed; the result is a newly owned buffer.
pub trait Transform: Sync {
    /// Name of the stage, for diagnostics.
    fn name(&self) -> &'static str;

    /// Transform one item. A failure is fatal to the whole run.
    fn apply(&self, item: Vec<u8>) -> io::Result<Vec<u8>>;
}

/// Pipeline tunables. Performance knobs, not correctness knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Queue capacity: maximum items in flight (pending, in progress, or
    /// awaiting ordered emission).
    pub capacity: usize,
    /// Steal heuristics for the driver thread.
    pub balancer: BalancerConfig,
    /// Items between progress log lines.
    pub progress_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            balancer: BalancerConfig::default(),
            progress_interval: 100_000,
        }
    }
}

/// Counters from a completed run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSummary {
    /// Items transformed and emitted.
    pub items: u64,
    /// Result bytes written to the sink.
    pub bytes_out: u64,
    /// High-water queue occupancy; never exceeds the configured capacity.
    pub peak_occupancy: usize,
}

/// Run the pipeline to completion.
///
/// Emission order equals input arrival order regardless of which thread
/// computed which result or in what order completions arrived. Blocks until
/// the source is exhausted and every result has been written, then flushes
/// the sink.
///
/// # Errors
///
/// The first failure anywhere (source read, transform, sink write) aborts the
/// run and is returned; the peer thread's secondary abort error is discarded.
///
/// # Panics
///
/// Panics if the queue's pending aggregates are nonzero after a successful
/// drain, which would indicate lost work.
pub fn run<S, T, W>(
    mut source: S,
    transform: &T,
    sink: W,
    config: &PipelineConfig,
) -> Result<PipelineSummary>
where
    S: Source,
    T: Transform + ?Sized,
    W: Write + Send,
{
    let queue = WorkQueue::new(config.capacity, config.balancer.clone(), sink);
    let progress = ProgressTracker::new("Queued items").with_interval(config.progress_interval);

    thread::scope(|scope| {
        let worker = scope.spawn(|| transformer_loop(&queue, transform));
        let driven = drive(&mut source, transform, &queue, &progress);
        if driven.is_err() {
            queue.abort();
        }
        let worked = match worker.join() {
            Ok(result) => result,
            Err(_) => Err(PipelineError::WorkerPanic),
        };
        merge(driven, worked)
    })?;
    progress.log_final();

    let stats = queue.stats();
    assert_eq!(stats.pending_count, 0, "pending items remain after drain");
    assert_eq!(stats.pending_bytes, 0, "pending bytes remain after drain");
    debug!(
        "pipeline drained: {} items, {} bytes, peak occupancy {}",
        stats.emitted_items, stats.emitted_bytes, stats.peak_count
    );

    let mut sink = queue.into_sink();
    sink.flush().map_err(PipelineError::Sink)?;
    Ok(PipelineSummary {
        items: stats.emitted_items,
        bytes_out: stats.emitted_bytes,
        peak_occupancy: stats.peak_count,
    })
}

/// The dedicated worker: claim, transform unlocked, complete; exit on the
/// sentinel.
fn transformer_loop<T, W>(queue: &WorkQueue<W>, transform: &T) -> Result<()>
where
    T: Transform + ?Sized,
    W: Write,
{
    loop {
        let Some(claim) = queue.claim_next()? else {
            return Ok(());
        };
        transform_claim(queue, transform, claim)?;
    }
}

/// Transform one claimed item and put the result back.
///
/// Shared by the worker and the driver's steal paths; the two roles are
/// symmetric from the queue's point of view.
fn transform_claim<T, W>(queue: &WorkQueue<W>, transform: &T, claim: Claim) -> Result<()>
where
    T: Transform + ?Sized,
    W: Write,
{
    let Claim { token, payload } = claim;
    let result = match transform.apply(payload) {
        Ok(result) => result,
        Err(e) => {
            queue.abort();
            return Err(PipelineError::Transform { stage: transform.name(), source: e });
        }
    };
    queue.complete(token, result)
}

/// The driver's producing loop plus the drain and sentinel phases.
fn drive<S, T, W>(
    source: &mut S,
    transform: &T,
    queue: &WorkQueue<W>,
    progress: &ProgressTracker,
) -> Result<()>
where
    S: Source,
    T: Transform + ?Sized,
    W: Write,
{
    loop {
        let item = source.next_item().map_err(|e| PipelineError::Source {
            input: source.name().to_string(),
            source: e,
        })?;
        let Some(mut item) = item else {
            break;
        };
        loop {
            match queue.enqueue_or_steal(item)? {
                Enqueue::Accepted => break,
                Enqueue::Rejected { payload, claim } => {
                    transform_claim(queue, transform, claim)?;
                    item = payload;
                }
            }
        }
        progress.log_if_needed(1);
        if let Some(claim) = queue.steal_opportunistic()? {
            transform_claim(queue, transform, claim)?;
        }
    }

    // Draining: no more input is coming, so every pending slot is fair game.
    while let Some(claim) = queue.steal_remaining()? {
        transform_claim(queue, transform, claim)?;
    }
    queue.finish()
}

/// Pick the error that actually stopped the run over the peer's secondary
/// `Aborted`.
fn merge(driver: Result<()>, worker: Result<()>) -> Result<()> {
    match (driver, worker) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Err(driver_err), Err(worker_err)) => {
            if driver_err.is_aborted() {
                Err(worker_err)
            } else {
                Err(driver_err)
            }
        }
    }
}
