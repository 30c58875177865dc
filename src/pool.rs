//! Fixed-size worker pool with per-slot outcome reporting.
//!
//! A run splits `0..total` into one contiguous range per thread. Each slot
//! owns its output buffer and reports a [`WorkerReport`]; [`collect`] is the
//! only place where slot outcomes are aggregated into a request result.

use std::any::Any;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::error::{CelltraceError, OperationError, Result};
use crate::progress::{CancelToken, ProgressSink, Stage};

/// A unit-of-work processor shared by every slot of a run.
pub trait Worker: Sync {
    type Output: Send;

    /// Processes unit `index`, appending its results to `out`.
    ///
    /// Long units should poll [`WorkerContext::should_stop`] and return a
    /// cancellation error when it turns true.
    ///
    /// # Errors
    ///
    /// Any error fails the whole run; cancellation errors mark the slot as cancelled.
    fn process(
        &self,
        index: usize,
        ctx: &WorkerContext<'_>,
        out: &mut Vec<Self::Output>,
    ) -> Result<()>;
}

/// Stop signals visible to a worker.
#[derive(Debug)]
pub struct WorkerContext<'a> {
    cancel: &'a CancelToken,
    abort: &'a AtomicBool,
}

impl WorkerContext<'_> {
    /// Returns `true` when the request was cancelled or a sibling slot failed.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.abort.load(Ordering::Relaxed)
    }
}

/// Outcome of one slot.
#[derive(Debug)]
pub enum WorkerReport<T> {
    Completed { range: Range<usize>, items: Vec<T> },
    Cancelled { range: Range<usize> },
    Failed { range: Range<usize>, error: CelltraceError },
}

/// A rayon thread pool with a fixed number of threads.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl WorkerPool {
    /// Creates a pool with `threads` threads; `0` uses the available hardware concurrency.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::ThreadPool`] if the threads cannot be spawned.
    pub fn new(threads: usize) -> Result<Self> {
        let threads = if threads == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("celltrace-worker-{i}"))
            .build()
            .map_err(|e| OperationError::ThreadPool(e.to_string()))?;
        debug!(threads, "worker pool created");
        Ok(Self { pool, threads })
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `f` inside the pool so nested rayon iterators use its threads.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    /// Processes units `0..total`, one contiguous range per thread.
    ///
    /// Reports are returned in range order. Blocks until every slot has
    /// either finished or acknowledged cancellation.
    pub fn run<W: Worker>(
        &self,
        worker: &W,
        total: usize,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
        stage: Stage,
    ) -> Vec<WorkerReport<W::Output>> {
        progress.begin(stage, total);
        let ranges = partition(total, self.threads);
        let done = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let cancel_seen = AtomicBool::new(false);
        let ctx = WorkerContext {
            cancel,
            abort: &abort,
        };

        debug!(stage = stage.label(), total, slots = ranges.len(), "run started");
        let reports: Vec<_> = self.pool.install(|| {
            ranges
                .into_par_iter()
                .map(|range| {
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        run_slot(worker, range.clone(), &ctx, &done, total, progress)
                    }));
                    let report = match outcome {
                        Ok(report) => report,
                        Err(payload) => WorkerReport::Failed {
                            range,
                            error: OperationError::WorkerPanicked(panic_message(&*payload))
                                .into(),
                        },
                    };
                    match &report {
                        WorkerReport::Failed { .. } => abort.store(true, Ordering::Relaxed),
                        WorkerReport::Cancelled { .. } => {
                            if !cancel_seen.swap(true, Ordering::Relaxed) {
                                progress.cancelling(Stage::cancel_label());
                            }
                        }
                        WorkerReport::Completed { .. } => {}
                    }
                    report
                })
                .collect()
        });
        debug!(stage = stage.label(), "run joined");
        reports
    }
}

fn run_slot<W: Worker>(
    worker: &W,
    range: Range<usize>,
    ctx: &WorkerContext<'_>,
    done: &AtomicUsize,
    total: usize,
    progress: &dyn ProgressSink,
) -> WorkerReport<W::Output> {
    let mut items = Vec::new();
    for index in range.clone() {
        if ctx.should_stop() {
            trace!(?range, index, "slot stopped");
            return WorkerReport::Cancelled { range };
        }
        if let Err(error) = worker.process(index, ctx, &mut items) {
            if error.is_cancelled() {
                return WorkerReport::Cancelled { range };
            }
            return WorkerReport::Failed { range, error };
        }
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        progress.advance(finished, total);
    }
    WorkerReport::Completed { range, items }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// Splits `0..total` into at most `parts` contiguous ranges whose lengths
/// differ by at most one. Empty ranges are never produced.
#[must_use]
pub fn partition(total: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1).min(total);
    if parts == 0 {
        return Vec::new();
    }
    let base = total / parts;
    let extra = total % parts;
    let mut start = 0;
    (0..parts)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Joins slot reports into one ordered result.
///
/// A failed slot wins over cancelled slots; any cancelled slot discards all
/// completed output.
///
/// # Errors
///
/// Returns the first slot failure, or `cancelled()` if any slot was cancelled.
pub fn collect<T>(
    reports: Vec<WorkerReport<T>>,
    cancelled: impl FnOnce() -> CelltraceError,
) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut was_cancelled = false;
    let mut failure = None;
    for report in reports {
        match report {
            WorkerReport::Completed { items: mut part, .. } => items.append(&mut part),
            WorkerReport::Cancelled { .. } => was_cancelled = true,
            WorkerReport::Failed { range, error } => {
                warn!(?range, %error, "worker slot failed");
                if failure.is_none() {
                    failure = Some(error);
                }
            }
        }
    }
    if let Some(error) = failure {
        return Err(error);
    }
    if was_cancelled {
        return Err(cancelled());
    }
    Ok(items)
}
