use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{CelltraceError, Result};

/// Lifecycle of one long-running request.
///
/// `CancelRequested` is the only state reachable from `Running` through an
/// external call; `Cancelled`, `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    Running = 0,
    CancelRequested = 1,
    Cancelled = 2,
    Completed = 3,
    Failed = 4,
}

impl RequestState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::CancelRequested,
            2 => Self::Cancelled,
            3 => Self::Completed,
            _ => Self::Failed,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }
}

/// Shared, cloneable cancellation flag of a request.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates a token in the `Running` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RequestState::Running as u8)),
        }
    }

    /// Requests cancellation. Has no effect unless the request is running.
    ///
    /// Returns `true` if this call moved the request to `CancelRequested`.
    pub fn cancel(&self) -> bool {
        self.transition(RequestState::Running, RequestState::CancelRequested)
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.state(),
            RequestState::CancelRequested | RequestState::Cancelled
        )
    }

    #[must_use]
    pub fn state(&self) -> RequestState {
        RequestState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: RequestState, to: RequestState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Settles the request once every worker has stopped.
    ///
    /// A success that raced with a cancel request is discarded, so a
    /// cancelled request never hands out a result.
    pub(crate) fn finish<T>(
        &self,
        result: Result<T>,
        cancelled: impl FnOnce() -> CelltraceError,
    ) -> Result<T> {
        let settled = match result {
            Ok(_) if self.state() == RequestState::CancelRequested => Err(cancelled()),
            other => other,
        };
        let terminal = match &settled {
            Ok(_) => RequestState::Completed,
            Err(e) if e.is_cancelled() => RequestState::Cancelled,
            Err(_) => RequestState::Failed,
        };
        let previous = self.state();
        if !previous.is_terminal() {
            self.state.store(terminal as u8, Ordering::Release);
            debug!(?previous, state = ?terminal, "request settled");
        }
        settled
    }
}

/// Named phases reported to a progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BoundingBoxes,
    Tracing,
    Merging,
    Constructing,
    Painting,
    Exporting,
}

impl Stage {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::BoundingBoxes => "Calculating bounding boxes",
            Self::Tracing => "Tracing section",
            Self::Merging => "Merging ray data",
            Self::Constructing => "Creating polygons",
            Self::Painting => "Updating polygon color",
            Self::Exporting => "Exporting cells in 3D format",
        }
    }

    /// Label shown while waiting for workers to acknowledge a cancel request.
    #[must_use]
    pub fn cancel_label() -> &'static str {
        "Waiting for the subthreads to finish"
    }
}

/// Receiver of progress notifications. Called from worker threads.
pub trait ProgressSink: Sync {
    /// A stage with `total` units of work starts.
    fn begin(&self, stage: Stage, total: usize);

    /// `done` of `total` units of the current stage are finished.
    fn advance(&self, done: usize, total: usize);

    /// A cancel request was seen and the remaining workers are winding down.
    fn cancelling(&self, _label: &'static str) {}
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin(&self, _stage: Stage, _total: usize) {}

    fn advance(&self, _done: usize, _total: usize) {}
}
