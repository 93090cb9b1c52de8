//! Units of work executed by the pool.

use std::cell::Cell;
use std::fmt;

thread_local! {
    static CURRENT_WORKER: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Index of the pool worker running on this thread, if any.
pub fn current_worker() -> Option<usize> {
    CURRENT_WORKER.with(Cell::get)
}

pub(crate) fn set_current_worker(index: Option<usize>) {
    CURRENT_WORKER.with(|w| w.set(index));
}

/// A closure executed exactly once by some worker.
///
/// `origin` records which worker submitted the job (`None` from outside the
/// pool). It is informational only.
pub struct Job {
    run: Box<dyn FnOnce() + Send + 'static>,
    origin: Option<usize>,
}

impl Job {
    /// Wraps `f` as a job, tagging it with the submitting worker.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            run: Box::new(f),
            origin: current_worker(),
        }
    }

    /// The worker that created this job, if it was created inside the pool.
    pub fn origin(&self) -> Option<usize> {
        self.origin
    }

    pub(crate) fn execute(self) {
        (self.run)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("origin", &self.origin).finish_non_exhaustive()
    }
}
