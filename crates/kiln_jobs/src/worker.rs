//! Per-worker queues, the worker loop, and the steal policy.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::job::{set_current_worker, Job};
use crate::pool::PoolShared;

/// One worker's private queue and counters.
///
/// The queue only changes under its own lock. `queued` mirrors the queue
/// length so load balancing can pick targets without taking every lock.
pub(crate) struct Worker {
    queue: Mutex<VecDeque<Job>>,
    queued: AtomicUsize,
    executed: AtomicUsize,
    stolen: AtomicUsize,
}

impl Worker {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            queued: AtomicUsize::new(0),
            executed: AtomicUsize::new(0),
            stolen: AtomicUsize::new(0),
        }
    }

    /// Appends jobs at the back of the queue.
    pub(crate) fn push_all(&self, jobs: impl IntoIterator<Item = Job>) {
        let mut queue = self.queue.lock();
        queue.extend(jobs);
        self.queued.store(queue.len(), Ordering::Release);
    }

    /// Takes the oldest job of this worker's own queue.
    fn pop(&self) -> Option<Job> {
        let mut queue = self.queue.lock();
        let job = queue.pop_front();
        self.queued.store(queue.len(), Ordering::Release);
        job
    }

    /// Approximate number of queued jobs.
    pub(crate) fn load(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub(crate) fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    pub(crate) fn stolen(&self) -> usize {
        self.stolen.load(Ordering::Relaxed)
    }
}

/// Body of worker thread `index`.
///
/// Sleeps until some job may be available, runs its own jobs first, and
/// steals when its queue is empty. Returns once the pool signals exit and no
/// job is left waiting.
pub(crate) fn run(shared: Arc<PoolShared>, index: usize) {
    set_current_worker(Some(index));

    while shared.wait_for_work() {
        let job = shared.workers[index]
            .pop()
            .or_else(|| steal(&shared, index));

        let Some(job) = job else {
            // Another worker took the job we were woken for.
            std::thread::yield_now();
            continue;
        };

        shared.job_started();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job.execute())) {
            let message = panic_message(payload.as_ref());
            tracing::error!(worker = index, panic = %message, "job panicked");
            shared.job_panicked();
        }
        shared.workers[index].executed.fetch_add(1, Ordering::Relaxed);
        shared.job_finished();
    }

    set_current_worker(None);
}

/// Steals for worker `thief`, trying victims from most to least loaded.
///
/// Returns the first job of the stolen batch, ready to run.
fn steal(shared: &PoolShared, thief: usize) -> Option<Job> {
    let mut victims: Vec<(usize, usize)> = shared
        .workers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != thief)
        .map(|(i, w)| (i, w.load()))
        .filter(|(_, load)| *load > 0)
        .collect();
    victims.sort_by(|a, b| b.1.cmp(&a.1));

    victims
        .into_iter()
        .find_map(|(victim, _)| steal_from(shared, thief, victim))
}

/// Moves the older half of `victim`'s queue to the back of `thief`'s queue.
///
/// Both locks are taken in index order so concurrent mutual steals cannot
/// deadlock. Returns `None` if the victim turned out to be empty.
fn steal_from(shared: &PoolShared, thief: usize, victim: usize) -> Option<Job> {
    let (low, high) = if thief < victim {
        (thief, victim)
    } else {
        (victim, thief)
    };
    let mut low_queue = shared.workers[low].queue.lock();
    let mut high_queue = shared.workers[high].queue.lock();
    let (own, theirs) = if thief < victim {
        (&mut *low_queue, &mut *high_queue)
    } else {
        (&mut *high_queue, &mut *low_queue)
    };

    if theirs.is_empty() {
        return None;
    }
    let take = theirs.len().div_ceil(2);
    own.extend(theirs.drain(..take));
    let job = own.pop_front();

    shared.workers[victim]
        .queued
        .store(theirs.len(), Ordering::Release);
    shared.workers[thief].queued.store(own.len(), Ordering::Release);
    shared.workers[thief]
        .stolen
        .fetch_add(take, Ordering::Relaxed);
    tracing::debug!(thief, victim, jobs = take, "stole jobs");
    job
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
