//! The thread pool and its shared state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::JobsError;
use crate::job::Job;
use crate::worker::{self, Worker};

/// State shared by the pool handle, every worker, and job groups.
pub(crate) struct PoolShared {
    pub(crate) workers: Vec<Worker>,

    /// Jobs submitted and not yet finished.
    pending: AtomicUsize,
    /// Jobs submitted and not yet picked up by a worker.
    waiting: AtomicUsize,
    panicked: AtomicUsize,
    exit: AtomicBool,

    sleep: Mutex<()>,
    new_job: Condvar,
    idle: Mutex<()>,
    job_done: Condvar,
}

impl PoolShared {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            workers: (0..workers).map(|_| Worker::new()).collect(),
            pending: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
            exit: AtomicBool::new(false),
            sleep: Mutex::new(()),
            new_job: Condvar::new(),
            idle: Mutex::new(()),
            job_done: Condvar::new(),
        }
    }

    /// Queues `jobs` on the least-loaded worker and wakes sleepers.
    pub(crate) fn submit_jobs(&self, jobs: Vec<Job>) {
        let count = jobs.len();
        if count == 0 {
            return;
        }
        self.pending.fetch_add(count, Ordering::AcqRel);
        self.waiting.fetch_add(count, Ordering::AcqRel);

        let target = self
            .workers
            .iter()
            .enumerate()
            .min_by_key(|(_, w)| w.load())
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.workers[target].push_all(jobs);

        let _guard = self.sleep.lock();
        if count == 1 {
            self.new_job.notify_one();
        } else {
            self.new_job.notify_all();
        }
    }

    /// Blocks until a job may be available. Returns `false` once the pool is
    /// shutting down and nothing is left to run.
    pub(crate) fn wait_for_work(&self) -> bool {
        let mut guard = self.sleep.lock();
        loop {
            if self.waiting.load(Ordering::Acquire) > 0 {
                return true;
            }
            if self.exit.load(Ordering::Acquire) {
                return false;
            }
            self.new_job.wait(&mut guard);
        }
    }

    pub(crate) fn job_started(&self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn job_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_finished(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.idle.lock();
            self.job_done.notify_all();
        }
    }

    fn shut_down(&self) {
        let _guard = self.sleep.lock();
        self.exit.store(true, Ordering::Release);
        self.new_job.notify_all();
    }
}

/// Per-worker diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs this worker ran.
    pub executed: usize,
    /// Jobs this worker moved from other queues into its own.
    pub stolen: usize,
}

/// Pool-wide diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// One entry per worker, by index.
    pub workers: Vec<WorkerStats>,
    /// Jobs whose body panicked.
    pub panicked: usize,
}

impl PoolStats {
    /// Total jobs executed across all workers.
    pub fn executed(&self) -> usize {
        self.workers.iter().map(|w| w.executed).sum()
    }

    /// Total jobs moved by steals.
    pub fn stolen(&self) -> usize {
        self.workers.iter().map(|w| w.stolen).sum()
    }
}

/// A fixed set of worker threads with per-worker queues and work stealing.
///
/// Dropping the pool runs every job still queued, then joins the workers.
/// Do not drop or [`wait_idle`](Self::wait_idle) from inside a job.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    handles: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns `threads` workers named `kiln-worker-<i>`.
    pub fn new(threads: usize) -> Result<Self, JobsError> {
        if threads == 0 {
            return Err(JobsError::NoThreads);
        }

        let shared = Arc::new(PoolShared::new(threads));
        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let worker_shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("kiln-worker-{index}"))
                .spawn(move || worker::run(worker_shared, index));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    shared.shut_down();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(JobsError::Spawn { index, source });
                }
            }
        }

        tracing::debug!(threads, "thread pool started");
        Ok(Self { shared, handles })
    }

    /// Spawns one worker per available hardware thread.
    pub fn with_available_parallelism() -> Result<Self, JobsError> {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(threads)
    }

    /// Queues one job.
    pub fn submit(&self, job: Job) {
        self.shared.submit_jobs(vec![job]);
    }

    /// Queues a closure as a job.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Job::new(f));
    }

    /// Queues a batch of jobs on the least-loaded worker; idle workers steal
    /// from it.
    pub fn submit_all(&self, jobs: impl IntoIterator<Item = Job>) {
        self.shared.submit_jobs(jobs.into_iter().collect());
    }

    /// Blocks until every submitted job has finished.
    pub fn wait_idle(&self) {
        let mut guard = self.shared.idle.lock();
        while self.shared.pending.load(Ordering::Acquire) > 0 {
            self.shared.job_done.wait(&mut guard);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle) but gives up after `timeout`.
    /// Returns `true` if the pool became idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.idle.lock();
        while self.shared.pending.load(Ordering::Acquire) > 0 {
            if self
                .shared
                .job_done
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return self.shared.pending.load(Ordering::Acquire) == 0;
            }
        }
        true
    }

    /// Jobs submitted and not yet finished.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// Snapshot of per-worker counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self
                .shared
                .workers
                .iter()
                .map(|w| WorkerStats {
                    executed: w.executed(),
                    stolen: w.stolen(),
                })
                .collect(),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<PoolShared> {
        &self.shared
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.shut_down();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.worker_count())
            .field("pending", &self.pending())
            .finish()
    }
}
