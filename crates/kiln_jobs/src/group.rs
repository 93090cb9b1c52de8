//! Job groups: a set of jobs followed by one finishing job.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::job::Job;
use crate::pool::{PoolShared, ThreadPool};

type Finisher = Box<dyn FnOnce() + Send + 'static>;

struct GroupState {
    remaining: AtomicUsize,
    finisher: Mutex<Option<Finisher>>,
    pool: Weak<PoolShared>,
}

impl GroupState {
    fn member_done(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.release_finisher();
        }
    }

    fn release_finisher(&self) {
        let Some(finisher) = self.finisher.lock().take() else {
            return;
        };
        match self.pool.upgrade() {
            Some(pool) => pool.submit_jobs(vec![Job::new(finisher)]),
            None => {
                tracing::warn!("job group finished after its pool was dropped");
                finisher();
            }
        }
    }
}

/// Counts a member as done when dropped, so a panicking member still
/// releases the finisher.
struct MemberGuard(Arc<GroupState>);

impl Drop for MemberGuard {
    fn drop(&mut self) {
        self.0.member_done();
    }
}

/// An ordered set of jobs with a finishing job.
///
/// The finishing job is submitted to the pool once every member has
/// completed, panicked members included. It never runs inline on the thread
/// that completed the last member.
///
/// ```ignore
/// let mut group = JobGroup::new(move || done_tx.send(()).unwrap());
/// for chunk in chunks {
///     group.push(move || process(chunk));
/// }
/// group.submit(&pool);
/// ```
pub struct JobGroup {
    members: Vec<Finisher>,
    finisher: Finisher,
}

impl JobGroup {
    /// Creates an empty group that runs `finisher` after all members.
    pub fn new<F>(finisher: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            members: Vec::new(),
            finisher: Box::new(finisher),
        }
    }

    /// Adds a member job.
    pub fn push<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.members.push(Box::new(f));
    }

    /// Number of member jobs.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Submits every member to `pool`. An empty group submits its finishing
    /// job right away.
    pub fn submit(self, pool: &ThreadPool) {
        let shared = pool.shared();
        if self.members.is_empty() {
            shared.submit_jobs(vec![Job::new(self.finisher)]);
            return;
        }

        let state = Arc::new(GroupState {
            remaining: AtomicUsize::new(self.members.len()),
            finisher: Mutex::new(Some(self.finisher)),
            pool: Arc::downgrade(shared),
        });

        let jobs = self
            .members
            .into_iter()
            .map(|member| {
                let guard = MemberGuard(Arc::clone(&state));
                Job::new(move || {
                    let _guard = guard;
                    member();
                })
            })
            .collect();
        shared.submit_jobs(jobs);
    }
}

impl std::fmt::Debug for JobGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobGroup")
            .field("members", &self.members.len())
            .finish_non_exhaustive()
    }
}
