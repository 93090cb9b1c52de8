//! Work-stealing thread pool.
//!
//! A fixed set of worker threads executes an open-ended stream of [`Job`]s.
//! Each worker owns a private queue; new work goes to the least-loaded worker
//! and idle workers steal the older half of the busiest queue. [`JobGroup`]
//! chains coarse dependencies: its finishing job is submitted once every
//! member has completed.

#![warn(missing_docs)]

pub mod error;
pub mod group;
pub mod job;
pub mod pool;
mod worker;

pub use error::JobsError;
pub use group::JobGroup;
pub use job::{current_worker, Job};
pub use pool::{PoolStats, ThreadPool, WorkerStats};
