//! Error types for thread pool construction.

/// Errors that can occur while creating a [`ThreadPool`](crate::ThreadPool).
#[derive(Debug, thiserror::Error)]
pub enum JobsError {
    /// A pool needs at least one worker thread.
    #[error("thread pool needs at least one worker thread")]
    NoThreads,

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread {index}: {source}")]
    Spawn {
        /// Index of the worker that failed to start.
        index: usize,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_threads_display() {
        assert_eq!(
            JobsError::NoThreads.to_string(),
            "thread pool needs at least one worker thread"
        );
    }

    #[test]
    fn spawn_display() {
        let err = JobsError::Spawn {
            index: 3,
            source: std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no stack"),
        };
        let msg = err.to_string();
        assert!(msg.contains("worker thread 3"));
        assert!(msg.contains("no stack"));
    }
}
