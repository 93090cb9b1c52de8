//! The shared work list of one converter group.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::outcome::{FailureReason, FileOutcome};
use crate::record::FileRecord;
use crate::report::{ConvertedFile, FailedFile};

/// Files of one group, bucketed as drain jobs classify them.
///
/// Drain jobs pull from the input queue and push every file into exactly one
/// of the converted / failed / out-of-memory buckets.
#[derive(Debug)]
pub struct Batch {
    total: usize,
    state: Mutex<BatchState>,
}

#[derive(Debug, Default)]
struct BatchState {
    input: VecDeque<FileRecord>,
    in_flight: usize,
    converted: Vec<ConvertedFile>,
    failed: Vec<FailedFile>,
    out_of_memory: Vec<FileRecord>,
}

/// Bucket sizes at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    /// Files not yet picked up.
    pub queued: usize,
    /// Files being converted.
    pub in_flight: usize,
    /// Files converted.
    pub converted: usize,
    /// Files failed.
    pub failed: usize,
    /// Files that ran out of memory.
    pub out_of_memory: usize,
}

/// Final buckets of a drained batch.
#[derive(Debug, Default)]
pub struct BatchResults {
    /// Converted files with their outputs.
    pub converted: Vec<ConvertedFile>,
    /// Failed files.
    pub failed: Vec<FailedFile>,
    /// Files that ran out of memory.
    pub out_of_memory: Vec<FileRecord>,
}

impl Batch {
    /// Creates a batch with every record queued.
    pub fn new(records: Vec<FileRecord>) -> Self {
        Self {
            total: records.len(),
            state: Mutex::new(BatchState {
                input: records.into(),
                ..BatchState::default()
            }),
        }
    }

    /// Number of files the batch started with.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Takes the next queued file.
    pub fn next_input(&self) -> Option<FileRecord> {
        let mut state = self.state.lock();
        let record = state.input.pop_front()?;
        state.in_flight += 1;
        Some(record)
    }

    /// Files `record` under the bucket matching `outcome`.
    pub fn complete(&self, record: FileRecord, outcome: FileOutcome) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        match outcome {
            FileOutcome::Converted(outputs) => {
                state.converted.push(ConvertedFile { record, outputs })
            }
            FileOutcome::Failed(reason) => state.failed.push(FailedFile { record, reason }),
            FileOutcome::OutOfMemory => state.out_of_memory.push(record),
        }
    }

    /// Current bucket sizes.
    pub fn progress(&self) -> BatchProgress {
        let state = self.state.lock();
        BatchProgress {
            queued: state.input.len(),
            in_flight: state.in_flight,
            converted: state.converted.len(),
            failed: state.failed.len(),
            out_of_memory: state.out_of_memory.len(),
        }
    }

    /// Empties the buckets. Files still queued count as
    /// [`FailureReason::NotProcessed`].
    pub fn take_results(&self) -> BatchResults {
        let mut state = self.state.lock();
        let mut failed = std::mem::take(&mut state.failed);
        failed.extend(state.input.drain(..).map(|record| FailedFile {
            record,
            reason: FailureReason::NotProcessed,
        }));
        BatchResults {
            converted: std::mem::take(&mut state.converted),
            failed,
            out_of_memory: std::mem::take(&mut state.out_of_memory),
        }
    }
}
