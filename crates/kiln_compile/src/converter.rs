//! The converter plugin interface.

use std::path::{Path, PathBuf};

use crate::error::ProcessError;
use crate::record::FileRecord;

/// A plugin that turns one kind of source file into output files.
///
/// A converter is shared by every thread of a run. It hands out one
/// [`Compiler`] per drain job; compilers are never shared between threads.
pub trait Converter: Send + Sync {
    /// Short name used in logs and reports (e.g. `"texture"`).
    fn name(&self) -> &str;

    /// File extensions handled, without the leading dot. Matching is
    /// case-insensitive.
    fn extensions(&self) -> &[&str];

    /// Whether several compilers may run at once.
    fn supports_multithreading(&self) -> bool {
        false
    }

    /// Whether outputs may be stored in and restored from the content cache.
    fn is_cacheable(&self) -> bool {
        true
    }

    /// Creates a compiler instance owned by one job.
    fn create_compiler(&self) -> Box<dyn Compiler>;
}

/// Converts files one at a time on a single thread.
pub trait Compiler: Send {
    /// Converts the file described by `ctx`, reporting each produced file
    /// with [`ConvertContext::add_output`].
    fn process(&mut self, ctx: &mut ConvertContext<'_>) -> Result<(), ProcessError>;
}

/// What a compiler sees of the file it is converting.
#[derive(Debug)]
pub struct ConvertContext<'a> {
    record: &'a FileRecord,
    threads: usize,
    outputs: Vec<PathBuf>,
}

impl<'a> ConvertContext<'a> {
    /// Creates a context for `record` converted alongside `threads - 1` other
    /// files of the same converter.
    pub fn new(record: &'a FileRecord, threads: usize) -> Self {
        Self {
            record,
            threads,
            outputs: Vec::new(),
        }
    }

    /// The file being converted.
    pub fn record(&self) -> &FileRecord {
        self.record
    }

    /// Full path of the source file.
    pub fn source_path(&self) -> PathBuf {
        self.record.source_path()
    }

    /// Directory outputs should be written to.
    pub fn target_dir(&self) -> PathBuf {
        self.record.target_dir()
    }

    /// Number of files of this converter being converted concurrently.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Records a produced file.
    pub fn add_output(&mut self, path: impl AsRef<Path>) {
        self.outputs.push(path.as_ref().to_path_buf());
    }

    /// Files recorded so far.
    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    pub(crate) fn into_outputs(self) -> Vec<PathBuf> {
        self.outputs
    }
}
