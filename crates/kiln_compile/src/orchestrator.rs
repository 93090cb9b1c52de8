//! The compilation orchestrator.
//!
//! A run goes through these steps:
//! 1. Group the input files by converter
//! 2. Restore cacheable files from the content cache
//! 3. Drain the rest through the pool, one compiler per job
//! 4. Retry out-of-memory files single-threaded, once
//! 5. Store new outputs in the cache
//!
//! [`Orchestrator::finish`] then trims stale outputs and persists the ledger
//! and the run summary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_cache::{CacheKey, CacheSeed, ContentCache};
use kiln_config::{resolve_paths, KilnConfig, ResolvedPaths};
use kiln_jobs::{JobGroup, ThreadPool};
use kiln_ledger::{cleanup, CleanupOptions, Ledger, LedgerPath};
use parking_lot::Mutex;

use crate::batch::{Batch, BatchResults};
use crate::converter::Converter;
use crate::error::CompileError;
use crate::outcome::{run_one, FailureReason, FileOutcome};
use crate::record::FileRecord;
use crate::registry::ConverterRegistry;
use crate::report::{
    CleanupSummary, CompileReport, ConvertedFile, FailedFile, GroupReport, RunSummary,
};

/// Progress of the group currently draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Converter name.
    pub converter: String,
    /// Files in the batch.
    pub total: usize,
    /// Files classified so far.
    pub finished: usize,
    /// Files failed so far.
    pub failed: usize,
    /// Files being converted right now.
    pub in_flight: usize,
}

type ProgressFn = Box<dyn FnMut(&Progress)>;

/// Drives converters over source files with caching and incremental cleanup.
pub struct Orchestrator {
    registry: ConverterRegistry,
    pool: ThreadPool,
    cache: Option<ContentCache>,
    ledger: Arc<Mutex<Ledger>>,
    paths: ResolvedPaths,
    poll_interval: Duration,
    cleanup: bool,
    dry_run: bool,
    history: CompileReport,
    progress: Option<ProgressFn>,
}

impl Orchestrator {
    /// Creates an orchestrator for the project at `project_root`.
    ///
    /// Relative paths in `config` are resolved against `project_root`. A
    /// cache whose seed cannot be computed is disabled with a warning.
    pub fn new(
        config: &KilnConfig,
        project_root: &Path,
        registry: ConverterRegistry,
    ) -> Result<Self, CompileError> {
        let pool = ThreadPool::new(config.build.effective_threads())?;
        let paths = resolve_paths(config, project_root);
        let cache = paths
            .cache_dir
            .as_deref()
            .and_then(|dir| open_cache(dir, &paths.seed_files, &registry));

        Ok(Self {
            registry,
            pool,
            cache,
            ledger: Arc::new(Mutex::new(Ledger::new())),
            paths,
            poll_interval: Duration::from_millis(config.build.poll_interval_ms),
            cleanup: config.ledger.cleanup,
            dry_run: config.ledger.dry_run,
            history: CompileReport::default(),
            progress: None,
        })
    }

    /// Installs a callback invoked from the calling thread while a group
    /// drains, once per poll interval and once when the group finishes.
    pub fn set_progress<F>(&mut self, callback: F)
    where
        F: FnMut(&Progress) + 'static,
    {
        self.progress = Some(Box::new(callback));
    }

    /// Converts `files`, restoring from the cache where possible.
    ///
    /// Files no converter handles are skipped with a warning. Failures are
    /// logged and reported; they never abort the run.
    pub fn compile(&mut self, files: Vec<FileRecord>) -> CompileReport {
        let mut report = CompileReport::default();
        let mut groups: BTreeMap<usize, Vec<FileRecord>> = BTreeMap::new();
        for record in files {
            let source = record.source_path();
            match self.registry.position(&source) {
                Some(index) => groups.entry(index).or_default().push(record),
                None => {
                    tracing::warn!(file = %source.display(), "no converter for file");
                    report.skipped.push(source);
                }
            }
        }

        for (index, records) in groups {
            let converter = Arc::clone(self.registry.get(index));
            report.groups.push(self.compile_group(&converter, records));
        }

        self.store_in_cache(&report);
        report.log_failures();
        self.history.absorb(report.clone());
        report
    }

    /// Records that `output` must be deleted by the next cleanup.
    pub fn invalidate(&self, output: &Path) {
        self.ledger.lock().mark_for_removal(output);
    }

    /// Snapshot of the ledger records of this run.
    pub fn ledger(&self) -> Ledger {
        self.ledger.lock().clone()
    }

    /// The content cache, if enabled.
    pub fn cache(&self) -> Option<&ContentCache> {
        self.cache.as_ref()
    }

    /// The worker pool.
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Ends the run: cleans up stale outputs, then writes the ledger, the
    /// output list, the deleted-files list, and the run summary as
    /// configured.
    pub fn finish(mut self) -> Result<RunSummary, CompileError> {
        let mut ledger = std::mem::take(&mut *self.ledger.lock());
        let mut cleanup_report = None;

        match &self.paths.ledger_file {
            Some(file) if self.cleanup => {
                let options = CleanupOptions {
                    dry_run: self.dry_run,
                };
                let (trimmed, report) = cleanup::run(file, &ledger, options)?;
                tracing::info!(
                    stale = report.stale_outputs.len(),
                    deleted = report.deleted.len(),
                    failed = report.failed.len(),
                    dry_run = self.dry_run,
                    "cleanup finished"
                );
                ledger = trimmed;
                cleanup_report = Some(report);
            }
            Some(file) => ledger = cleanup::persist(file, &ledger)?,
            None => ledger.remove_duplicates(),
        }

        if let Some(path) = &self.paths.output_only_file {
            ledger.save_output_only(path)?;
        }
        if let (Some(path), Some(report)) = (&self.paths.deleted_list_file, &cleanup_report) {
            report.save_deleted_list(path)?;
        }

        let summary = RunSummary {
            succeeded: self.history.succeeded(),
            report: std::mem::take(&mut self.history),
            cache: self.cache.as_ref().map(ContentCache::stats),
            cleanup: cleanup_report.map(|report| CleanupSummary {
                stale: report.stale_outputs.len(),
                deleted: report.deleted.len(),
                failed: report.failed.len(),
                dry_run: self.dry_run,
            }),
            ledger_records: ledger.len(),
        };

        if let Some(path) = &self.paths.summary_file {
            write_summary(path, &summary)?;
        }
        Ok(summary)
    }

    fn compile_group(
        &mut self,
        converter: &Arc<dyn Converter>,
        records: Vec<FileRecord>,
    ) -> GroupReport {
        let started = Instant::now();
        let max_threads = if converter.supports_multithreading() {
            self.pool.worker_count()
        } else {
            1
        };
        let mut group = GroupReport::new(converter.name(), max_threads.min(records.len()).max(1));

        let pending = self.restore_from_cache(converter.as_ref(), records, &mut group);
        if !pending.is_empty() {
            let threads = max_threads.min(pending.len()).max(1);
            group.threads = threads;

            let results = self.drain(converter, pending, threads);
            group.converted.extend(results.converted);
            group.failed.extend(results.failed);

            let mut out_of_memory = results.out_of_memory;
            if !out_of_memory.is_empty() && threads > 1 {
                tracing::debug!(
                    converter = converter.name(),
                    files = out_of_memory.len(),
                    "retrying out-of-memory files single-threaded"
                );
                group.retried = out_of_memory.len();
                let retry = self.drain(converter, out_of_memory, 1);
                group.converted.extend(retry.converted);
                group.failed.extend(retry.failed);
                out_of_memory = retry.out_of_memory;
            }
            group.failed.extend(out_of_memory.into_iter().map(|record| FailedFile {
                record,
                reason: FailureReason::OutOfMemory,
            }));
        }

        group.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            converter = %group.converter,
            converted = group.converted.len(),
            restored = group.restored.len(),
            failed = group.failed.len(),
            elapsed_ms = group.elapsed_ms,
            "converter group finished"
        );
        group
    }

    /// Restores what the cache has and returns the files still to convert,
    /// with their cache keys set.
    fn restore_from_cache(
        &self,
        converter: &dyn Converter,
        records: Vec<FileRecord>,
        group: &mut GroupReport,
    ) -> Vec<FileRecord> {
        let Some(cache) = self.cache.as_ref().filter(|_| converter.is_cacheable()) else {
            return records;
        };

        let mut pending = Vec::with_capacity(records.len());
        for mut record in records {
            let source = record.source_path();
            let key = match CacheKey::for_file(&source) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(error = %e, "no cache key");
                    pending.push(record);
                    continue;
                }
            };
            record.digest = Some(key.as_str().to_string());

            match cache.restore(&key, &record.target_dir()) {
                Some(outputs) => {
                    let mut ledger = self.ledger.lock();
                    for output in &outputs {
                        ledger.add(&source, output);
                    }
                    drop(ledger);
                    group.restored.push(ConvertedFile { record, outputs });
                }
                None => pending.push(record),
            }
        }
        pending
    }

    /// Converts `records` with `threads` drain jobs and waits for them,
    /// reporting progress between polls.
    fn drain(
        &mut self,
        converter: &Arc<dyn Converter>,
        records: Vec<FileRecord>,
        threads: usize,
    ) -> BatchResults {
        let batch = Arc::new(Batch::new(records));
        let (done_tx, done_rx) = mpsc::channel();

        let mut group = JobGroup::new(move || {
            let _ = done_tx.send(());
        });
        for _ in 0..threads {
            let converter = Arc::clone(converter);
            let batch = Arc::clone(&batch);
            let ledger = Arc::clone(&self.ledger);
            group.push(move || drain_batch(converter.as_ref(), &batch, &ledger, threads));
        }
        group.submit(&self.pool);

        loop {
            match done_rx.recv_timeout(self.poll_interval) {
                Ok(()) => break,
                Err(RecvTimeoutError::Timeout) => self.notify_progress(converter.name(), &batch),
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!(
                        converter = converter.name(),
                        "drain jobs ended without signaling"
                    );
                    self.pool.wait_idle();
                    break;
                }
            }
        }
        self.notify_progress(converter.name(), &batch);
        batch.take_results()
    }

    fn notify_progress(&mut self, converter: &str, batch: &Batch) {
        let Some(callback) = self.progress.as_mut() else {
            return;
        };
        let progress = batch.progress();
        callback(&Progress {
            converter: converter.to_string(),
            total: batch.total(),
            finished: progress.converted + progress.failed + progress.out_of_memory,
            failed: progress.failed,
            in_flight: progress.in_flight,
        });
    }

    /// Stores the outputs of newly converted cacheable files, as recorded in
    /// the ledger. Failures only skip the insert.
    fn store_in_cache(&self, report: &CompileReport) {
        let Some(cache) = &self.cache else {
            return;
        };

        let entries: Vec<(CacheKey, Vec<PathBuf>)> = {
            let ledger = self.ledger.lock();
            report
                .converted()
                .filter_map(|file| {
                    let digest = file.record.digest.as_ref()?;
                    let outputs = ledger.output_files(&file.record.source_path());
                    // Restores land flat in the target directory.
                    let target = LedgerPath::new(&file.record.target_dir());
                    let flat = outputs
                        .iter()
                        .all(|o| o.parent().is_some_and(|p| LedgerPath::new(p) == target));
                    if !flat {
                        tracing::debug!(
                            file = %file.record.source_path().display(),
                            "not caching outputs outside the target directory"
                        );
                        return None;
                    }
                    Some((CacheKey::from_raw(digest.clone()), outputs))
                })
                .collect()
        };

        for (key, outputs) in entries {
            if let Err(e) = cache.insert(&key, &outputs) {
                tracing::warn!(key = %key, error = %e, "skipping cache insert");
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("converters", &self.registry)
            .field("pool", &self.pool)
            .field("cache", &self.cache.as_ref().map(ContentCache::root))
            .finish_non_exhaustive()
    }
}

/// Body of one drain job: converts queued files until the batch is empty.
fn drain_batch(converter: &dyn Converter, batch: &Batch, ledger: &Mutex<Ledger>, threads: usize) {
    let mut compiler = converter.create_compiler();
    while let Some(record) = batch.next_input() {
        let outcome = run_one(compiler.as_mut(), &record, threads);
        match &outcome {
            FileOutcome::Converted(outputs) => {
                let source = record.source_path();
                let mut ledger = ledger.lock();
                for output in outputs {
                    ledger.add(&source, output);
                }
            }
            // A compiler that panicked may hold broken state.
            FileOutcome::Failed(FailureReason::Panic(_)) => {
                compiler = converter.create_compiler();
            }
            _ => {}
        }
        batch.complete(record, outcome);
    }
}

/// Opens the cache under a seed that identifies the toolchain.
///
/// Without configured seed files the running executable stands in for the
/// toolchain binary. The crate version and converter names are always
/// folded in.
fn open_cache(
    dir: &Path,
    seed_files: &[PathBuf],
    registry: &ConverterRegistry,
) -> Option<ContentCache> {
    let names = registry.names().join(",");
    let identity: [&[u8]; 2] = [env!("CARGO_PKG_VERSION").as_bytes(), names.as_bytes()];

    if !seed_files.is_empty() {
        return match CacheSeed::from_toolchain(seed_files, &identity) {
            Ok(seed) => Some(ContentCache::open(dir, &seed)),
            Err(e) => {
                tracing::warn!(error = %e, "cache disabled: cannot compute toolchain seed");
                None
            }
        };
    }

    let seed = std::env::current_exe()
        .map_err(|e| e.to_string())
        .and_then(|exe| {
            CacheSeed::from_toolchain(&[exe], &identity).map_err(|e| e.to_string())
        })
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "seeding the cache without the executable");
            CacheSeed::from_bytes(&identity)
        });
    Some(ContentCache::open(dir, &seed))
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), CompileError> {
    let json = serde_json::to_string_pretty(summary)?;
    let io_err = |source| CompileError::Summary {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, json).map_err(io_err)
}
