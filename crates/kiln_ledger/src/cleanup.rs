//! Incremental cleanup of stale outputs.
//!
//! At the end of a run the prior persisted ledger is merged with the records
//! of the current run. Every record whose input no longer exists, or that was
//! marked for removal, is dropped and its output deleted, unless a live
//! record still claims the same output.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::LedgerError;
use crate::ledger::{write_text, Ledger};

/// Options controlling a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Report stale outputs but leave files and records in place.
    pub dry_run: bool,
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Outputs found stale, whether or not they were deleted.
    pub stale_outputs: Vec<PathBuf>,
    /// Outputs actually removed from disk.
    pub deleted: Vec<PathBuf>,
    /// Outputs that could not be removed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Records left in the ledger after trimming.
    pub retained_records: usize,
}

impl CleanupReport {
    /// Writes the deleted-files list, one path per line.
    pub fn save_deleted_list(&self, path: &Path) -> Result<(), LedgerError> {
        let mut text = String::new();
        for file in &self.deleted {
            text.push_str(&file.display().to_string());
            text.push('\n');
        }
        write_text(path, &text)
    }
}

/// Runs a full cleanup against the ledger persisted at `ledger_file`.
///
/// The prior ledger is loaded (a missing or unreadable file counts as empty),
/// merged with `current`, trimmed with [`trim`] using on-disk existence of
/// inputs, and written back. Returns the trimmed ledger and the report.
pub fn run(
    ledger_file: &Path,
    current: &Ledger,
    options: CleanupOptions,
) -> Result<(Ledger, CleanupReport), LedgerError> {
    let merged = merge_with_prior(ledger_file, current);
    let (trimmed, report) = trim(merged, |input| input.exists(), options);
    trimmed.save(ledger_file)?;
    Ok((trimmed, report))
}

/// Merges `current` into the ledger persisted at `ledger_file` and writes it
/// back without trimming.
///
/// Records of sources not compiled in this run are carried forward, so a
/// later [`run`] can still remove their outputs.
pub fn persist(ledger_file: &Path, current: &Ledger) -> Result<Ledger, LedgerError> {
    let mut merged = merge_with_prior(ledger_file, current);
    merged.remove_duplicates();
    merged.save(ledger_file)?;
    Ok(merged)
}

/// Loads the prior ledger, treating a missing or unreadable file as empty,
/// and appends `current`.
fn merge_with_prior(ledger_file: &Path, current: &Ledger) -> Ledger {
    let mut merged = match Ledger::load(ledger_file) {
        Ok(prior) => prior,
        Err(e) => {
            if !e.is_not_found() {
                tracing::warn!(error = %e, "ignoring unreadable prior ledger");
            }
            Ledger::new()
        }
    };
    merged.merge(current);
    merged
}

/// Trims stale records from `ledger` and deletes their outputs.
///
/// A record is stale when it is marked for removal or `input_exists` returns
/// `false` for its input. Its output is deleted only if no live record
/// produces the same file.
pub fn trim<F>(
    mut ledger: Ledger,
    input_exists: F,
    options: CleanupOptions,
) -> (Ledger, CleanupReport)
where
    F: Fn(&Path) -> bool,
{
    ledger.remove_duplicates();

    let mut live_inputs: HashSet<String> = HashSet::new();
    let mut stale_inputs: HashSet<String> = HashSet::new();
    for entry in ledger.iter().filter(|e| !e.is_marked_for_removal()) {
        let key = entry.input().key();
        if live_inputs.contains(key) || stale_inputs.contains(key) {
            continue;
        }
        if input_exists(entry.input().path()) {
            live_inputs.insert(key.to_string());
        } else {
            stale_inputs.insert(key.to_string());
        }
    }
    let is_stale = |input_key: &str| input_key.is_empty() || stale_inputs.contains(input_key);

    let mut report = CleanupReport::default();
    {
        let claimed: HashSet<&str> = ledger
            .iter()
            .filter(|e| !is_stale(e.input().key()))
            .map(|e| e.output().key())
            .collect();
        let mut scheduled: HashSet<&str> = HashSet::new();
        for entry in ledger.iter().filter(|e| is_stale(e.input().key())) {
            let output = entry.output();
            if claimed.contains(output.key()) || !scheduled.insert(output.key()) {
                continue;
            }
            report.stale_outputs.push(output.path().to_path_buf());
        }
    }

    if options.dry_run {
        for path in &report.stale_outputs {
            tracing::info!(path = %path.display(), "would delete stale output");
        }
        report.retained_records = ledger.len();
        return (ledger, report);
    }

    for path in &report.stale_outputs {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "deleted stale output");
                report.deleted.push(path.clone());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete stale output");
                report.failed.push((path.clone(), e.to_string()));
            }
        }
    }

    ledger.retain(|e| !is_stale(e.input().key()));
    report.retained_records = ledger.len();
    (ledger, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn vanished_input_deletes_output() {
        let dir = tempfile::tempdir().unwrap();
        let kept_src = dir.path().join("src/kept.tif");
        let gone_src = dir.path().join("src/gone.tif");
        let kept_out = dir.path().join("out/kept.dds");
        let gone_out = dir.path().join("out/gone.dds");
        touch(&kept_src);
        touch(&kept_out);
        touch(&gone_out);

        let mut ledger = Ledger::new();
        ledger.add(&kept_src, &kept_out);
        ledger.add(&gone_src, &gone_out);

        let (trimmed, report) = trim(ledger, |p| p.exists(), CleanupOptions::default());
        assert_eq!(report.deleted.len(), 1);
        assert!(!gone_out.exists());
        assert!(kept_out.exists());
        assert_eq!(trimmed.len(), 1);
        assert_eq!(report.retained_records, 1);
    }

    #[test]
    fn marked_for_removal_deletes_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out/invalidated.dds");
        touch(&out);

        let mut ledger = Ledger::new();
        ledger.mark_for_removal(&out);

        let (trimmed, report) = trim(ledger, |_| true, CleanupOptions::default());
        assert_eq!(report.deleted, vec![kiln_common::normalize_path(&out)]);
        assert!(!out.exists());
        assert!(trimmed.is_empty());
    }

    #[test]
    fn output_claimed_by_live_record_survives() {
        let dir = tempfile::tempdir().unwrap();
        let live_src = dir.path().join("src/live.tif");
        let shared_out = dir.path().join("out/shared.dds");
        touch(&live_src);
        touch(&shared_out);

        let mut ledger = Ledger::new();
        ledger.add(&live_src, &shared_out);
        ledger.add(&dir.path().join("src/gone.tif"), &shared_out);
        ledger.mark_for_removal(&shared_out);

        let (trimmed, report) = trim(ledger, |p| p.exists(), CleanupOptions::default());
        assert!(report.stale_outputs.is_empty());
        assert!(shared_out.exists());
        assert_eq!(trimmed.len(), 1);
    }

    #[test]
    fn dry_run_keeps_files_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out/gone.dds");
        touch(&out);

        let mut ledger = Ledger::new();
        ledger.add(&dir.path().join("src/gone.tif"), &out);

        let (trimmed, report) = trim(ledger, |p| p.exists(), CleanupOptions { dry_run: true });
        assert_eq!(report.stale_outputs.len(), 1);
        assert!(report.deleted.is_empty());
        assert!(out.exists());
        assert_eq!(trimmed.len(), 1);
    }

    #[test]
    fn already_missing_output_is_not_a_failure() {
        let mut ledger = Ledger::new();
        ledger.add(Path::new("/nonexistent/src/a.tif"), Path::new("/nonexistent/out/a.dds"));
        let (trimmed, report) = trim(ledger, |p| p.exists(), CleanupOptions::default());
        assert_eq!(report.stale_outputs.len(), 1);
        assert!(report.deleted.is_empty());
        assert!(report.failed.is_empty());
        assert!(trimmed.is_empty());
    }

    #[test]
    fn run_merges_prior_ledger_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_file = dir.path().join("kiln-deps.txt");
        let old_src = dir.path().join("src/old.tif");
        let old_out = dir.path().join("out/old.dds");
        let new_src = dir.path().join("src/new.tif");
        let new_out = dir.path().join("out/new.dds");
        touch(&old_out);
        touch(&new_src);
        touch(&new_out);

        let mut prior = Ledger::new();
        prior.add(&old_src, &old_out);
        prior.save(&ledger_file).unwrap();

        let mut current = Ledger::new();
        current.add(&new_src, &new_out);

        let (trimmed, report) = run(&ledger_file, &current, CleanupOptions::default()).unwrap();
        assert_eq!(report.deleted.len(), 1);
        assert!(!old_out.exists());
        assert_eq!(trimmed.len(), 1);

        let persisted = Ledger::load(&ledger_file).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted.output_files(&new_src).len(), 1);
    }

    #[test]
    fn persist_carries_prior_records_forward() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_file = dir.path().join("kiln-deps.txt");
        let gone_src = dir.path().join("src/gone.tif");
        let gone_out = dir.path().join("out/gone.dds");
        touch(&gone_out);

        let mut prior = Ledger::new();
        prior.add(&gone_src, &gone_out);
        prior.add(&dir.path().join("src/a.tif"), &dir.path().join("out/a.dds"));
        prior.save(&ledger_file).unwrap();

        let mut current = Ledger::new();
        current.add(&dir.path().join("src/A.TIF"), &dir.path().join("out/a.dds"));

        let merged = persist(&ledger_file, &current).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(gone_out.exists(), "persisting never deletes");

        let persisted = Ledger::load(&ledger_file).unwrap();
        assert_eq!(persisted.output_files(&gone_src), [gone_out.clone()]);

        let (_, report) = run(&ledger_file, &Ledger::new(), CleanupOptions::default()).unwrap();
        assert_eq!(report.deleted, [gone_out.clone()]);
        assert!(!gone_out.exists());
    }

    #[test]
    fn run_without_prior_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_file = dir.path().join("kiln-deps.txt");
        let src = dir.path().join("a.tif");
        touch(&src);
        let mut current = Ledger::new();
        current.add(&src, &dir.path().join("a.dds"));

        let (trimmed, report) = run(&ledger_file, &current, CleanupOptions::default()).unwrap();
        assert!(report.stale_outputs.is_empty());
        assert_eq!(trimmed.len(), 1);
        assert!(ledger_file.exists());
    }

    #[test]
    fn deleted_list_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("deleted.txt");
        let report = CleanupReport {
            deleted: vec![PathBuf::from("/out/a.dds"), PathBuf::from("/out/b.dds")],
            ..CleanupReport::default()
        };
        report.save_deleted_list(&list).unwrap();
        let text = std::fs::read_to_string(&list).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
