//! The in-memory ledger and its line-oriented persistence.

use std::path::{Path, PathBuf};

use kiln_common::path_key;

use crate::entry::DependencyEntry;
use crate::error::LedgerError;

/// Ordered collection of input→output records.
///
/// Appends are cheap and unordered. [`remove_duplicates`](Self::remove_duplicates)
/// sorts by `(input, output)` and collapses exact duplicates; while the ledger
/// stays in that state, lookups by input use binary search.
#[derive(Debug, Clone)]
pub struct Ledger {
    entries: Vec<DependencyEntry>,
    deduplicated: bool,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            deduplicated: true,
        }
    }

    /// Appends a normalized `input → output` record.
    pub fn add(&mut self, input: &Path, output: &Path) {
        self.push(DependencyEntry::new(input, output));
    }

    /// Appends a "marked for removal" pseudo-record for `output`.
    pub fn mark_for_removal(&mut self, output: &Path) {
        self.push(DependencyEntry::marked_for_removal(output));
    }

    /// Appends an already-built record.
    pub fn push(&mut self, entry: DependencyEntry) {
        self.entries.push(entry);
        self.deduplicated = false;
    }

    /// Appends every record of `other`.
    pub fn merge(&mut self, other: &Ledger) {
        if other.entries.is_empty() {
            return;
        }
        self.entries.extend(other.entries.iter().cloned());
        self.deduplicated = false;
    }

    /// Sorts the records and collapses exact duplicates. Idempotent.
    ///
    /// Among duplicates the first-recorded spelling survives.
    pub fn remove_duplicates(&mut self) {
        if self.deduplicated {
            return;
        }
        self.entries.sort();
        self.entries.dedup();
        self.deduplicated = true;
    }

    /// Returns `true` while the ledger is sorted and duplicate-free.
    pub fn is_deduplicated(&self) -> bool {
        self.deduplicated
    }

    /// Returns every output recorded for `input`.
    pub fn output_files(&self, input: &Path) -> Vec<PathBuf> {
        let key = path_key(input);
        if key.is_empty() {
            return Vec::new();
        }
        if self.deduplicated {
            let start = self
                .entries
                .partition_point(|e| e.input().key() < key.as_str());
            self.entries[start..]
                .iter()
                .take_while(|e| e.input().key() == key)
                .map(|e| e.output().path().to_path_buf())
                .collect()
        } else {
            self.entries
                .iter()
                .filter(|e| e.input().key() == key)
                .map(|e| e.output().path().to_path_buf())
                .collect()
        }
    }

    /// Removes every record whose input matches one of `inputs`.
    ///
    /// Returns the number of records removed.
    pub fn remove_input_files<P: AsRef<Path>>(&mut self, inputs: &[P]) -> usize {
        let keys: std::collections::HashSet<String> =
            inputs.iter().map(|p| path_key(p.as_ref())).collect();
        let before = self.entries.len();
        self.entries.retain(|e| !keys.contains(e.input().key()));
        before - self.entries.len()
    }

    /// Keeps only the records for which `keep` returns `true`.
    pub fn retain<F: FnMut(&DependencyEntry) -> bool>(&mut self, keep: F) {
        self.entries.retain(keep);
    }

    /// Iterates over the records in their current order.
    pub fn iter(&self) -> impl Iterator<Item = &DependencyEntry> {
        self.entries.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the ledger holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses persisted `input=output` lines, skipping malformed ones.
    pub fn parse(content: &str) -> Self {
        let mut ledger = Self::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match DependencyEntry::parse_line(line) {
                Some(entry) => ledger.push(entry),
                None => tracing::warn!(line = number + 1, "skipping malformed ledger line"),
            }
        }
        ledger
    }

    /// Loads a persisted ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let content = std::fs::read_to_string(path).map_err(|e| LedgerError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::parse(&content))
    }

    /// Persists the ledger as one `input=output` line per record.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(&entry.to_line());
            text.push('\n');
        }
        write_text(path, &text)
    }

    /// Persists only the output side: one produced file per line.
    ///
    /// Pseudo-records marked for removal are not outputs of this run and are
    /// left out; repeated outputs are written once.
    pub fn save_output_only(&self, path: &Path) -> Result<(), LedgerError> {
        let mut seen = std::collections::HashSet::new();
        let mut text = String::new();
        for entry in self.entries.iter().filter(|e| !e.is_marked_for_removal()) {
            if seen.insert(entry.output().key()) {
                text.push_str(&entry.output().to_string());
                text.push('\n');
            }
        }
        write_text(path, &text)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `text` to `path`, creating parent directories.
pub(crate) fn write_text(path: &Path, text: &str) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LedgerError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, text).map_err(|e| LedgerError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
