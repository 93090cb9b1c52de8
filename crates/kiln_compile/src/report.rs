//! Run results and the JSON run summary.

use std::path::PathBuf;

use kiln_cache::CacheStats;
use serde::Serialize;

use crate::outcome::FailureReason;
use crate::record::FileRecord;

/// A file converted or restored from the cache, with its outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedFile {
    /// The source file.
    pub record: FileRecord,
    /// Files produced or restored.
    pub outputs: Vec<PathBuf>,
}

/// A file that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    /// The source file.
    pub record: FileRecord,
    /// Why the conversion failed.
    pub reason: FailureReason,
}

/// Results of one converter's group of files.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    /// Converter name.
    pub converter: String,
    /// Parallel jobs used for the first attempt.
    pub threads: usize,
    /// Files converted by a compiler.
    pub converted: Vec<ConvertedFile>,
    /// Files whose outputs were restored from the cache.
    pub restored: Vec<ConvertedFile>,
    /// Files that failed.
    pub failed: Vec<FailedFile>,
    /// Files retried single-threaded after running out of memory.
    pub retried: usize,
    /// Wall time spent on the group.
    pub elapsed_ms: u64,
}

impl GroupReport {
    pub(crate) fn new(converter: &str, threads: usize) -> Self {
        Self {
            converter: converter.to_string(),
            threads,
            converted: Vec::new(),
            restored: Vec::new(),
            failed: Vec::new(),
            retried: 0,
            elapsed_ms: 0,
        }
    }

    /// Files handed to this group.
    pub fn input_count(&self) -> usize {
        self.converted.len() + self.restored.len() + self.failed.len()
    }
}

/// Outcome of [`Orchestrator::compile`](crate::Orchestrator::compile).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompileReport {
    /// One entry per converter that had files, in registration order.
    pub groups: Vec<GroupReport>,
    /// Files no converter handles.
    pub skipped: Vec<PathBuf>,
}

impl CompileReport {
    /// `true` if at least one file was converted or restored, or there was
    /// nothing to convert.
    pub fn succeeded(&self) -> bool {
        self.input_count() == 0 || self.converted().count() + self.restored().count() > 0
    }

    /// Files handed to a converter.
    pub fn input_count(&self) -> usize {
        self.groups.iter().map(GroupReport::input_count).sum()
    }

    /// Files converted by a compiler.
    pub fn converted(&self) -> impl Iterator<Item = &ConvertedFile> {
        self.groups.iter().flat_map(|g| g.converted.iter())
    }

    /// Files restored from the cache.
    pub fn restored(&self) -> impl Iterator<Item = &ConvertedFile> {
        self.groups.iter().flat_map(|g| g.restored.iter())
    }

    /// Files that failed.
    pub fn failed(&self) -> impl Iterator<Item = &FailedFile> {
        self.groups.iter().flat_map(|g| g.failed.iter())
    }

    /// Logs every failed file.
    pub fn log_failures(&self) {
        for group in &self.groups {
            for file in &group.failed {
                tracing::error!(
                    converter = %group.converter,
                    file = %file.record.source_path().display(),
                    reason = %file.reason,
                    "conversion failed"
                );
            }
        }
    }

    pub(crate) fn absorb(&mut self, other: CompileReport) {
        self.groups.extend(other.groups);
        self.skipped.extend(other.skipped);
    }
}

/// Cleanup results as written to the run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    /// Outputs found stale.
    pub stale: usize,
    /// Outputs deleted.
    pub deleted: usize,
    /// Outputs that could not be deleted.
    pub failed: usize,
    /// Whether files were left in place.
    pub dry_run: bool,
}

/// Everything a run did, written as pretty JSON when configured.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Overall result, see [`CompileReport::succeeded`].
    pub succeeded: bool,
    /// Every compile of the run.
    pub report: CompileReport,
    /// Cache activity, when the cache was enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    /// Cleanup results, when cleanup ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupSummary>,
    /// Records in the persisted ledger.
    pub ledger_records: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converted(name: &str) -> ConvertedFile {
        ConvertedFile {
            record: FileRecord::new("/src", name, "/out"),
            outputs: vec![PathBuf::from(format!("/out/{name}.dds"))],
        }
    }

    fn failed(name: &str) -> FailedFile {
        FailedFile {
            record: FileRecord::new("/src", name, "/out"),
            reason: FailureReason::Error("bad".to_string()),
        }
    }

    #[test]
    fn empty_report_succeeds() {
        assert!(CompileReport::default().succeeded());
    }

    #[test]
    fn all_failed_does_not_succeed() {
        let mut group = GroupReport::new("texture", 2);
        group.failed.push(failed("a.tif"));
        let report = CompileReport {
            groups: vec![group],
            skipped: Vec::new(),
        };
        assert!(!report.succeeded());
        assert_eq!(report.failed().count(), 1);
    }

    #[test]
    fn one_restore_is_enough() {
        let mut group = GroupReport::new("texture", 2);
        group.failed.push(failed("a.tif"));
        group.restored.push(converted("b.tif"));
        let report = CompileReport {
            groups: vec![group],
            skipped: Vec::new(),
        };
        assert!(report.succeeded());
        assert_eq!(report.input_count(), 2);
    }

    #[test]
    fn skipped_files_alone_are_success() {
        let report = CompileReport {
            groups: Vec::new(),
            skipped: vec![PathBuf::from("/src/readme.txt")],
        };
        assert!(report.succeeded());
    }

    #[test]
    fn summary_serializes() {
        let mut group = GroupReport::new("texture", 1);
        group.converted.push(converted("a.tif"));
        group.failed.push(FailedFile {
            record: FileRecord::new("/src", "b.tif", "/out"),
            reason: FailureReason::OutOfMemory,
        });
        let summary = RunSummary {
            succeeded: true,
            report: CompileReport {
                groups: vec![group],
                skipped: Vec::new(),
            },
            cache: None,
            cleanup: Some(CleanupSummary::default()),
            ledger_records: 1,
        };
        let json: serde_json::Value = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["report"]["groups"][0]["converter"], "texture");
        assert_eq!(
            json["report"]["groups"][0]["failed"][0]["reason"]["kind"],
            "out_of_memory"
        );
        assert!(json.get("cache").is_none());
        assert_eq!(json["cleanup"]["deleted"], 0);
    }
}
