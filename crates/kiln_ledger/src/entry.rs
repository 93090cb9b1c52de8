//! Ledger records and their normalized paths.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use kiln_common::{normalize_path, path_key};

/// Separator between input and output in a persisted ledger line.
pub const LINE_SEPARATOR: char = '=';

/// A path as stored in the ledger.
///
/// Equality, ordering and hashing use the case-folded key, so differently
/// spelled references to one file collide. The normalized spelling is kept
/// for file-system access on case-sensitive systems.
#[derive(Clone)]
pub struct LedgerPath {
    path: PathBuf,
    key: String,
}

impl LedgerPath {
    /// Normalizes `path`. The empty path stays empty.
    pub fn new(path: &Path) -> Self {
        Self {
            path: normalize_path(path),
            key: path_key(path),
        }
    }

    /// The empty path, used as the input of "marked for removal" records.
    pub fn empty() -> Self {
        Self {
            path: PathBuf::new(),
            key: String::new(),
        }
    }

    /// The normalized path, with the letter case it was first recorded with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The comparison key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `true` for the empty path.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl PartialEq for LedgerPath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for LedgerPath {}

impl PartialOrd for LedgerPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LedgerPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Hash for LedgerPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for LedgerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.path)
    }
}

impl fmt::Display for LedgerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// One input→output record.
///
/// Records order by `(input, output)`. A record with an empty input marks its
/// output for removal at the next cleanup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyEntry {
    input: LedgerPath,
    output: LedgerPath,
}

impl DependencyEntry {
    /// Creates a normalized record.
    pub fn new(input: &Path, output: &Path) -> Self {
        Self {
            input: LedgerPath::new(input),
            output: LedgerPath::new(output),
        }
    }

    /// Creates a "marked for removal" pseudo-record for `output`.
    pub fn marked_for_removal(output: &Path) -> Self {
        Self {
            input: LedgerPath::empty(),
            output: LedgerPath::new(output),
        }
    }

    /// The source side of the record.
    pub fn input(&self) -> &LedgerPath {
        &self.input
    }

    /// The produced file.
    pub fn output(&self) -> &LedgerPath {
        &self.output
    }

    /// Returns `true` for pseudo-records created by [`Self::marked_for_removal`].
    pub fn is_marked_for_removal(&self) -> bool {
        self.input.is_empty()
    }

    /// Formats the record as one persisted `input=output` line (no newline).
    ///
    /// `\\`, `=`, and line breaks inside either path are backslash-escaped.
    pub fn to_line(&self) -> String {
        let mut line = escape(&self.input.to_string());
        line.push(LINE_SEPARATOR);
        line.push_str(&escape(&self.output.to_string()));
        line
    }

    /// Parses one persisted line. Returns `None` for blank or malformed lines.
    ///
    /// The first unescaped `=` separates input from output.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (input, output) = split_unescaped(line)?;
        if output.is_empty() {
            return None;
        }
        if input.is_empty() {
            return Some(Self::marked_for_removal(Path::new(&output)));
        }
        Some(Self::new(Path::new(&input), Path::new(&output)))
    }
}

fn escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            LINE_SEPARATOR => out.push_str("\\="),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Unescapes `line` and splits it at the first unescaped separator.
///
/// A backslash before any other character is kept as is, so lines written
/// with bare Windows separators still load.
fn split_unescaped(line: &str) -> Option<(String, String)> {
    let mut input = String::new();
    let mut output = String::new();
    let mut current = &mut input;
    let mut separated = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek().copied() {
                Some(next @ ('\\' | LINE_SEPARATOR)) => {
                    current.push(next);
                    chars.next();
                }
                Some('n') => {
                    current.push('\n');
                    chars.next();
                }
                Some('r') => {
                    current.push('\r');
                    chars.next();
                }
                _ => current.push('\\'),
            },
            LINE_SEPARATOR if !separated => {
                separated = true;
                current = &mut output;
            }
            c => current.push(c),
        }
    }
    separated.then_some((input, output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_spellings_are_equal() {
        let a = DependencyEntry::new(Path::new("/src/A.tif"), Path::new("/out/a.dds"));
        let b = DependencyEntry::new(Path::new("\\src\\a.TIF"), Path::new("/out/./a.dds"));
        assert_eq!(a, b);
    }

    #[test]
    fn original_spelling_is_kept() {
        let entry = DependencyEntry::new(Path::new("/src/Rock.tif"), Path::new("/out/Rock.dds"));
        assert!(entry.output().path().ends_with("Rock.dds"));
        assert_eq!(entry.output().key(), path_key(Path::new("/out/rock.dds")));
    }

    #[test]
    fn line_roundtrip() {
        let entry = DependencyEntry::new(Path::new("/src/a.tif"), Path::new("/out/a.dds"));
        let line = entry.to_line();
        assert!(line.contains('='));
        assert_eq!(DependencyEntry::parse_line(&line), Some(entry));
    }

    #[test]
    fn separator_inside_paths_roundtrips() {
        let entry = DependencyEntry::new(
            Path::new("/src/lod=1/a.tif"),
            Path::new("/out/lod=1/a.dds"),
        );
        let line = entry.to_line();
        let parsed = DependencyEntry::parse_line(&line).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.input().path(), entry.input().path());
        assert_eq!(parsed.output().path(), entry.output().path());
    }

    #[test]
    fn escaped_characters_roundtrip() {
        let entry = DependencyEntry::new(
            Path::new("/src/odd\\=name\nhere.tif"),
            Path::new("/out/odd.dds"),
        );
        let line = entry.to_line();
        assert!(!line.contains('\n'));
        let parsed = DependencyEntry::parse_line(&line).unwrap();
        assert_eq!(parsed.input().path(), entry.input().path());
    }

    #[test]
    fn marked_for_removal_roundtrip() {
        let entry = DependencyEntry::marked_for_removal(Path::new("/out/old.dds"));
        assert!(entry.is_marked_for_removal());
        let line = entry.to_line();
        assert!(line.starts_with('='));
        let parsed = DependencyEntry::parse_line(&line).unwrap();
        assert!(parsed.is_marked_for_removal());
        assert_eq!(parsed, entry);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(DependencyEntry::parse_line("").is_none());
        assert!(DependencyEntry::parse_line("no separator here").is_none());
        assert!(DependencyEntry::parse_line("/src/a.tif=").is_none());
    }

    #[test]
    fn windows_line_endings_are_tolerated() {
        let parsed = DependencyEntry::parse_line("/src/a.tif=/out/a.dds\r").unwrap();
        assert!(parsed.output().path().ends_with("a.dds"));
    }

    #[test]
    fn ordering_is_input_then_output() {
        let a = DependencyEntry::new(Path::new("/src/a.tif"), Path::new("/out/z.dds"));
        let b = DependencyEntry::new(Path::new("/src/b.tif"), Path::new("/out/a.dds"));
        assert!(a < b);
    }
}
