//! Path normalization shared by the dependency ledger and the cache.
//!
//! Equivalent spellings of the same file (relative vs. absolute, `/` vs. `\`,
//! `a/./b` vs. `a/b`, differing letter case) must collide when used as keys.

use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};

/// Returns `path` made absolute, lexically cleaned, with native separators.
///
/// Both `/` and `\` are treated as separators. No file-system access is
/// performed apart from reading the current directory for relative input.
/// Letter case is preserved; use [`path_key`] for comparisons.
pub fn normalize_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw.is_empty() {
        return PathBuf::new();
    }
    let native = PathBuf::from(raw.replace(['/', '\\'], MAIN_SEPARATOR_STR));
    let absolute = std::path::absolute(&native).unwrap_or(native);

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(cleaned.components().next_back(), Some(Component::Normal(_))) {
                    cleaned.pop();
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Returns the comparison key of `path`: normalized and case-folded.
///
/// Two paths refer to the same ledger or cache entry exactly when their keys
/// are equal. The empty path keys to the empty string.
pub fn path_key(path: &Path) -> String {
    normalize_path(path).to_string_lossy().to_lowercase()
}

/// Replaces characters that are unsafe in a file name with `_`.
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_becomes_absolute() {
        let normalized = normalize_path(Path::new("assets/rock.tif"));
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("assets/rock.tif"));
    }

    #[test]
    fn dot_components_are_removed() {
        let a = normalize_path(Path::new("/src/./textures/../a.tif"));
        let b = normalize_path(Path::new("/src/a.tif"));
        assert_eq!(a, b);
    }

    #[test]
    fn mixed_separators_collide() {
        assert_eq!(
            path_key(Path::new("/src/textures\\a.tif")),
            path_key(Path::new("/src/textures/a.tif"))
        );
    }

    #[test]
    fn case_is_folded_in_keys_only() {
        let spelled = normalize_path(Path::new("/Src/Rock.TIF"));
        assert!(spelled.to_string_lossy().contains("Rock.TIF"));
        assert_eq!(
            path_key(Path::new("/Src/Rock.TIF")),
            path_key(Path::new("/src/rock.tif"))
        );
    }

    #[test]
    fn empty_path_stays_empty() {
        assert_eq!(normalize_path(Path::new("")), PathBuf::new());
        assert_eq!(path_key(Path::new("")), "");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_file_name("rock face#2.tif"), "rock_face_2.tif");
        assert_eq!(sanitize_file_name("a-b_c.dds"), "a-b_c.dds");
        assert_eq!(sanitize_file_name("x:y/z"), "x_y_z");
    }
}
