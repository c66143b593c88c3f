//! Entry name rules and path splitting.

use thiserror::Error;

/// Path separator for entry paths.
pub const SEPARATOR: char = '/';

/// Longest entry name accepted by default, in bytes.
pub const DEFAULT_MAX_NAME_LEN: usize = 255;

/// Why a name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name '{0}' is reserved")]
    Reserved(String),
    #[error("name '{0}' contains a path separator")]
    ContainsSeparator(String),
    #[error("name contains a NUL byte")]
    ContainsNul,
    #[error("name is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },
}

/// Check that `name` is usable as a single entry name.
pub fn validate_name(name: &str, max_len: usize) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name == "." || name == ".." {
        return Err(NameError::Reserved(name.to_string()));
    }
    if name.contains(SEPARATOR) {
        return Err(NameError::ContainsSeparator(name.to_string()));
    }
    if name.contains('\0') {
        return Err(NameError::ContainsNul);
    }
    if name.len() > max_len {
        return Err(NameError::TooLong {
            len: name.len(),
            max: max_len,
        });
    }
    Ok(())
}

/// Split a `/`-separated path into segments, dropping empty and `.` parts.
///
/// `..` is kept: resolving it needs the graph, which this crate doesn't have.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(SEPARATOR)
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("report.txt", DEFAULT_MAX_NAME_LEN).is_ok());
        assert!(validate_name(".hidden", DEFAULT_MAX_NAME_LEN).is_ok());
        assert!(validate_name("日本語", DEFAULT_MAX_NAME_LEN).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(validate_name("", 255), Err(NameError::Empty));
        assert!(matches!(validate_name("..", 255), Err(NameError::Reserved(_))));
        assert!(matches!(
            validate_name("work/2024", 255),
            Err(NameError::ContainsSeparator(_))
        ));
        assert_eq!(validate_name("a\0b", 255), Err(NameError::ContainsNul));
        assert_eq!(
            validate_name("abcdef", 4),
            Err(NameError::TooLong { len: 6, max: 4 })
        );
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/docs/work/2024"), vec!["docs", "work", "2024"]);
        assert_eq!(split_path("docs//./work/"), vec!["docs", "work"]);
        assert!(split_path("/").is_empty());
        assert_eq!(split_path("a/../b"), vec!["a", "..", "b"]);
    }
}
