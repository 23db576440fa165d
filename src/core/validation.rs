//! Validation for item names and disk size literals
//!
//! Item names are validated once when they enter the tree (mkdir, incp,
//! cp, mv, image decode); afterwards the [`ItemName`] newtype carries the
//! guarantee.

use crate::core::error::{FsError, Result};
use regex::Regex;

/// Maximum length of an item name in bytes
pub const MAX_NAME_LEN: usize = 255;

/// A validated directory item name
///
/// # Rules
/// - 1 to 255 bytes
/// - No `/` and no NUL
/// - Not `.` or `..` (those are path navigation components)
///
/// # Examples
///
/// ```
/// use pfat_rs::core::validation::ItemName;
///
/// let name = ItemName::new("report.txt").unwrap();
/// assert_eq!(name.as_str(), "report.txt");
///
/// assert!(ItemName::new("a/b").is_err());
/// assert!(ItemName::new("..").is_err());
/// assert!(ItemName::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemName(String);

impl ItemName {
    /// Name given to the root directory at format time
    pub const ROOT: &'static str = "root";

    /// Create a new validated name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate_name(&name)?;
        Ok(ItemName(name))
    }

    pub(crate) fn root() -> Self {
        ItemName(Self::ROOT.to_string())
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(FsError::InvalidName("name cannot be empty".to_string()));
        }

        if name.len() > MAX_NAME_LEN {
            return Err(FsError::InvalidName(format!(
                "name too long ({} bytes, max {})",
                name.len(),
                MAX_NAME_LEN
            )));
        }

        if name == "." || name == ".." {
            return Err(FsError::InvalidName(format!("'{}' is reserved", name)));
        }

        if name.contains('/') || name.contains('\0') {
            return Err(FsError::InvalidName(format!(
                "'{}' contains '/' or NUL",
                name
            )));
        }

        Ok(())
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ItemName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ItemName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl std::fmt::Display for ItemName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a disk size literal such as `10MB`
///
/// Accepts `KB`, `MB` and `GB` suffixes (binary multiples). The result
/// must be positive and fit in a `u32`.
///
/// # Examples
///
/// ```
/// use pfat_rs::core::validation::parse_disk_size;
///
/// assert_eq!(parse_disk_size("1MB").unwrap(), 1024 * 1024);
/// assert_eq!(parse_disk_size("64KB").unwrap(), 64 * 1024);
/// assert!(parse_disk_size("10").is_err());
/// assert!(parse_disk_size("0MB").is_err());
/// ```
pub fn parse_disk_size(literal: &str) -> Result<u32> {
    const PATTERN: &str = r"^(\d{1,10})([KMG])B$";

    let re = Regex::new(PATTERN).map_err(|e| FsError::InvalidDiskSize(e.to_string()))?;
    let caps = re.captures(literal.trim()).ok_or_else(|| {
        FsError::InvalidDiskSize(format!(
            "'{}' (expected <N>KB, <N>MB or <N>GB)",
            literal
        ))
    })?;

    let count: u64 = caps[1]
        .parse()
        .map_err(|_| FsError::InvalidDiskSize(literal.to_string()))?;
    let unit: u64 = match &caps[2] {
        "K" => 1024,
        "M" => 1024 * 1024,
        _ => 1024 * 1024 * 1024,
    };

    let bytes = count * unit;
    if bytes == 0 || bytes > u32::MAX as u64 {
        return Err(FsError::InvalidDiskSize(format!(
            "'{}' is out of range",
            literal
        )));
    }

    Ok(bytes as u32)
}

/// Split a path into its parent part and final component
///
/// A trailing slash is ignored. The parent of a single absolute component
/// (`/name`) is `/`; the parent of a bare name is the empty path.
pub fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };

    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["a", "f.bin", "with space", "UPPER", "dots.in.name", "..."] {
            assert!(ItemName::new(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", ".", "..", "a/b", "/", "nul\0byte"] {
            assert!(
                matches!(ItemName::new(name), Err(FsError::InvalidName(_))),
                "{:?} should be invalid",
                name
            );
        }
    }

    #[test]
    fn test_name_length_limit() {
        assert!(ItemName::new("x".repeat(MAX_NAME_LEN)).is_ok());
        assert!(ItemName::new("x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_parse_disk_size_units() {
        assert_eq!(parse_disk_size("1KB").unwrap(), 1024);
        assert_eq!(parse_disk_size("10MB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_disk_size("1GB").unwrap(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_disk_size_rejects_garbage() {
        for literal in ["", "MB", "10mb", "-1MB", "1.5MB", "10 MB", "4GB", "99999999999MB"] {
            assert!(
                matches!(parse_disk_size(literal), Err(FsError::InvalidDiskSize(_))),
                "{:?} should be rejected",
                literal
            );
        }
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/c.bin"), ("/", "c.bin"));
        assert_eq!(split_parent("/a/b/f.bin"), ("/a/b", "f.bin"));
        assert_eq!(split_parent("a/f"), ("a", "f"));
        assert_eq!(split_parent("f"), ("", "f"));
        assert_eq!(split_parent("a/b/"), ("a", "b"));
        assert_eq!(split_parent("/"), ("/", ""));
    }
}
