//! In-archive path handling.
//!
//! Paths arriving from the selection layer are display paths: they may
//! carry a leading separator, percent-encoded characters and doubled
//! slashes. [`ArchivePath`] normalizes them into the form written into the
//! archive's headers and validates that the result cannot escape the
//! archive root.

use crate::{Error, Result};
use std::fmt;

/// A normalized, validated in-archive path.
///
/// Construction guarantees:
/// - forward-slash separators, no leading or trailing slash
/// - percent-encoding decoded
/// - no empty segments (doubled slashes are collapsed)
/// - no `.` or `..` segments (prevents path traversal on extraction)
///
/// # Examples
///
/// ```
/// use volzip::ArchivePath;
///
/// let path = ArchivePath::new("/dataset%201/image.tif").unwrap();
/// assert_eq!(path.as_str(), "dataset 1/image.tif");
///
/// assert!(ArchivePath::new("../escape").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Creates a normalized archive path from a raw display path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchivePath`] when the decoded path is empty
    /// or contains `.`/`..` segments.
    pub fn new(raw: &str) -> Result<Self> {
        let decoded = decode(raw)?;
        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            if segment.is_empty() {
                continue; // collapse doubled and leading slashes
            }
            if segment == "." || segment == ".." {
                return Err(Error::InvalidArchivePath(format!(
                    "'{segment}' segment not allowed in '{raw}'"
                )));
            }
            segments.push(segment);
        }
        if segments.is_empty() {
            return Err(Error::InvalidArchivePath(format!(
                "path '{raw}' is empty after normalization"
            )));
        }
        Ok(Self(segments.join("/")))
    }

    /// Builds the archive path for a file: the entry's directory path (may
    /// be empty) joined with the file name taken from its URL. The joined
    /// path is percent-decoded exactly once, by [`ArchivePath::new`].
    pub fn from_dir_and_url(dir: &str, url: &str) -> Result<Self> {
        let filename = basename(url);
        let trimmed = dir.trim_matches('/');
        if trimmed.is_empty() {
            Self::new(&filename)
        } else {
            Self::new(&format!("{trimmed}/{filename}"))
        }
    }

    /// Returns the path as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the file name (last segment) of this path.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns the percent-decoded final path component of a URL.
///
/// Used both for in-archive entry names and for the standalone filename of
/// an oversized download.
pub fn decoded_basename(url: &str) -> String {
    let name = basename(url);
    decode(&name).unwrap_or(name)
}

fn basename(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

fn decode(s: &str) -> Result<String> {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .map_err(|e| Error::InvalidArchivePath(format!("invalid percent-encoding in '{s}': {e}")))
}
