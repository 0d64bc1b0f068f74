//! Manifest construction: deduplicated, companion-aware file entries.
//!
//! The selection layer hands over three parallel arrays (content URLs,
//! metadata URLs, display paths). [`build`] turns them into [`FileEntry`]
//! values, attaching companion files detected by naming convention and
//! collapsing rows that reference the same content file.

use regex::Regex;

use crate::size_cache::SizeCache;
use crate::{Error, Result};

/// One selected file with its metadata and optional companion.
///
/// Identity is by `content_url`: two entries with the same content URL are
/// the same logical file regardless of which selection row produced them
/// (multi-signal datasets may reference a shared file). Duplicate rows are
/// assumed to carry identical metadata and companion URLs; this is a
/// documented assumption, not validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// URL of the data file itself.
    pub content_url: String,
    /// URL of the per-file metadata document.
    pub metadata_url: String,
    /// URL of a companion artifact, present only when detected by naming
    /// convention and confirmed to exist via the size cache.
    pub companion_url: Option<String>,
    /// Destination directory path inside the archive (raw display form).
    pub path: String,
}

/// Naming convention linking a primary data file to its companion.
///
/// A content URL matching `{stem}_{digits}.{primary_ext}` implies a
/// companion at `{stem}.{companion_ext}`. The default rule pairs
/// instrument `.ser` series files with their shared `.emi` sidecar:
///
/// ```
/// use volzip::CompanionRule;
///
/// let rule = CompanionRule::default();
/// assert_eq!(
///     rule.derive("http://files/r/sample_0001.ser").as_deref(),
///     Some("http://files/r/sample.emi"),
/// );
/// assert_eq!(rule.derive("http://files/r/sample.tif"), None);
/// ```
#[derive(Debug, Clone)]
pub struct CompanionRule {
    companion_ext: String,
    pattern: Regex,
}

impl CompanionRule {
    /// Creates a rule pairing `{stem}_{digits}.{primary_ext}` with
    /// `{stem}.{companion_ext}`.
    pub fn new(primary_ext: &str, companion_ext: &str) -> Self {
        let pattern = Regex::new(&format!(
            r"^(?P<stem>.*)_[0-9]+\.{}$",
            regex::escape(primary_ext)
        ))
        .expect("companion pattern is valid");
        Self {
            companion_ext: companion_ext.to_string(),
            pattern,
        }
    }

    /// Derives the companion URL for a content URL, or `None` when the
    /// naming convention does not apply.
    pub fn derive(&self, content_url: &str) -> Option<String> {
        self.pattern
            .captures(content_url)
            .map(|caps| format!("{}.{}", &caps["stem"], self.companion_ext))
    }
}

impl Default for CompanionRule {
    fn default() -> Self {
        Self::new("ser", "emi")
    }
}

/// Returns every companion URL derivable from `content_urls`.
///
/// Used to prime the size cache before manifest construction, so that
/// [`build`] can tell a real companion from a naming coincidence.
pub fn companion_urls<S: AsRef<str>>(content_urls: &[S], rule: &CompanionRule) -> Vec<String> {
    content_urls
        .iter()
        .filter_map(|u| rule.derive(u.as_ref()))
        .collect()
}

/// Validates the three selection arrays without building anything.
///
/// Used by the coordinator to fail before any network activity; [`build`]
/// applies the same checks.
pub fn validate(
    content_urls: &[String],
    metadata_urls: &[String],
    paths: &[String],
) -> Result<()> {
    if content_urls.len() != metadata_urls.len() || content_urls.len() != paths.len() {
        return Err(Error::ManifestInput(format!(
            "array lengths must match: {} content URLs, {} metadata URLs, {} paths",
            content_urls.len(),
            metadata_urls.len(),
            paths.len()
        )));
    }
    if let Some(i) = (0..content_urls.len())
        .find(|&i| content_urls[i].is_empty() || metadata_urls[i].is_empty())
    {
        return Err(Error::ManifestInput(format!("empty URL at row {i}")));
    }
    Ok(())
}

/// Builds the deduplicated manifest from the three selection arrays.
///
/// The arrays must be equal-length and fully populated; otherwise this
/// fails with [`Error::ManifestInput`] before any further work. Companions
/// are attached only when the derived URL has a known size in `cache`; a
/// missing companion is silently absent, never an error. Rows are
/// deduplicated by content URL, first occurrence wins, input order is
/// preserved.
pub fn build(
    content_urls: &[String],
    metadata_urls: &[String],
    paths: &[String],
    cache: &SizeCache,
    rule: &CompanionRule,
) -> Result<Vec<FileEntry>> {
    validate(content_urls, metadata_urls, paths)?;

    let mut entries: Vec<FileEntry> = Vec::with_capacity(content_urls.len());
    for i in 0..content_urls.len() {
        let content_url = &content_urls[i];
        if entries.iter().any(|e| &e.content_url == content_url) {
            log::debug!("dropping duplicate selection row for {content_url}");
            continue;
        }

        let companion_url = rule.derive(content_url).filter(|url| {
            let known = cache.size_of(url).is_known();
            if !known {
                log::warn!("companion file not found for {content_url}: {url}");
            }
            known
        });

        entries.push(FileEntry {
            content_url: content_url.clone(),
            metadata_url: metadata_urls[i].clone(),
            companion_url,
            path: paths[i].clone(),
        });
    }

    Ok(entries)
}
