//! Memoized file-size probes.
//!
//! Everything downstream of the manifest plans capacity from byte sizes
//! learned here. The cache issues one metadata-only probe per unique URL,
//! remembers the answer for the lifetime of the process, and represents
//! failed or absent answers with a distinguished [`FileSize::Unknown`]
//! value that is never conflated with zero.

use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::join_all;

use crate::http::HttpClient;

/// A cached byte size for one URL.
///
/// `Unknown` marks a probe that failed or a server that did not advertise a
/// length. Unknown sizes count as zero in totals but the omission is
/// reported through [`SizeCache::unknown_count`], not hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSize {
    /// The server advertised this many bytes.
    Known(u64),
    /// The probe failed or reported no length.
    Unknown,
}

impl FileSize {
    /// Returns `true` for a successfully probed size.
    pub fn is_known(&self) -> bool {
        matches!(self, FileSize::Known(_))
    }

    /// Returns the byte count, if known.
    pub fn known(&self) -> Option<u64> {
        match self {
            FileSize::Known(n) => Some(*n),
            FileSize::Unknown => None,
        }
    }

    /// Returns the byte count, treating unknown as zero (packing rule).
    pub fn or_zero(&self) -> u64 {
        self.known().unwrap_or(0)
    }
}

/// Process-wide cache of probed file sizes.
///
/// Shared across download sessions; never reset. A URL that probed
/// successfully is write-once: later probes cannot overwrite a `Known`
/// entry. A URL that probed `Unknown` is retried only when a future
/// [`probe`](Self::probe) call names it again.
#[derive(Debug, Default)]
pub struct SizeCache {
    entries: RwLock<HashMap<String, FileSize>>,
}

impl SizeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes every URL not already known, in parallel, and memoizes the
    /// results. Resolves once all probes have settled; individual failures
    /// degrade to [`FileSize::Unknown`] and never fail the batch.
    pub async fn probe<S: AsRef<str>>(&self, client: &dyn HttpClient, urls: &[S]) {
        let mut pending: Vec<String> = Vec::new();
        {
            let entries = self.entries.read().expect("size cache lock poisoned");
            for url in urls {
                let url = url.as_ref();
                if matches!(entries.get(url), Some(FileSize::Known(_))) {
                    continue;
                }
                if !pending.iter().any(|u| u == url) {
                    pending.push(url.to_string());
                }
            }
        }
        if pending.is_empty() {
            return;
        }

        log::debug!("probing {} file sizes", pending.len());
        let probes = pending.iter().map(|url| async move {
            let size = match client.content_length(url).await {
                Ok(Some(n)) => FileSize::Known(n),
                Ok(None) => {
                    log::warn!("no content length advertised for {url}");
                    FileSize::Unknown
                }
                Err(e) => {
                    log::warn!("could not fetch file size for {url}: {e}");
                    FileSize::Unknown
                }
            };
            (url.clone(), size)
        });
        let results = join_all(probes).await;

        let mut entries = self.entries.write().expect("size cache lock poisoned");
        for (url, size) in results {
            match entries.get(&url) {
                // Write-once: never downgrade a known size.
                Some(FileSize::Known(_)) => {}
                _ => {
                    entries.insert(url, size);
                }
            }
        }
    }

    /// Returns the cached size for `url`.
    ///
    /// URLs that were never probed report [`FileSize::Unknown`].
    pub fn size_of(&self, url: &str) -> FileSize {
        self.entries
            .read()
            .expect("size cache lock poisoned")
            .get(url)
            .copied()
            .unwrap_or(FileSize::Unknown)
    }

    /// Sums the known sizes of `urls`, ignoring unknown ones.
    pub fn total_of<S: AsRef<str>>(&self, urls: &[S]) -> u64 {
        let entries = self.entries.read().expect("size cache lock poisoned");
        urls.iter()
            .filter_map(|u| entries.get(u.as_ref()))
            .filter_map(|s| s.known())
            .sum()
    }

    /// Counts how many of `urls` have no known size, so callers can report
    /// the estimate as partial instead of presenting it as exact.
    pub fn unknown_count<S: AsRef<str>>(&self, urls: &[S]) -> usize {
        let entries = self.entries.read().expect("size cache lock poisoned");
        urls.iter()
            .filter(|u| !matches!(entries.get(u.as_ref()), Some(FileSize::Known(_))))
            .count()
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().expect("size cache lock poisoned").len()
    }

    /// Returns `true` if nothing has been probed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
