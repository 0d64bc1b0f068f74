//! Volume types and size-bounded allocation.
//!
//! A volume is one archive-to-be: an ordered list of (path, url) pairs
//! whose known sizes fit under the configured cap. Files too large for any
//! archive are routed to [`OversizedEntry`] delivery instead.

mod allocate;

pub use allocate::allocate;

use crate::archive_path::ArchivePath;
use crate::size_cache::FileSize;

/// One file's worth of content inside a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeEntry {
    /// Normalized in-archive path.
    pub path: ArchivePath,
    /// Source URL for the entry's bytes.
    pub url: String,
}

/// One size-bounded archive volume.
///
/// Volumes are numbered `1..=N` in allocation order; the order is
/// deterministic given the same manifest and size-cache contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// 1-based volume number.
    pub index: u32,
    /// Entries in manifest order.
    pub entries: Vec<VolumeEntry>,
    /// Sum of the known sizes of the entries; never exceeds the cap.
    pub total_bytes: u64,
}

impl Volume {
    /// Returns the source URLs of this volume's entries.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.url.as_str())
    }
}

/// A file delivered outside any archive because its own size exceeds the
/// per-volume cap (or it accompanies one that does).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OversizedEntry {
    /// Source URL.
    pub url: String,
    /// Percent-decoded filename the file is saved under.
    pub filename: String,
    /// Cached size, for progress accounting.
    pub size: FileSize,
}

/// The allocator's output: bounded volumes plus oversized singles.
///
/// Every URL appears in at most one volume or the oversized list, never
/// both and never twice.
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    /// Size-bounded volumes in order.
    pub volumes: Vec<Volume>,
    /// Files routed to individual, unarchived delivery.
    pub oversized: Vec<OversizedEntry>,
}

impl Allocation {
    /// Total known bytes across all volumes and oversized files.
    pub fn total_known_bytes(&self) -> u64 {
        let volume_bytes: u64 = self.volumes.iter().map(|v| v.total_bytes).sum();
        let oversized_bytes: u64 = self.oversized.iter().map(|o| o.size.or_zero()).sum();
        volume_bytes + oversized_bytes
    }

    /// Returns `true` when nothing was allocated.
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty() && self.oversized.is_empty()
    }
}
