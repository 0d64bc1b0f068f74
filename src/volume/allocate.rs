//! Greedy, deterministic volume packing.

use std::collections::HashSet;

use super::{Allocation, OversizedEntry, Volume, VolumeEntry};
use crate::archive_path::{ArchivePath, decoded_basename};
use crate::manifest::FileEntry;
use crate::size_cache::{FileSize, SizeCache};
use crate::Result;

/// One flattened (url, path, size) pair awaiting placement.
struct Pair {
    url: String,
    path: ArchivePath,
    size: FileSize,
}

/// Partitions the manifest into size-bounded volumes plus oversized singles.
///
/// Single-pass, greedy and order-preserving:
///
/// - each [`FileEntry`] flattens into its constituent URLs (content first,
///   then metadata, then companion) paired with a computed in-archive path;
/// - an entry containing any pair whose known size alone exceeds
///   `cap_bytes` is routed whole to the oversized list — its metadata and
///   companion travel with it rather than landing in an archive their data
///   file cannot join. Unknown sizes pack as zero and are never classified
///   oversized;
/// - a pair that would push the current volume past `cap_bytes` closes the
///   volume first and opens a new one; an empty volume accepts any pair, so
///   no pair's bytes are ever split across volumes;
/// - URLs are deduplicated globally: a URL already placed anywhere is
///   skipped, so distinct entries referencing a shared file cannot place it
///   twice.
pub fn allocate(entries: &[FileEntry], cache: &SizeCache, cap_bytes: u64) -> Result<Allocation> {
    let mut allocation = Allocation::default();
    let mut placed: HashSet<String> = HashSet::new();

    let mut current: Vec<VolumeEntry> = Vec::new();
    let mut current_bytes: u64 = 0;

    for entry in entries {
        let pairs = flatten(entry, cache)?;

        let entry_oversized = pairs
            .iter()
            .any(|p| p.size.known().is_some_and(|n| n > cap_bytes));

        if entry_oversized {
            for pair in pairs {
                if !placed.insert(pair.url.clone()) {
                    continue;
                }
                log::debug!(
                    "routing {} to individual delivery (entry exceeds volume cap)",
                    pair.url
                );
                allocation.oversized.push(OversizedEntry {
                    filename: decoded_basename(&pair.url),
                    url: pair.url,
                    size: pair.size,
                });
            }
            continue;
        }

        for pair in pairs {
            if placed.contains(&pair.url) {
                continue;
            }
            let size = pair.size.or_zero();
            if !current.is_empty() && current_bytes + size > cap_bytes {
                close_volume(&mut allocation, &mut current, &mut current_bytes);
            }
            placed.insert(pair.url.clone());
            current_bytes += size;
            current.push(VolumeEntry {
                path: pair.path,
                url: pair.url,
            });
        }
    }

    close_volume(&mut allocation, &mut current, &mut current_bytes);
    Ok(allocation)
}

fn flatten(entry: &FileEntry, cache: &SizeCache) -> Result<Vec<Pair>> {
    let mut pairs = Vec::with_capacity(3);
    let mut push = |url: &str| -> Result<()> {
        pairs.push(Pair {
            url: url.to_string(),
            path: ArchivePath::from_dir_and_url(&entry.path, url)?,
            size: cache.size_of(url),
        });
        Ok(())
    };
    push(&entry.content_url)?;
    push(&entry.metadata_url)?;
    if let Some(companion) = &entry.companion_url {
        push(companion)?;
    }
    Ok(pairs)
}

fn close_volume(allocation: &mut Allocation, current: &mut Vec<VolumeEntry>, bytes: &mut u64) {
    if current.is_empty() {
        return;
    }
    let index = allocation.volumes.len() as u32 + 1;
    log::debug!(
        "closing volume {index}: {} entries, {} bytes",
        current.len(),
        bytes
    );
    allocation.volumes.push(Volume {
        index,
        entries: std::mem::take(current),
        total_bytes: std::mem::take(bytes),
    });
}
