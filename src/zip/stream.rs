//! Lazy assembly of one volume into an archive byte stream.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;

use super::{EntryRecord, central_directory, data_descriptor, dos_datetime, local_file_header};
use crate::archive_path::ArchivePath;
use crate::http::{ByteStream, HttpClient};
use crate::volume::{Volume, VolumeEntry};
use crate::{Error, Result};

/// Produces the archive byte stream for one volume.
///
/// The stream is lazy, single-pass and non-restartable. Entries are fetched
/// strictly in volume order with at most one request in flight; the next
/// entry's fetch starts only once the previous body has been fully consumed
/// by the encoder, so memory stays bounded by one chunk regardless of
/// volume size.
///
/// A network failure on any entry is fatal and surfaces as a terminal
/// [`Error::ArchiveRead`] item. Cancelling `cancel` aborts the in-flight
/// read and ends the stream cleanly without an error item; the resulting
/// archive is truncated but the bytes already emitted remain valid output
/// for the sink to have persisted.
pub fn assemble(
    volume: Volume,
    client: Arc<dyn HttpClient>,
    cancel: CancellationToken,
) -> ByteStream {
    let entry_count = volume.entries.len();
    log::info!(
        "assembling volume {} with {} entries ({} bytes known)",
        volume.index,
        entry_count,
        volume.total_bytes
    );

    let assembly = Assembly {
        client,
        cancel,
        volume_index: volume.index,
        entries: volume.entries.into_iter(),
        entry_count,
        entries_done: 0,
        phase: Phase::BetweenEntries,
        records: Vec::with_capacity(entry_count),
        offset: 0,
        dos: dos_datetime(SystemTime::now()),
    };

    stream::try_unfold(assembly, |mut assembly| async move {
        let chunk = assembly.next_chunk().await?;
        Ok(chunk.map(|c| (c, assembly)))
    })
    .boxed()
}

struct Assembly {
    client: Arc<dyn HttpClient>,
    cancel: CancellationToken,
    volume_index: u32,
    entries: std::vec::IntoIter<VolumeEntry>,
    entry_count: usize,
    entries_done: usize,
    phase: Phase,
    records: Vec<EntryRecord>,
    offset: u64,
    dos: (u16, u16),
}

enum Phase {
    /// Ready to start the next entry (or the central directory).
    BetweenEntries,
    /// Streaming one entry's body.
    Body {
        path: ArchivePath,
        body: ByteStream,
        hasher: crc32fast::Hasher,
        written: u64,
        header_offset: u64,
    },
    /// Central directory emitted; nothing left.
    Finished,
}

impl Assembly {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.cancel.is_cancelled() {
            log::info!("volume {} assembly cancelled", self.volume_index);
            self.phase = Phase::Finished;
            return Ok(None);
        }

        // The phase is taken out and written back so each step owns its
        // state; an early error leaves the assembly finished.
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::BetweenEntries => match self.entries.next() {
                Some(entry) => {
                    self.entries_done += 1;
                    log::debug!(
                        "fetching entry {}/{} for volume {}: {}",
                        self.entries_done,
                        self.entry_count,
                        self.volume_index,
                        entry.path
                    );
                    let body = tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(None),
                        body = self.client.fetch(&entry.url) => body.map_err(|e| {
                            Error::ArchiveRead {
                                path: entry.path.to_string(),
                                reason: e.to_string(),
                            }
                        })?,
                    };

                    let header = local_file_header(entry.path.as_str(), self.dos);
                    let header_offset = self.offset;
                    self.offset += header.len() as u64;
                    self.phase = Phase::Body {
                        path: entry.path,
                        body,
                        hasher: crc32fast::Hasher::new(),
                        written: 0,
                        header_offset,
                    };
                    Ok(Some(header))
                }
                None => {
                    let directory = central_directory(&self.records, self.offset);
                    log::info!(
                        "volume {} complete: {} entries, {} bytes of payload",
                        self.volume_index,
                        self.records.len(),
                        self.offset
                    );
                    Ok(Some(directory))
                }
            },
            Phase::Body {
                path,
                mut body,
                mut hasher,
                mut written,
                header_offset,
            } => {
                let next = tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(None),
                    chunk = body.next() => chunk,
                };
                match next {
                    Some(Ok(chunk)) => {
                        hasher.update(&chunk);
                        written += chunk.len() as u64;
                        self.offset += chunk.len() as u64;
                        self.phase = Phase::Body {
                            path,
                            body,
                            hasher,
                            written,
                            header_offset,
                        };
                        Ok(Some(chunk))
                    }
                    Some(Err(e)) => Err(Error::ArchiveRead {
                        path: path.to_string(),
                        reason: e.to_string(),
                    }),
                    None => {
                        let crc = hasher.finalize();
                        let descriptor = data_descriptor(crc, written);
                        self.records.push(EntryRecord {
                            name: path.to_string(),
                            crc,
                            size: written,
                            offset: header_offset,
                            dos: self.dos,
                        });
                        self.offset += descriptor.len() as u64;
                        self.phase = Phase::BetweenEntries;
                        Ok(Some(descriptor))
                    }
                }
            }
            Phase::Finished => Ok(None),
        }
    }
}
