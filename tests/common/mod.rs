//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test
//! file compiles as a separate crate and may only use a subset of these
//! helpers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::StreamExt;

use volzip::{ByteStream, Error, HttpClient, Result};

/// In-memory transport serving canned bodies, with per-URL failure modes
/// and an optional per-chunk delay to keep transfers in flight while a
/// test pokes at the session from outside.
#[derive(Default)]
pub struct MockTransport {
    bodies: HashMap<String, Vec<u8>>,
    failing_probes: HashSet<String>,
    truncated: HashMap<String, usize>,
    chunk_size: usize,
    delay_per_chunk: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            chunk_size: 16,
            ..Self::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_delay_per_chunk(mut self, delay: Duration) -> Self {
        self.delay_per_chunk = delay;
        self
    }

    pub fn body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    /// Registers a URL with a probe-visible size and an all-zero body.
    pub fn sized(mut self, url: &str, size: usize) -> Self {
        self.bodies.insert(url.to_string(), vec![0u8; size]);
        self
    }

    pub fn failing_probe(mut self, url: &str) -> Self {
        self.failing_probes.insert(url.to_string());
        self
    }

    /// Makes the body stream for `url` error out after `after` bytes.
    pub fn truncated(mut self, url: &str, after: usize) -> Self {
        self.truncated.insert(url.to_string(), after);
        self
    }
}

impl HttpClient for MockTransport {
    fn content_length(&self, url: &str) -> BoxFuture<'_, Result<Option<u64>>> {
        let result = if self.failing_probes.contains(url) {
            Err(Error::Http {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
        } else {
            match self.bodies.get(url) {
                Some(body) => Ok(Some(body.len() as u64)),
                None => Err(Error::Http {
                    url: url.to_string(),
                    reason: "HTTP 404 Not Found".into(),
                }),
            }
        };
        async move { result }.boxed()
    }

    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<ByteStream>> {
        let body = self.bodies.get(url).cloned();
        let truncate_at = self.truncated.get(url).copied();
        let chunk_size = self.chunk_size.max(1);
        let delay = self.delay_per_chunk;
        let url = url.to_string();
        async move {
            let body = body.ok_or_else(|| Error::Http {
                url: url.clone(),
                reason: "HTTP 404 Not Found".into(),
            })?;
            let served = match truncate_at {
                Some(n) => body[..n.min(body.len())].to_vec(),
                None => body,
            };
            let mut chunks: Vec<Result<Bytes>> = served
                .chunks(chunk_size)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            if truncate_at.is_some() {
                chunks.push(Err(Error::Http {
                    url: url.clone(),
                    reason: "connection reset mid-body".into(),
                }));
            }
            let stream = futures::stream::iter(chunks).then(move |chunk| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                chunk
            });
            Ok(stream.boxed() as ByteStream)
        }
        .boxed()
    }
}

/// One entry recovered from a stored (uncompressed) archive.
#[derive(Debug, PartialEq, Eq)]
pub struct StoredEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub crc: u32,
}

/// Minimal reader for the archives this crate writes: stored entries with
/// streaming descriptors and ZIP64 end records. Panics on malformed input
/// so tests fail loudly.
pub fn read_stored_zip(bytes: &[u8]) -> Vec<StoredEntry> {
    assert!(bytes.len() >= 22 + 20 + 56, "archive too short");

    // Classic EOCD (no comment) preceded by the ZIP64 locator.
    let eocd = &bytes[bytes.len() - 22..];
    assert_eq!(&eocd[0..4], &[0x50, 0x4b, 0x05, 0x06], "missing EOCD");
    let locator = &bytes[bytes.len() - 42..bytes.len() - 22];
    assert_eq!(
        &locator[0..4],
        &[0x50, 0x4b, 0x06, 0x07],
        "missing ZIP64 locator"
    );
    let zip64_eocd_offset = u64::from_le_bytes(locator[8..16].try_into().unwrap()) as usize;

    let zip64_eocd = &bytes[zip64_eocd_offset..zip64_eocd_offset + 56];
    assert_eq!(
        &zip64_eocd[0..4],
        &[0x50, 0x4b, 0x06, 0x06],
        "missing ZIP64 EOCD"
    );
    let entry_count = u64::from_le_bytes(zip64_eocd[32..40].try_into().unwrap()) as usize;
    let cd_offset = u64::from_le_bytes(zip64_eocd[48..56].try_into().unwrap()) as usize;

    let mut entries = Vec::with_capacity(entry_count);
    let mut pos = cd_offset;
    for _ in 0..entry_count {
        let header = &bytes[pos..];
        assert_eq!(&header[0..4], &[0x50, 0x4b, 0x01, 0x02], "bad central header");
        let crc = u32::from_le_bytes(header[16..20].try_into().unwrap());
        let name_len = u16::from_le_bytes([header[28], header[29]]) as usize;
        let extra_len = u16::from_le_bytes([header[30], header[31]]) as usize;
        let name = String::from_utf8(header[46..46 + name_len].to_vec()).unwrap();

        // ZIP64 extra: sizes and local header offset.
        let extra = &header[46 + name_len..46 + name_len + extra_len];
        assert_eq!(u16::from_le_bytes([extra[0], extra[1]]), 0x0001);
        let size = u64::from_le_bytes(extra[4..12].try_into().unwrap()) as usize;
        let lh_offset = u64::from_le_bytes(extra[20..28].try_into().unwrap()) as usize;

        // Stored data sits right after the local header.
        let local = &bytes[lh_offset..];
        assert_eq!(&local[0..4], &[0x50, 0x4b, 0x03, 0x04], "bad local header");
        let local_name_len = u16::from_le_bytes([local[26], local[27]]) as usize;
        let local_extra_len = u16::from_le_bytes([local[28], local[29]]) as usize;
        let data_start = lh_offset + 30 + local_name_len + local_extra_len;
        let data = bytes[data_start..data_start + size].to_vec();
        assert_eq!(crc32fast::hash(&data), crc, "CRC mismatch for '{name}'");

        entries.push(StoredEntry { name, data, crc });
        pos += 46 + name_len + extra_len;
    }
    entries
}
