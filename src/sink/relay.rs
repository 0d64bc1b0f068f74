//! Relay sink strategy: pull-driven delivery through a background context.
//!
//! When no direct writable handle is available but a background execution
//! context is, the destination is owned by that context and the foreground
//! feeds it over a dedicated two-way channel. Production is pull-driven:
//! the background requests exactly one chunk when its consumer is ready
//! ([`RelayMessage::NeedChunk`]) and the foreground answers with exactly
//! one [`RelayMessage::Chunk`] or [`RelayMessage::Done`]. This reconstructs
//! true backpressure across the context boundary — the foreground never
//! reads ahead of what the consumer has accepted.
//!
//! Each transfer runs a small state machine in the background context:
//!
//! ```text
//! Idle ──INIT/READY──► AwaitingChunk ──CHUNK──► Delivering
//!                        │    ▲                    │
//!                        │    └────written─────────┘
//!                        ├──DONE──► Closed
//!                        └──ABORT / write failure──► Errored
//! ```
//!
//! Oversized chunks are split defensively before reaching the consumer;
//! the ceiling is configurable with a conservative profile for consumers
//! known to mismanage very large chunks.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ProgressFn;
use crate::http::ByteStream;
use crate::{Error, Result};

/// Message kinds exchanged between the foreground and the background
/// context over a per-download channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// fg→bg: register a pending transfer.
    InitDownload {
        /// Per-download identifier.
        id: u64,
        /// Destination filename, for diagnostics.
        filename: String,
        /// Expected size in bytes (0 when unknown).
        size: u64,
    },
    /// bg→fg: the background context is ready to request chunks.
    Ready {
        /// Transfer identifier.
        id: u64,
    },
    /// bg→fg: the consumer is ready for the next chunk (the backpressure
    /// signal).
    NeedChunk {
        /// Transfer identifier.
        id: u64,
    },
    /// fg→bg: exactly one chunk, answering the most recent `NeedChunk`.
    Chunk {
        /// Transfer identifier.
        id: u64,
        /// The chunk payload.
        bytes: Bytes,
    },
    /// fg→bg: no more chunks; the background closes after draining.
    Done {
        /// Transfer identifier.
        id: u64,
    },
    /// Either direction: cancel the transfer.
    Abort {
        /// Transfer identifier.
        id: u64,
        /// Optional cause.
        reason: Option<String>,
    },
    /// bg→fg: the consumer side was cancelled (e.g. by the user).
    Canceled {
        /// Transfer identifier.
        id: u64,
        /// Cause reported by the consumer.
        reason: String,
    },
}

/// Per-transfer state in the background context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferState {
    AwaitingChunk,
    Delivering,
    Closed,
    Errored,
}

static NEXT_DOWNLOAD_ID: AtomicU64 = AtomicU64::new(1);

fn next_download_id() -> u64 {
    NEXT_DOWNLOAD_ID.fetch_add(1, Ordering::Relaxed)
}

/// Splits a chunk into pieces no larger than `ceiling` (zero-copy slices).
pub(crate) fn rechunk(bytes: Bytes, ceiling: usize) -> Vec<Bytes> {
    let ceiling = ceiling.max(1);
    if bytes.len() <= ceiling {
        return vec![bytes];
    }
    log::warn!(
        "chunk of {} bytes exceeds relay ceiling ({ceiling}); splitting",
        bytes.len()
    );
    let mut pieces = Vec::with_capacity(bytes.len().div_ceil(ceiling));
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + ceiling).min(bytes.len());
        pieces.push(bytes.slice(offset..end));
        offset = end;
    }
    pieces
}

/// Spawns the background context for one transfer.
///
/// Returns the foreground's two channel ends and the context's join
/// handle. The context owns `dest` and reports each written chunk through
/// `progress`.
pub(crate) fn spawn_background<W>(
    dest: W,
    chunk_ceiling: usize,
    progress: ProgressFn,
) -> (
    mpsc::Sender<RelayMessage>,
    mpsc::Receiver<RelayMessage>,
    JoinHandle<Result<()>>,
)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (to_bg, inbox) = mpsc::channel(4);
    let (outbox, from_bg) = mpsc::channel(4);
    let handle = tokio::spawn(run_background(dest, chunk_ceiling, progress, inbox, outbox));
    (to_bg, from_bg, handle)
}

/// The background context's event loop.
async fn run_background<W>(
    mut dest: W,
    chunk_ceiling: usize,
    progress: ProgressFn,
    mut inbox: mpsc::Receiver<RelayMessage>,
    outbox: mpsc::Sender<RelayMessage>,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    // Idle until the transfer is registered.
    let id = match inbox.recv().await {
        Some(RelayMessage::InitDownload { id, filename, size }) => {
            log::debug!("relay transfer {id} registered: '{filename}' ({size} bytes expected)");
            id
        }
        other => {
            return Err(Error::SinkInvalid(format!(
                "relay transfer not initialized (got {other:?})"
            )));
        }
    };
    if outbox.send(RelayMessage::Ready { id }).await.is_err() {
        return Err(Error::SinkInvalid("relay foreground went away".into()));
    }

    let mut state = TransferState::AwaitingChunk;
    let mut pending: Option<Bytes> = None;

    loop {
        match state {
            TransferState::AwaitingChunk => {
                // One NeedChunk per pull; the reply must be exactly one
                // Chunk or Done.
                if outbox.send(RelayMessage::NeedChunk { id }).await.is_err() {
                    state = TransferState::Errored;
                    continue;
                }
                state = match inbox.recv().await {
                    Some(RelayMessage::Chunk { bytes, .. }) => {
                        pending = Some(bytes);
                        TransferState::Delivering
                    }
                    Some(RelayMessage::Done { .. }) => {
                        dest.flush().await?;
                        dest.shutdown().await?;
                        TransferState::Closed
                    }
                    Some(RelayMessage::Abort { reason, .. }) => {
                        log::info!("relay transfer {id} aborted: {reason:?}");
                        TransferState::Errored
                    }
                    other => {
                        log::warn!("relay transfer {id}: unexpected message {other:?}");
                        TransferState::Errored
                    }
                };
            }
            TransferState::Delivering => {
                let bytes = pending.take().unwrap_or_default();
                let delivered = bytes.len() as u64;
                let mut failed = None;
                for piece in rechunk(bytes, chunk_ceiling) {
                    if let Err(e) = dest.write_all(&piece).await {
                        failed = Some(e);
                        break;
                    }
                }
                state = match failed {
                    Some(e) => {
                        // The consumer rejected the write; report it as a
                        // consumer-side cancellation.
                        let _ = outbox
                            .send(RelayMessage::Canceled {
                                id,
                                reason: e.to_string(),
                            })
                            .await;
                        TransferState::Errored
                    }
                    None => {
                        progress(delivered);
                        TransferState::AwaitingChunk
                    }
                };
            }
            TransferState::Closed => {
                log::debug!("relay transfer {id} closed");
                return Ok(());
            }
            TransferState::Errored => return Err(Error::Cancelled),
        }
    }
}

/// Foreground half of the relay strategy.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn write(
    path: &Path,
    filename: &str,
    expected_size: u64,
    chunk_ceiling: usize,
    ready_timeout: Duration,
    mut stream: ByteStream,
    progress: ProgressFn,
    cancel: CancellationToken,
) -> Result<()> {
    let dest = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::SinkInvalid(format!("cannot create '{}': {e}", path.display())))?;

    let (to_bg, mut from_bg, handle) = spawn_background(dest, chunk_ceiling, progress);
    let id = next_download_id();

    to_bg
        .send(RelayMessage::InitDownload {
            id,
            filename: filename.to_string(),
            size: expected_size,
        })
        .await
        .map_err(|_| Error::SinkInvalid("relay context terminated before init".into()))?;

    match tokio::time::timeout(ready_timeout, from_bg.recv()).await {
        Ok(Some(RelayMessage::Ready { .. })) => {}
        Ok(other) => {
            return Err(Error::SinkInvalid(format!(
                "relay context failed to acknowledge transfer (got {other:?})"
            )));
        }
        Err(_) => {
            return Err(Error::SinkInvalid("relay context init timeout".into()));
        }
    }

    let result: Result<()> = loop {
        if cancel.is_cancelled() {
            let _ = to_bg
                .send(RelayMessage::Abort { id, reason: Some("cancelled by user".into()) })
                .await;
            break Err(Error::Cancelled);
        }
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = to_bg
                    .send(RelayMessage::Abort { id, reason: Some("cancelled by user".into()) })
                    .await;
                break Err(Error::Cancelled);
            }
            message = from_bg.recv() => message,
        };

        match message {
            Some(RelayMessage::NeedChunk { .. }) => {
                let item = tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = to_bg
                            .send(RelayMessage::Abort { id, reason: Some("cancelled by user".into()) })
                            .await;
                        break Err(Error::Cancelled);
                    }
                    item = stream.next() => item,
                };
                match item {
                    Some(Ok(bytes)) => {
                        if to_bg.send(RelayMessage::Chunk { id, bytes }).await.is_err() {
                            break Err(Error::SinkInvalid("relay context terminated".into()));
                        }
                    }
                    Some(Err(e)) => {
                        let _ = to_bg
                            .send(RelayMessage::Abort { id, reason: Some(e.to_string()) })
                            .await;
                        break Err(e);
                    }
                    None => {
                        if to_bg.send(RelayMessage::Done { id }).await.is_err() {
                            break Err(Error::SinkInvalid("relay context terminated".into()));
                        }
                        break Ok(());
                    }
                }
            }
            Some(RelayMessage::Canceled { reason, .. }) => {
                log::info!("relay transfer {id} cancelled by consumer: {reason}");
                break Err(Error::Cancelled);
            }
            Some(other) => {
                break Err(Error::SinkInvalid(format!(
                    "unexpected relay message {other:?}"
                )));
            }
            None => break Err(Error::SinkInvalid("relay context terminated".into())),
        }
    };

    // Closing our sender unblocks a background context still waiting on a
    // reply, then let it drain and close; its outcome only matters on the
    // happy path.
    drop(to_bg);
    match handle.await {
        Ok(background_result) => match (&result, background_result) {
            (Ok(()), Err(e)) => Err(e),
            _ => result,
        },
        Err(join_error) => {
            if result.is_ok() {
                Err(Error::SinkInvalid(format!(
                    "relay context panicked: {join_error}"
                )))
            } else {
                result
            }
        }
    }
}
