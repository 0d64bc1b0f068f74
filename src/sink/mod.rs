//! Output sinks: delivering a byte stream to durable storage.
//!
//! Three interchangeable strategies persist an archive stream, chosen by
//! descending preference from an explicit [`Capabilities`] probe rather
//! than environment sniffing:
//!
//! 1. [`Strategy::DirectHandle`] — a writable handle to the destination
//!    file, copied chunk-by-chunk with the destination's own readiness as
//!    backpressure.
//! 2. [`Strategy::Relay`] — a background execution context owns the
//!    destination and pulls chunks over a message channel, reconstructing
//!    backpressure across the context boundary (see [`relay`]).
//! 3. [`Strategy::Buffered`] — best-effort: a depth-1 queue in front of a
//!    writer task, optionally rate-capped for destinations with broken
//!    internal backpressure.
//!
//! Every strategy reports progress once per chunk actually written,
//! finalizes the destination on success, and surfaces cancellation as the
//! distinguished [`Error::Cancelled`] rather than a generic failure,
//! leaving partially-written files intact.

mod buffered;
mod direct;
pub mod relay;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::http::ByteStream;
use crate::{Error, Result};

/// Callback invoked with the size of each chunk written to storage.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Wraps a closure as a [`ProgressFn`].
pub fn progress_fn<F: Fn(u64) + Send + Sync + 'static>(f: F) -> ProgressFn {
    Arc::new(f)
}

/// A [`ProgressFn`] that ignores all reports.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// The closed set of capabilities an environment may offer for persisting
/// downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// A writable handle to a destination file can be obtained directly.
    pub direct_handle: bool,
    /// A background execution context is available for relayed delivery.
    pub relay: bool,
    /// A best-effort buffered save is possible.
    pub buffered: bool,
}

impl Capabilities {
    /// Probes the current environment.
    ///
    /// Duck-typed checks, not platform identification: direct and buffered
    /// delivery need a writable filesystem (always present on this
    /// target); the relay needs a background executor to host its context.
    pub fn detect() -> Self {
        let background_context = tokio::runtime::Handle::try_current().is_ok();
        Self {
            direct_handle: true,
            relay: background_context,
            buffered: true,
        }
    }

    /// An environment with no delivery capability at all.
    pub fn none() -> Self {
        Self {
            direct_handle: false,
            relay: false,
            buffered: false,
        }
    }
}

/// The sink strategy chosen for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Write through a directly-obtained file handle.
    DirectHandle,
    /// Relay chunks to a background context with pull-based backpressure.
    Relay,
    /// Best-effort buffered save with a minimal queue.
    Buffered,
}

/// Picks the best available strategy for a capability set.
///
/// The preference table is fixed: direct handle, then relay, then
/// buffered. Returns [`Error::SinkUnsupported`] with a capability-mismatch
/// message when nothing is available.
pub fn select_strategy(caps: Capabilities) -> Result<Strategy> {
    if caps.direct_handle {
        Ok(Strategy::DirectHandle)
    } else if caps.relay {
        Ok(Strategy::Relay)
    } else if caps.buffered {
        Ok(Strategy::Buffered)
    } else {
        Err(Error::SinkUnsupported {
            missing: "environment offers neither a writable file handle, a background \
                      relay context, nor a buffered save affordance"
                .into(),
        })
    }
}

/// A sink bound to one destination file.
#[derive(Debug)]
pub struct Sink {
    strategy: Strategy,
    path: PathBuf,
    filename: String,
    expected_size: u64,
    relay_chunk_ceiling: usize,
    relay_ready_timeout: std::time::Duration,
    buffered_queue_depth: usize,
    throttle_bytes_per_sec: u64,
}

impl Sink {
    /// Creates a sink that will persist `filename` under `dest_dir` using
    /// the given strategy.
    ///
    /// `expected_size` is advisory (progress displays, relay registration);
    /// the actual stream length wins.
    pub fn create(
        strategy: Strategy,
        dest_dir: &Path,
        filename: &str,
        expected_size: u64,
        config: &EngineConfig,
    ) -> Result<Self> {
        if !dest_dir.is_dir() {
            return Err(Error::SinkInvalid(format!(
                "destination '{}' is not a writable directory",
                dest_dir.display()
            )));
        }
        Ok(Self {
            strategy,
            path: dest_dir.join(filename),
            filename: filename.to_string(),
            expected_size,
            relay_chunk_ceiling: config.relay_chunk_ceiling,
            relay_ready_timeout: config.relay_ready_timeout,
            buffered_queue_depth: config.buffered_queue_depth,
            throttle_bytes_per_sec: config.throttle_bytes_per_sec,
        })
    }

    /// Returns the destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consumes the stream into durable storage.
    ///
    /// `progress` fires once per chunk written. Cancelling `cancel` stops
    /// further writes, keeps the partial file and returns
    /// [`Error::Cancelled`].
    pub async fn write(
        self,
        stream: ByteStream,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<()> {
        log::info!(
            "writing '{}' via {:?} (expected {} bytes)",
            self.filename,
            self.strategy,
            self.expected_size
        );
        match self.strategy {
            Strategy::DirectHandle => direct::write(&self.path, stream, progress, cancel).await,
            Strategy::Relay => {
                relay::write(
                    &self.path,
                    &self.filename,
                    self.expected_size,
                    self.relay_chunk_ceiling,
                    self.relay_ready_timeout,
                    stream,
                    progress,
                    cancel,
                )
                .await
            }
            Strategy::Buffered => {
                buffered::write(
                    &self.path,
                    self.buffered_queue_depth,
                    self.throttle_bytes_per_sec,
                    stream,
                    progress,
                    cancel,
                )
                .await
            }
        }
    }
}
