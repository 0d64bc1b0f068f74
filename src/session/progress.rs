//! Aggregate byte-level progress for one session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use super::SessionEvent;
use crate::sink::ProgressFn;

/// Monotonic, shared delivery counter for one session.
///
/// Every sink in the session reports written chunks into the same counter,
/// so `bytes_delivered` aggregates across volumes and individual files.
/// The counter only ever increases, and the value reported outward never
/// exceeds the session total when one is known (archive framing bytes
/// would otherwise push it past the payload-derived total).
#[derive(Debug)]
pub struct SessionProgress {
    delivered: AtomicU64,
    bytes_total: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionProgress {
    pub(crate) fn new(bytes_total: u64, events: mpsc::UnboundedSender<SessionEvent>) -> Arc<Self> {
        Arc::new(Self {
            delivered: AtomicU64::new(0),
            bytes_total,
            events,
        })
    }

    /// Records `chunk_bytes` written to storage and emits a progress event.
    pub fn add(&self, chunk_bytes: u64) {
        self.delivered.fetch_add(chunk_bytes, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Progress {
            bytes_delivered: self.delivered(),
            bytes_total: self.bytes_total,
        });
    }

    /// Aggregate bytes delivered, capped at the session total when known.
    pub fn delivered(&self) -> u64 {
        let raw = self.delivered.load(Ordering::SeqCst);
        if self.bytes_total > 0 {
            raw.min(self.bytes_total)
        } else {
            raw
        }
    }

    /// The session's byte total (zero when no sizes are known).
    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    /// Completion as a fraction in `0.0..=1.0`; zero while the total is
    /// unknown.
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            self.delivered() as f64 / self.bytes_total as f64
        }
    }

    /// Adapts this counter into the callback shape sinks expect.
    pub(crate) fn as_progress_fn(self: &Arc<Self>) -> ProgressFn {
        let progress = Arc::clone(self);
        Arc::new(move |chunk_bytes| progress.add(chunk_bytes))
    }
}
