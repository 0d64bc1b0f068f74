//! Download sessions: orchestration, progress and terminal outcomes.
//!
//! The [`Coordinator`] is the single owner of a running session and the
//! only component that shapes user-visible messaging; everything below it
//! returns errors and logs. UI layers consume [`SessionEvent`]s from the
//! channel handed out at construction and render them however they like.

mod coordinator;
mod progress;

pub use coordinator::{Coordinator, SizeEstimate};
pub use progress::SessionProgress;

use crate::Error;

/// Lifecycle state of a download session.
///
/// `Pending → Running → {Completed | Cancelled | Failed}`; terminal states
/// are never left, a new `start` call always creates a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not yet running.
    Pending,
    /// Actively probing, assembling or writing.
    Running,
    /// Cancelled by the user; partial output kept.
    Cancelled,
    /// Aborted by a fatal error.
    Failed,
    /// All volumes and oversized files delivered.
    Completed,
}

impl SessionState {
    /// Returns `true` for states that end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Cancelled | SessionState::Failed | SessionState::Completed
        )
    }
}

/// Terminal result of [`Coordinator::start`].
#[derive(Debug)]
pub enum Outcome {
    /// Everything was delivered and finalized.
    Completed,
    /// The user cancelled; already-delivered files were kept.
    Cancelled,
    /// A fatal error aborted the session (no partial-failure mode: one
    /// failed volume fails the whole session).
    Failed(Error),
}

impl Outcome {
    /// Returns `true` when the session completed normally.
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Events emitted while a session runs.
///
/// These carry everything the excluded UI layer needs: derived messaging
/// (size estimate with its unknown-size caveat, split and oversized
/// notices) and byte-level progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session changed lifecycle state.
    StateChanged {
        /// The new state.
        state: SessionState,
    },
    /// Size probing finished.
    SizeEstimated {
        /// Sum of all known sizes to be delivered.
        bytes_total: u64,
        /// Files whose size is unknown and excluded from the total.
        unknown_files: usize,
    },
    /// Companion files were detected and will be bundled alongside the
    /// selection even though they were not explicitly listed.
    CompanionNotice {
        /// How many companions were attached.
        count: usize,
    },
    /// The download will be split into multiple archives.
    SplitNotice {
        /// Number of archive volumes.
        volume_count: usize,
        /// The per-volume cap that forced the split.
        cap_bytes: u64,
    },
    /// Some files exceed the per-volume cap and will be saved individually.
    OversizedNotice {
        /// Their destination filenames.
        filenames: Vec<String>,
    },
    /// An archive volume started writing.
    VolumeStarted {
        /// 1-based volume number.
        index: u32,
        /// Total number of volumes.
        count: usize,
        /// Destination filename.
        filename: String,
    },
    /// An archive volume was fully written and finalized.
    VolumeFinished {
        /// 1-based volume number.
        index: u32,
    },
    /// An individual (oversized) file transfer started.
    FileStarted {
        /// Destination filename.
        filename: String,
    },
    /// An individual (oversized) file was fully written.
    FileFinished {
        /// Destination filename.
        filename: String,
    },
    /// Bytes were delivered to storage.
    Progress {
        /// Aggregate bytes delivered so far (monotonic, capped at
        /// `bytes_total` when a total is known).
        bytes_delivered: u64,
        /// The session's total, zero when nothing is known.
        bytes_total: u64,
    },
}
