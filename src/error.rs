//! Error types for download-engine operations.
//!
//! This module provides the [`Error`] enum which represents all failure
//! modes of the engine, along with a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`:
//!
//! ```rust,no_run
//! use volzip::{Coordinator, Error};
//!
//! async fn run(coordinator: &Coordinator) -> volzip::Result<()> {
//!     match coordinator.start(&[], &[], &[], "record.zip").await {
//!         Ok(outcome) => println!("finished: {:?}", outcome),
//!         Err(Error::AlreadyInProgress) => println!("a download is already running"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Cancellation is a first-class terminal outcome, not a failure: the
//! coordinator reports it through [`Outcome::Cancelled`] rather than an
//! error, and only the lower layers use [`Error::Cancelled`] internally to
//! unwind an in-flight transfer.
//!
//! [`Outcome::Cancelled`]: crate::session::Outcome::Cancelled

use std::io;

/// The main error type for download-engine operations.
///
/// Errors fall into a few categories:
///
/// | Category | Variants | Typical cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | Destination file operations |
/// | Transport | [`Http`][Self::Http], [`ArchiveRead`][Self::ArchiveRead] | Network failures |
/// | Input | [`ManifestInput`][Self::ManifestInput], [`InvalidArchivePath`][Self::InvalidArchivePath] | Malformed selection data |
/// | Environment | [`SinkUnsupported`][Self::SinkUnsupported], [`SinkInvalid`][Self::SinkInvalid] | Capability gaps |
/// | Lifecycle | [`AlreadyInProgress`][Self::AlreadyInProgress], [`Cancelled`][Self::Cancelled] | Session management |
///
/// Size-probe failures are deliberately absent: a failed probe degrades a
/// size estimate to "unknown" inside the [size cache](crate::size_cache)
/// and never propagates as an error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while writing to a destination.
    ///
    /// This wraps [`std::io::Error`] and is returned when destination file
    /// operations fail (creation, write, flush).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An HTTP request could not be performed or returned a failure status.
    ///
    /// Carries the URL so the coordinator can name the offending file in
    /// user-visible messaging.
    #[error("HTTP error for {url}: {reason}")]
    Http {
        /// The URL that failed.
        url: String,
        /// A description of the transport failure.
        reason: String,
    },

    /// The selection arrays were mismatched or incomplete.
    ///
    /// Returned before any network activity when the content-URL,
    /// metadata-URL and path arrays are not equal-length and fully
    /// populated.
    #[error("Invalid manifest input: {0}")]
    ManifestInput(String),

    /// A network read failed while an entry was being streamed into an
    /// archive.
    ///
    /// Fatal to the enclosing volume and to the whole session: the archive
    /// container cannot be completed once an entry's body is truncated.
    #[error("Failed to stream archive entry '{path}': {reason}")]
    ArchiveRead {
        /// In-archive path of the entry that failed.
        path: String,
        /// A description of the read failure.
        reason: String,
    },

    /// No usable output-sink strategy is available in this environment.
    ///
    /// Produced by capability probing, with a clear description of what is
    /// missing rather than a stack trace.
    #[error("No supported download method available: {missing}")]
    SinkUnsupported {
        /// A description of the missing capabilities.
        missing: String,
    },

    /// A chosen sink strategy failed to construct a usable sink.
    ///
    /// This indicates a programmer or environment error (e.g. an unwritable
    /// destination directory), not a transient condition.
    #[error("Failed to create download sink: {0}")]
    SinkInvalid(String),

    /// A second session was started while one is already running.
    ///
    /// The running session is unaffected.
    #[error("A download session is already in progress")]
    AlreadyInProgress,

    /// The operation was cancelled through the session's cancellation token.
    ///
    /// Partial files already written to the destination are kept. The
    /// coordinator translates this into the `Cancelled` outcome; callers
    /// should not treat it as a failure.
    #[error("Operation cancelled")]
    Cancelled,

    /// An in-archive path was empty after cleaning or escaped the archive
    /// root.
    #[error("Invalid archive path: {0}")]
    InvalidArchivePath(String),
}

impl Error {
    /// Returns `true` if this error represents user cancellation rather
    /// than a genuine failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Creates an [`Error::Http`] from a URL and anything displayable.
    pub(crate) fn http(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Http {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// A specialized `Result` type for download-engine operations.
pub type Result<T> = std::result::Result<T, Error>;
