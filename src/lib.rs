//! # volzip
//!
//! Streaming multi-volume ZIP downloads for remote experiment records.
//!
//! This crate lets a caller select a set of remote files belonging to an
//! experimental record and retrieve them as one or more ZIP archives —
//! without server-side zipping and without ever buffering a whole archive
//! in memory. Files are packed into size-bounded volumes, each volume's
//! bytes are generated lazily from per-entry network reads, and the
//! resulting stream is delivered to durable storage through one of several
//! capability-selected sinks with true backpressure and cancellation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use volzip::{Coordinator, EngineConfig, Outcome, ReqwestClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Arc::new(ReqwestClient::new()?);
//!     let (coordinator, mut events) =
//!         Coordinator::new(client, EngineConfig::default(), "/tmp/downloads");
//!
//!     // Render progress and notices however the surrounding UI likes.
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{event:?}");
//!         }
//!     });
//!
//!     let outcome = coordinator
//!         .start(
//!             &["http://files/rec/img_0001.ser".into()],
//!             &["http://files/rec/img_0001.json".into()],
//!             &["Titan/2021-05-12".into()],
//!             "record.zip",
//!         )
//!         .await?;
//!
//!     match outcome {
//!         Outcome::Completed => println!("finished"),
//!         Outcome::Cancelled => println!("cancelled, partial files kept"),
//!         Outcome::Failed(e) => eprintln!("failed: {e}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Component | Module | Responsibility |
//! |-----------|--------|----------------|
//! | Size cache | [`size_cache`] | Memoized content-length probes |
//! | Manifest builder | [`manifest`] | Dedup + companion-aware entry list |
//! | Volume allocator | [`volume`] | Greedy size-bounded packing |
//! | Archive assembler | [`zip`] | Lazy streaming ZIP container |
//! | Output sinks | [`sink`] | Three delivery strategies with backpressure |
//! | Session coordinator | [`session`] | Orchestration, progress, outcomes |
//!
//! Volumes are capped at 4 GiB by default (see
//! [`config::DEFAULT_VOLUME_CAP`]); a selection that does not fit in one
//! volume is split into `title-1of3.zip`, `title-2of3.zip`, … and files
//! too large for any archive are saved individually under their own
//! names. Companion files implied by instrument naming conventions (a
//! `{stem}_{digits}.ser` series and its shared `{stem}.emi` sidecar) are
//! bundled automatically when they exist.
//!
//! ## Cancellation
//!
//! Every session owns one [`CancellationToken`] shared by all of its
//! transfers. Cancelling stops further reads and writes cooperatively,
//! keeps partially-written files, and surfaces the distinguished
//! [`Outcome::Cancelled`] rather than an error.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod archive_path;
pub mod config;
pub mod error;
pub mod http;
pub mod manifest;
pub mod session;
pub mod sink;
pub mod size_cache;
pub mod volume;
pub mod zip;

pub use archive_path::{ArchivePath, decoded_basename};
pub use config::EngineConfig;
pub use error::{Error, Result};

// Re-export the transport seam at crate root for convenience
pub use http::{ByteStream, HttpClient, ReqwestClient};

// Re-export the manifest API at crate root for convenience
pub use manifest::{CompanionRule, FileEntry};

// Re-export the size-cache API
pub use size_cache::{FileSize, SizeCache};

// Re-export allocation types
pub use volume::{Allocation, OversizedEntry, Volume, VolumeEntry, allocate};

// Re-export the sink API
pub use sink::{Capabilities, ProgressFn, Sink, Strategy, no_progress, progress_fn, select_strategy};
pub use sink::relay::RelayMessage;

// Re-export the session API
pub use session::{Coordinator, Outcome, SessionEvent, SessionProgress, SessionState, SizeEstimate};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
