//! The session coordinator: single owner of a running download.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::progress::SessionProgress;
use super::{Outcome, SessionEvent, SessionState};
use crate::config::EngineConfig;
use crate::http::HttpClient;
use crate::manifest;
use crate::sink::{Capabilities, Sink, Strategy, select_strategy};
use crate::size_cache::SizeCache;
use crate::volume::allocate;
use crate::zip;
use crate::{Error, Result};

/// Result of a size-estimation pass over a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEstimate {
    /// Sum of all known sizes across the deduplicated selection.
    pub bytes_total: u64,
    /// URLs whose size could not be determined (excluded from the total).
    pub unknown_files: usize,
    /// Companion files that will be bundled without being listed.
    pub companion_count: usize,
}

/// Orchestrates download sessions end to end.
///
/// Runs size probing, manifest construction and volume allocation, then
/// drives each volume through assembly into a sink, and each oversized
/// file through a direct transfer. Only one session may run at a time;
/// the size cache underneath is shared across sessions for the lifetime of
/// the coordinator.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use volzip::{Coordinator, EngineConfig, ReqwestClient};
///
/// # async fn demo() -> volzip::Result<()> {
/// let client = Arc::new(ReqwestClient::new()?);
/// let (coordinator, mut events) = Coordinator::new(client, EngineConfig::default(), "/tmp");
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("{event:?}");
///     }
/// });
///
/// let outcome = coordinator
///     .start(
///         &["http://files/rec/img_0001.ser".into()],
///         &["http://files/rec/img_0001.json".into()],
///         &["Titan/2021-05-12".into()],
///         "record.zip",
///     )
///     .await?;
/// println!("{outcome:?}");
/// # Ok(())
/// # }
/// ```
pub struct Coordinator {
    client: Arc<dyn HttpClient>,
    cache: SizeCache,
    config: EngineConfig,
    dest_dir: PathBuf,
    active: AtomicBool,
    next_session_id: AtomicU64,
    events: mpsc::UnboundedSender<SessionEvent>,
    current_cancel: Mutex<Option<CancellationToken>>,
}

impl Coordinator {
    /// Creates a coordinator writing into `dest_dir` and returns it along
    /// with the receiving end of its event channel.
    pub fn new(
        client: Arc<dyn HttpClient>,
        config: EngineConfig,
        dest_dir: impl Into<PathBuf>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                client,
                cache: SizeCache::new(),
                config,
                dest_dir: dest_dir.into(),
                active: AtomicBool::new(false),
                next_session_id: AtomicU64::new(1),
                events,
                current_cancel: Mutex::new(None),
            },
            receiver,
        )
    }

    /// The shared size cache (probe results persist across sessions).
    pub fn size_cache(&self) -> &SizeCache {
        &self.cache
    }

    /// Probes the selection and returns a size estimate for display,
    /// including derivable companions and the unknown-size caveat.
    pub async fn estimate(
        &self,
        content_urls: &[String],
        metadata_urls: &[String],
    ) -> SizeEstimate {
        let companions = manifest::companion_urls(content_urls, &self.config.companion_rule);
        let mut urls: Vec<String> = Vec::new();
        for url in content_urls
            .iter()
            .chain(metadata_urls.iter())
            .chain(companions.iter())
        {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        self.cache.probe(&*self.client, &urls).await;

        let companion_count = companions
            .iter()
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .filter(|url| self.cache.size_of(url.as_str()).is_known())
            .count();
        SizeEstimate {
            bytes_total: self.cache.total_of(&urls),
            unknown_files: self.cache.unknown_count(&urls),
            companion_count,
        }
    }

    /// Runs one download session to its terminal outcome.
    ///
    /// Fails immediately — without creating a session — with
    /// [`Error::AlreadyInProgress`] when one is running,
    /// [`Error::ManifestInput`] on malformed selection arrays (before any
    /// network activity), or [`Error::SinkUnsupported`] when the
    /// environment offers no delivery strategy. Failures after that point
    /// are reported as [`Outcome::Failed`]; cancellation as
    /// [`Outcome::Cancelled`] with partial output kept.
    pub async fn start(
        &self,
        content_urls: &[String],
        metadata_urls: &[String],
        paths: &[String],
        archive_title: &str,
    ) -> Result<Outcome> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyInProgress);
        }
        let _guard = ActiveGuard(&self.active);

        manifest::validate(content_urls, metadata_urls, paths)?;
        let strategy = select_strategy(Capabilities::detect())?;

        let cancel = CancellationToken::new();
        self.set_cancel(Some(cancel.clone()));

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "session {session_id}: starting download of {} selected files as '{archive_title}'",
            content_urls.len()
        );
        self.emit_state(SessionState::Pending);

        let result = self
            .run(
                strategy,
                &cancel,
                content_urls,
                metadata_urls,
                paths,
                archive_title,
            )
            .await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancellation() => Outcome::Cancelled,
            Err(e) => Outcome::Failed(e),
        };

        let state = match &outcome {
            Outcome::Completed => SessionState::Completed,
            Outcome::Cancelled => SessionState::Cancelled,
            Outcome::Failed(e) => {
                log::error!("session {session_id} failed: {e}");
                SessionState::Failed
            }
        };
        self.emit_state(state);
        self.set_cancel(None);
        log::info!("session {session_id}: terminal state {state:?}");
        Ok(outcome)
    }

    /// Cancels the running session, if any.
    ///
    /// Safe to call at any time; the session transitions to `Cancelled`
    /// and everything already written stays on disk.
    pub fn cancel(&self) {
        if let Some(token) = self
            .current_cancel
            .lock()
            .expect("cancel slot lock poisoned")
            .as_ref()
        {
            log::info!("cancellation requested");
            token.cancel();
        }
    }

    /// Returns `true` while a session is running.
    pub fn is_downloading(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn run(
        &self,
        strategy: Strategy,
        cancel: &CancellationToken,
        content_urls: &[String],
        metadata_urls: &[String],
        paths: &[String],
        archive_title: &str,
    ) -> Result<Outcome> {
        self.emit_state(SessionState::Running);

        // Probe content, metadata and every derivable companion in one
        // batch so allocation sees a fully-primed cache.
        let companions = manifest::companion_urls(content_urls, &self.config.companion_rule);
        let probe_urls: Vec<&String> = content_urls
            .iter()
            .chain(metadata_urls.iter())
            .chain(companions.iter())
            .collect();
        self.cache.probe(&*self.client, &probe_urls).await;
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let entries = manifest::build(
            content_urls,
            metadata_urls,
            paths,
            &self.cache,
            &self.config.companion_rule,
        )?;
        let companion_count = entries.iter().filter(|e| e.companion_url.is_some()).count();
        if companion_count > 0 {
            self.emit(SessionEvent::CompanionNotice {
                count: companion_count,
            });
        }

        let allocation = allocate(&entries, &self.cache, self.config.volume_cap_bytes)?;
        let all_urls: Vec<String> = allocation
            .volumes
            .iter()
            .flat_map(|v| v.urls().map(str::to_string))
            .chain(allocation.oversized.iter().map(|o| o.url.clone()))
            .collect();
        let bytes_total = allocation.total_known_bytes();
        self.emit(SessionEvent::SizeEstimated {
            bytes_total,
            unknown_files: self.cache.unknown_count(&all_urls),
        });
        if allocation.volumes.len() > 1 {
            self.emit(SessionEvent::SplitNotice {
                volume_count: allocation.volumes.len(),
                cap_bytes: self.config.volume_cap_bytes,
            });
        }
        if !allocation.oversized.is_empty() {
            self.emit(SessionEvent::OversizedNotice {
                filenames: allocation
                    .oversized
                    .iter()
                    .map(|o| o.filename.clone())
                    .collect(),
            });
        }

        let progress = SessionProgress::new(bytes_total, self.events.clone());

        // Volumes are processed one at a time to bound peak resource usage;
        // within each, the assembler keeps a single entry fetch in flight.
        let volume_count = allocation.volumes.len();
        for volume in allocation.volumes {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            let index = volume.index;
            let filename = volume_filename(archive_title, index, volume_count);
            self.emit(SessionEvent::VolumeStarted {
                index,
                count: volume_count,
                filename: filename.clone(),
            });

            let sink = Sink::create(
                strategy,
                &self.dest_dir,
                &filename,
                volume.total_bytes,
                &self.config,
            )?;
            let stream = zip::assemble(volume, Arc::clone(&self.client), cancel.clone());
            sink.write(stream, progress.as_progress_fn(), cancel.clone())
                .await?;
            if cancel.is_cancelled() {
                // The assembler closes cleanly on cancellation, so the sink
                // may have reported success for a truncated archive.
                return Ok(Outcome::Cancelled);
            }
            self.emit(SessionEvent::VolumeFinished { index });
        }

        for oversized in allocation.oversized {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            self.emit(SessionEvent::FileStarted {
                filename: oversized.filename.clone(),
            });
            let sink = Sink::create(
                strategy,
                &self.dest_dir,
                &oversized.filename,
                oversized.size.or_zero(),
                &self.config,
            )?;
            let stream = self.client.fetch(&oversized.url).await?;
            sink.write(stream, progress.as_progress_fn(), cancel.clone())
                .await?;
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            self.emit(SessionEvent::FileFinished {
                filename: oversized.filename,
            });
        }

        log::info!(
            "all transfers finished: {} bytes delivered",
            progress.delivered()
        );
        Ok(Outcome::Completed)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn emit_state(&self, state: SessionState) {
        self.emit(SessionEvent::StateChanged { state });
    }

    fn set_cancel(&self, token: Option<CancellationToken>) {
        *self
            .current_cancel
            .lock()
            .expect("cancel slot lock poisoned") = token;
    }
}

/// Clears the single-flight flag on every terminal path.
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Derives the destination filename for one volume.
///
/// Single-volume downloads keep the requested title; multi-volume
/// downloads insert `-{n}of{m}` before the extension.
fn volume_filename(title: &str, index: u32, count: usize) -> String {
    if count <= 1 {
        return title.to_string();
    }
    match title.rfind('.') {
        Some(pos) if pos > 0 => {
            format!("{}-{index}of{count}{}", &title[..pos], &title[pos..])
        }
        _ => format!("{title}-{index}of{count}"),
    }
}
