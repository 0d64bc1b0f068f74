//! Engine configuration and tunable constants.
//!
//! All reference constants live here so the packing policy, relay chunking
//! and sink pacing can be tuned without touching the algorithms. Defaults
//! reproduce the reference behavior.

use std::time::Duration;

use crate::manifest::CompanionRule;

/// IEC byte unit: 1 MiB.
pub const BYTES_MIB: u64 = 1024 * 1024;

/// Default per-volume cap in bytes (4 GiB).
///
/// A conservative ceiling for one archive volume. Raising it requires
/// end-to-end ZIP64 guarantees; the policy of one bounded volume per
/// archive, with oversized singles routed separately, is fixed either way.
pub const DEFAULT_VOLUME_CAP: u64 = 4_294_967_296;

/// Default ceiling for a single chunk delivered through the relay sink
/// (50 MiB). Larger chunks are split before reaching the consumer.
pub const DEFAULT_RELAY_CHUNK_CEILING: usize = 50 * BYTES_MIB as usize;

/// Conservative relay chunk ceiling (5 MiB) for consumers known to
/// mismanage very large chunks.
pub const CONSERVATIVE_RELAY_CHUNK_CEILING: usize = 5 * BYTES_MIB as usize;

/// Reference rate cap for the buffered sink when throttling is enabled
/// (30 MiB/s). Disabled by default; see [`EngineConfig::throttle_bytes_per_sec`].
pub const REFERENCE_THROTTLE_RATE: u64 = 30 * BYTES_MIB;

/// Configuration for a download engine instance.
///
/// Built with a fluent API, validated on use rather than construction:
///
/// ```rust
/// use volzip::EngineConfig;
///
/// let config = EngineConfig::new()
///     .volume_cap(2 * 1024 * 1024 * 1024)
///     .relay_chunk_ceiling(8 * 1024 * 1024);
/// assert_eq!(config.volume_cap_bytes, 2 * 1024 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum total bytes packed into one archive volume.
    pub volume_cap_bytes: u64,
    /// Maximum size of a single chunk forwarded by the relay sink's
    /// background context; larger chunks are re-chunked defensively.
    pub relay_chunk_ceiling: usize,
    /// How long the relay sink waits for the background context to
    /// acknowledge a transfer registration.
    pub relay_ready_timeout: Duration,
    /// Queue depth between reader and writer in the buffered sink. Kept
    /// small so the queue never hides more than one chunk of buffering.
    pub buffered_queue_depth: usize,
    /// Artificial rate cap for the buffered sink in bytes per second;
    /// `0` disables pacing. This is a workaround for destinations with
    /// broken internal backpressure, not part of the core contract.
    pub throttle_bytes_per_sec: u64,
    /// Naming rule used to derive companion files from content URLs.
    pub companion_rule: CompanionRule,
}

impl EngineConfig {
    /// Creates a configuration with the reference defaults.
    pub fn new() -> Self {
        Self {
            volume_cap_bytes: DEFAULT_VOLUME_CAP,
            relay_chunk_ceiling: DEFAULT_RELAY_CHUNK_CEILING,
            relay_ready_timeout: Duration::from_secs(5),
            buffered_queue_depth: 1,
            throttle_bytes_per_sec: 0,
            companion_rule: CompanionRule::default(),
        }
    }

    /// Sets the per-volume byte cap.
    pub fn volume_cap(mut self, cap: u64) -> Self {
        self.volume_cap_bytes = cap;
        self
    }

    /// Sets the relay chunk ceiling.
    pub fn relay_chunk_ceiling(mut self, ceiling: usize) -> Self {
        self.relay_chunk_ceiling = ceiling;
        self
    }

    /// Switches the relay sink to the conservative chunk ceiling.
    pub fn conservative_relay_chunks(mut self) -> Self {
        self.relay_chunk_ceiling = CONSERVATIVE_RELAY_CHUNK_CEILING;
        self
    }

    /// Sets the buffered sink's rate cap in bytes per second (`0` disables).
    pub fn throttle_bytes_per_sec(mut self, rate: u64) -> Self {
        self.throttle_bytes_per_sec = rate;
        self
    }

    /// Sets the companion-file naming rule.
    pub fn companion_rule(mut self, rule: CompanionRule) -> Self {
        self.companion_rule = rule;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
