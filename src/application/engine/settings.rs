//! Tunables of the sync engine.

use std::time::Duration;

use crate::application::services::{
    PENDING_CLEAR_TTL, PREVIEW_MAX_CHARS, PROTECTION_TTL, RECONCILE_MIN_INTERVAL,
};

/// Default period of the background reconciliation.
pub const RECONCILE_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Timing and sizing knobs for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Lifetime of an optimistic clear.
    pub pending_clear_ttl: Duration,
    /// Lifetime of a protection entry.
    pub protection_ttl: Duration,
    /// Minimum spacing between non-forced reconciliations.
    pub reconcile_min_interval: Duration,
    /// Period of the background reconciliation. Zero disables polling.
    pub reconcile_poll_interval: Duration,
    /// Maximum characters of a last-message preview.
    pub preview_max_chars: usize,
    /// Repair self's read marker when self sent a newer message.
    pub repair_stale_read_markers: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pending_clear_ttl: PENDING_CLEAR_TTL,
            protection_ttl: PROTECTION_TTL,
            reconcile_min_interval: RECONCILE_MIN_INTERVAL,
            reconcile_poll_interval: RECONCILE_POLL_INTERVAL,
            preview_max_chars: PREVIEW_MAX_CHARS,
            repair_stale_read_markers: true,
        }
    }
}
