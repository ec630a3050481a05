//! Authoritative recomputation of the conversation list from the backend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::conversation_store::sort_by_last_message;
use crate::domain::entities::{
    Conversation, ConversationId, ConversationRow, OtherParticipant, SelfParticipant, UserId,
    UserProfile,
};
use crate::domain::errors::SyncError;
use crate::domain::ports::ConversationBackendPort;

/// Minimum spacing between non-forced reconciliations.
pub const RECONCILE_MIN_INTERVAL: Duration = Duration::from_millis(2000);

/// Why a reconciliation request was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    Debounced,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InFlight => write!(f, "in flight"),
            Self::Debounced => write!(f, "debounced"),
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    in_flight: usize,
    last_started: Option<Instant>,
}

/// Admission control for reconciliation: one at a time, debounced, `force` bypasses both.
#[derive(Debug)]
pub struct ReconcileGate {
    state: Mutex<GateState>,
    min_interval: Duration,
}

impl ReconcileGate {
    #[must_use]
    pub fn new(min_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState::default()),
            min_interval,
        })
    }

    /// Admits a reconciliation started at `now`.
    ///
    /// # Errors
    ///
    /// Returns the reason the request is dropped.
    pub fn try_begin_at(
        self: &Arc<Self>,
        force: bool,
        now: Instant,
    ) -> Result<FlightGuard, SkipReason> {
        let mut state = self.state.lock();
        if !force {
            if state.in_flight > 0 {
                return Err(SkipReason::InFlight);
            }
            if let Some(last) = state.last_started
                && now.saturating_duration_since(last) < self.min_interval
            {
                return Err(SkipReason::Debounced);
            }
        }
        state.in_flight += 1;
        state.last_started = Some(now);
        Ok(FlightGuard {
            gate: Arc::clone(self),
        })
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.state.lock().in_flight > 0
    }
}

/// Marks a reconciliation as running until dropped.
#[derive(Debug)]
pub struct FlightGuard {
    gate: Arc<ReconcileGate>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Fetches authoritative snapshots for one user.
#[derive(Clone)]
pub struct Reconciler {
    backend: Arc<dyn ConversationBackendPort>,
    self_id: UserId,
    gate: Arc<ReconcileGate>,
    repair_stale_read_markers: bool,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        backend: Arc<dyn ConversationBackendPort>,
        self_id: UserId,
        min_interval: Duration,
    ) -> Self {
        Self {
            backend,
            self_id,
            gate: ReconcileGate::new(min_interval),
            repair_stale_read_markers: true,
        }
    }

    #[must_use]
    pub const fn with_repair(mut self, enabled: bool) -> Self {
        self.repair_stale_read_markers = enabled;
        self
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<ReconcileGate> {
        &self.gate
    }

    /// Admits a reconciliation now. See [`ReconcileGate::try_begin_at`].
    ///
    /// # Errors
    ///
    /// Returns the reason the request is dropped.
    pub fn try_begin(&self, force: bool) -> Result<FlightGuard, SkipReason> {
        self.gate.try_begin_at(force, Instant::now())
    }

    /// Computes the conversation list. Conversations in `excluded` get a zero count without a query.
    ///
    /// # Errors
    ///
    /// Returns the first backend error; nothing is partially returned.
    pub async fn fetch(
        &self,
        excluded: &HashSet<ConversationId>,
    ) -> Result<Vec<Conversation>, SyncError> {
        let rows = self.backend.fetch_self_participants(&self.self_id).await?;
        if rows.is_empty() {
            debug!("No conversations for user");
            return Ok(Vec::new());
        }

        let ids: Vec<ConversationId> = rows.iter().map(|r| r.conversation_id.clone()).collect();
        let (conversations, others) = tokio::try_join!(
            self.backend.fetch_conversations(&ids),
            self.backend.fetch_other_participants(&self.self_id, &ids),
        )?;

        let mut other_ids: Vec<UserId> = others.iter().map(|p| p.user_id.clone()).collect();
        other_ids.sort_unstable();
        other_ids.dedup();
        let profiles = if other_ids.is_empty() {
            Vec::new()
        } else {
            self.backend.fetch_profiles(&other_ids).await?
        };

        let counts: HashMap<ConversationId, u32> = try_join_all(
            rows.iter()
                .map(|row| self.unread_for(row, excluded.contains(&row.conversation_id))),
        )
        .await?
        .into_iter()
        .collect();

        let merged = merge(&self.self_id, &rows, conversations, &others, profiles, &counts);
        info!(
            conversations = merged.len(),
            dropped = ids.len().saturating_sub(merged.len()),
            "Reconciliation snapshot fetched"
        );
        Ok(merged)
    }

    async fn unread_for(
        &self,
        row: &SelfParticipant,
        excluded: bool,
    ) -> Result<(ConversationId, u32), SyncError> {
        let id = row.conversation_id.clone();
        if excluded {
            return Ok((id, 0));
        }
        let Some(last_read) = row.last_read_at else {
            return Ok((id, 0));
        };

        if !self.repair_stale_read_markers {
            let count = self.backend.count_unread(&self.self_id, &id, last_read).await?;
            return Ok((id, count));
        }

        let (raw, own_latest) = tokio::try_join!(
            self.backend.count_unread(&self.self_id, &id, last_read),
            self.backend.latest_message_at(&id, Some(&self.self_id)),
        )?;

        match own_latest {
            Some(own) if own > last_read => {
                self.repair_read_marker(&id, own).await;
                let count = self.backend.count_unread(&self.self_id, &id, own).await?;
                Ok((id, count))
            }
            _ => Ok((id, raw)),
        }
    }

    /// Self sent a message after its own read marker, so the marker is stale.
    async fn repair_read_marker(&self, id: &ConversationId, own_latest: DateTime<Utc>) {
        let repaired = own_latest.max(Utc::now());
        debug!(conversation_id = %id, %repaired, "Repairing stale read marker");
        if let Err(e) = self
            .backend
            .update_last_read(&self.self_id, id, repaired)
            .await
        {
            warn!(conversation_id = %id, error = %e, "Read marker repair failed");
        }
    }
}

/// Joins fetched rows into sorted conversation summaries.
///
/// Conversations whose other participant or profile cannot be resolved are dropped.
#[must_use]
pub fn merge(
    self_id: &UserId,
    self_rows: &[SelfParticipant],
    conversations: Vec<ConversationRow>,
    others: &[OtherParticipant],
    profiles: Vec<UserProfile>,
    counts: &HashMap<ConversationId, u32>,
) -> Vec<Conversation> {
    let self_by_id: HashMap<&ConversationId, &SelfParticipant> =
        self_rows.iter().map(|r| (&r.conversation_id, r)).collect();
    let other_by_id: HashMap<&ConversationId, &OtherParticipant> =
        others.iter().map(|p| (&p.conversation_id, p)).collect();
    let profiles: HashMap<UserId, UserProfile> =
        profiles.into_iter().map(|p| (p.id.clone(), p)).collect();

    let mut merged: Vec<Conversation> = conversations
        .into_iter()
        .filter_map(|row| {
            let Some(other) = other_by_id.get(&row.id) else {
                debug!(conversation_id = %row.id, "Dropping conversation without other participant");
                return None;
            };
            let Some(profile) = profiles.get(&other.user_id).cloned() else {
                debug!(
                    conversation_id = %row.id,
                    user_id = %other.user_id,
                    "Dropping conversation with unresolvable profile"
                );
                return None;
            };
            let own = self_by_id.get(&row.id);

            let mut conv = Conversation::new(row.id.clone(), profile);
            conv.last_message_text = row.last_message_text;
            conv.last_message_at = row.last_message_at;
            conv.last_message_sender_id = row.last_message_sender_id;
            conv.updated_at = row
                .updated_at
                .or(row.last_message_at)
                .unwrap_or(DateTime::UNIX_EPOCH);
            conv.unread_count = counts.get(&row.id).copied().unwrap_or(0);
            conv.other_last_read_at = other.last_read_at;
            conv.self_last_read_at = own.and_then(|r| r.last_read_at);
            conv.is_muted = own.is_some_and(|r| r.is_muted);
            conv.is_blocked = own.is_some_and(|r| r.is_blocked);
            conv.recompute_seen(self_id);
            Some(conv)
        })
        .collect();

    sort_by_last_message(&mut merged);
    merged
}
