//! Canonical, ordered list of conversation summaries.
//!
//! Every mutation goes through [`reduce`], a pure function from the previous
//! list and a [`StorePatch`] to the next list. The store swaps the list
//! wholesale, so no caller ever edits a field of a shared conversation in place.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::domain::entities::{Conversation, ConversationId, ConversationRow, LastMessage, UserId};

/// A proposed change to the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorePatch {
    /// Replace the whole list with a reconciliation snapshot.
    ReplaceAll(Vec<Conversation>),
    /// Shift the unread count by `delta` and optionally move the last message.
    Increment {
        id: ConversationId,
        delta: i32,
        last_message: Option<LastMessage>,
    },
    /// The other participant read self's messages. `None` targets every conversation.
    ReadReceipt { id: Option<ConversationId> },
    /// Force the unread count to zero.
    ForceZero(ConversationId),
    /// Raise the unread count back to a protected value.
    Restore {
        id: ConversationId,
        unread: u32,
        last_message: Option<LastMessage>,
    },
    /// Merge conversation row metadata. Never touches the unread count.
    Metadata(ConversationRow),
    /// Show a message self just sent. Moves the preview only.
    LocalPreview {
        id: ConversationId,
        last_message: LastMessage,
    },
    /// The other participant's last-read marker moved.
    OtherRead {
        id: ConversationId,
        at: DateTime<Utc>,
    },
    /// Self's last-read marker moved.
    SelfRead {
        id: ConversationId,
        at: DateTime<Utc>,
    },
}

impl StorePatch {
    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ReplaceAll(_) => "replace_all",
            Self::Increment { .. } => "increment",
            Self::ReadReceipt { .. } => "read_receipt",
            Self::ForceZero(_) => "force_zero",
            Self::Restore { .. } => "restore",
            Self::Metadata(_) => "metadata",
            Self::LocalPreview { .. } => "local_preview",
            Self::OtherRead { .. } => "other_read",
            Self::SelfRead { .. } => "self_read",
        }
    }
}

/// Sorts conversations by last message, newest first; conversations without messages last.
pub fn sort_by_last_message(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
}

/// Applies `patch` to `current`. Returns `None` when nothing changed.
#[must_use]
pub fn reduce(
    current: &[Conversation],
    self_id: &UserId,
    patch: StorePatch,
) -> Option<Vec<Conversation>> {
    let mut next = match patch {
        StorePatch::ReplaceAll(list) => carry_watermarks(current, list),
        StorePatch::Increment {
            id,
            delta,
            last_message,
        } => update_one(current, &id, |conv| {
            conv.unread_count = conv.unread_count.saturating_add_signed(delta);
            if let Some(last) = last_message {
                conv.ingest_last_message(last);
            }
        })?,
        StorePatch::ReadReceipt { id } => {
            let mut next = current.to_vec();
            for conv in next
                .iter_mut()
                .filter(|c| id.as_ref().is_none_or(|target| &c.id == target))
            {
                if conv.last_sent_by(self_id) {
                    conv.last_message_seen = true;
                }
            }
            next
        }
        StorePatch::ForceZero(id) => update_one(current, &id, |conv| conv.unread_count = 0)?,
        StorePatch::Restore {
            id,
            unread,
            last_message,
        } => update_one(current, &id, |conv| {
            conv.unread_count = conv.unread_count.max(unread);
            if let Some(last) = last_message {
                conv.ingest_last_message(last);
            }
        })?,
        StorePatch::Metadata(row) => update_one(current, &row.id.clone(), |conv| {
            merge_metadata(conv, row);
            conv.recompute_seen(self_id);
        })?,
        StorePatch::LocalPreview { id, last_message } => {
            update_one(current, &id, |conv| conv.set_last_message(last_message))?
        }
        StorePatch::OtherRead { id, at } => update_one(current, &id, |conv| {
            if conv.other_last_read_at.is_none_or(|prev| at > prev) {
                conv.other_last_read_at = Some(at);
            }
            conv.recompute_seen(self_id);
        })?,
        StorePatch::SelfRead { id, at } => update_one(current, &id, |conv| {
            if conv.self_last_read_at.is_none_or(|prev| at > prev) {
                conv.self_last_read_at = Some(at);
            }
        })?,
    };

    sort_by_last_message(&mut next);

    if next.as_slice() == current {
        return None;
    }
    Some(next)
}

/// A snapshot counts everything up to its own last message; a watermark never moves back.
fn carry_watermarks(current: &[Conversation], mut list: Vec<Conversation>) -> Vec<Conversation> {
    for conv in &mut list {
        conv.advance_ingested(conv.last_message_at);
        if let Some(previous) = current.iter().find(|c| c.id == conv.id) {
            conv.advance_ingested(previous.ingested_through);
        }
    }
    list
}

fn update_one(
    current: &[Conversation],
    id: &ConversationId,
    f: impl FnOnce(&mut Conversation),
) -> Option<Vec<Conversation>> {
    let index = current.iter().position(|c| &c.id == id)?;
    let mut next = current.to_vec();
    f(&mut next[index]);
    Some(next)
}

/// Merges row fields, keeping the newest last message seen so far.
fn merge_metadata(conv: &mut Conversation, row: ConversationRow) {
    let incoming_is_current = match (row.last_message_at, conv.last_message_at) {
        (Some(incoming), Some(current)) => incoming >= current,
        (Some(_), None) => true,
        (None, _) => false,
    };

    if incoming_is_current {
        if let Some(text) = row.last_message_text {
            conv.last_message_text = Some(text);
        }
        conv.last_message_at = row.last_message_at.or(conv.last_message_at);
        if let Some(sender) = row.last_message_sender_id {
            conv.last_message_sender_id = Some(sender);
        }
    }

    if let Some(updated_at) = row.updated_at
        && updated_at > conv.updated_at
    {
        conv.updated_at = updated_at;
    }
}

/// Holds the canonical conversation list for one user.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    self_id: UserId,
    conversations: Vec<Conversation>,
}

impl ConversationStore {
    #[must_use]
    pub const fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            conversations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn self_id(&self) -> &UserId {
        &self.self_id
    }

    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    #[must_use]
    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &ConversationId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn unread(&self, id: &ConversationId) -> Option<u32> {
        self.get(id).map(|c| c.unread_count)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Sum of unread counts, for the navigation badge.
    #[must_use]
    pub fn total_unread(&self) -> u32 {
        self.conversations
            .iter()
            .fold(0_u32, |acc, c| acc.saturating_add(c.unread_count))
    }

    /// Applies a patch. Returns true if the list changed.
    pub fn apply(&mut self, patch: StorePatch) -> bool {
        let kind = patch.kind();
        match reduce(&self.conversations, &self.self_id, patch) {
            Some(next) => {
                self.conversations = next;
                trace!(patch = kind, "Store patch applied");
                true
            }
            None => false,
        }
    }

    pub fn replace_all(&mut self, conversations: Vec<Conversation>) -> bool {
        self.apply(StorePatch::ReplaceAll(conversations))
    }

    pub fn apply_increment(
        &mut self,
        id: &ConversationId,
        delta: i32,
        last_message: Option<LastMessage>,
    ) -> bool {
        self.apply(StorePatch::Increment {
            id: id.clone(),
            delta,
            last_message,
        })
    }

    pub fn apply_read_receipt(&mut self, id: Option<&ConversationId>) -> bool {
        self.apply(StorePatch::ReadReceipt { id: id.cloned() })
    }

    pub fn force_zero(&mut self, id: &ConversationId) -> bool {
        self.apply(StorePatch::ForceZero(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::entities::UserProfile;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn me() -> UserId {
        UserId::from("me")
    }

    fn conv(id: &str, last_at: Option<i64>, unread: u32) -> Conversation {
        let mut conv = Conversation::new(id, UserProfile::new(format!("{id}-other"), "Other"));
        conv.last_message_at = last_at.map(ts);
        conv.unread_count = unread;
        conv.updated_at = ts(0);
        conv
    }

    fn last(text: &str, at: i64, sender: &str) -> LastMessage {
        LastMessage {
            text: Some(text.to_string()),
            at: Some(ts(at)),
            sender_id: Some(UserId::from(sender)),
            seen: false,
            updated_at: ts(at),
        }
    }

    fn ids(store: &ConversationStore) -> Vec<&str> {
        store.conversations().iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_replace_all_sorts_newest_first() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![
            conv("empty", None, 0),
            conv("old", Some(10), 0),
            conv("new", Some(20), 0),
        ]);
        assert_eq!(ids(&store), vec!["new", "old", "empty"]);
    }

    #[test]
    fn test_increment_moves_conversation_to_top() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![conv("a", Some(20), 0), conv("b", Some(10), 2)]);

        assert!(store.apply_increment(&"b".into(), 1, Some(last("hey", 30, "b-other"))));

        assert_eq!(ids(&store), vec!["b", "a"]);
        let b = store.get(&"b".into()).unwrap();
        assert_eq!(b.unread_count, 3);
        assert_eq!(b.last_message_text.as_deref(), Some("hey"));
    }

    #[test]
    fn test_negative_delta_never_goes_below_zero() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![conv("a", Some(1), 1)]);

        store.apply_increment(&"a".into(), -5, None);
        assert_eq!(store.unread(&"a".into()), Some(0));
    }

    #[test]
    fn test_patch_for_unknown_conversation_is_noop() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![conv("a", Some(1), 1)]);

        assert!(!store.force_zero(&"missing".into()));
        assert!(!store.apply_increment(&"missing".into(), 1, None));
        assert_eq!(store.total_unread(), 1);
    }

    #[test]
    fn test_force_zero_reports_no_change_when_already_zero() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![conv("a", Some(1), 0)]);
        assert!(!store.force_zero(&"a".into()));
    }

    #[test]
    fn test_read_receipt_only_marks_self_sent() {
        let mut store = ConversationStore::new(me());
        let mut mine = conv("mine", Some(2), 0);
        mine.last_message_sender_id = Some(me());
        let mut theirs = conv("theirs", Some(1), 1);
        theirs.last_message_sender_id = Some(UserId::from("theirs-other"));
        store.replace_all(vec![mine, theirs]);

        store.apply_read_receipt(None);

        assert!(store.get(&"mine".into()).unwrap().last_message_seen);
        assert!(!store.get(&"theirs".into()).unwrap().last_message_seen);
    }

    #[test]
    fn test_read_receipt_targets_single_conversation() {
        let mut store = ConversationStore::new(me());
        let mut a = conv("a", Some(2), 0);
        a.last_message_sender_id = Some(me());
        let mut b = conv("b", Some(1), 0);
        b.last_message_sender_id = Some(me());
        store.replace_all(vec![a, b]);

        store.apply_read_receipt(Some(&"b".into()));

        assert!(!store.get(&"a".into()).unwrap().last_message_seen);
        assert!(store.get(&"b".into()).unwrap().last_message_seen);
    }

    #[test]
    fn test_metadata_never_touches_unread_and_ignores_older_message() {
        let mut store = ConversationStore::new(me());
        let mut a = conv("a", Some(20), 4);
        a.last_message_text = Some("newest".to_string());
        store.replace_all(vec![a]);

        store.apply(StorePatch::Metadata(ConversationRow {
            id: "a".into(),
            last_message_text: Some("stale".to_string()),
            last_message_at: Some(ts(10)),
            last_message_sender_id: Some(me()),
            updated_at: Some(ts(10)),
        }));

        let a = store.get(&"a".into()).unwrap();
        assert_eq!(a.unread_count, 4);
        assert_eq!(a.last_message_text.as_deref(), Some("newest"));
        assert_eq!(a.last_message_at, Some(ts(20)));
    }

    #[test]
    fn test_metadata_recomputes_seen_for_self_sender() {
        let mut store = ConversationStore::new(me());
        let mut a = conv("a", Some(10), 0);
        a.other_last_read_at = Some(ts(25));
        store.replace_all(vec![a]);

        store.apply(StorePatch::Metadata(ConversationRow {
            id: "a".into(),
            last_message_text: Some("mine".to_string()),
            last_message_at: Some(ts(20)),
            last_message_sender_id: Some(me()),
            updated_at: Some(ts(20)),
        }));

        assert!(store.get(&"a".into()).unwrap().last_message_seen);
    }

    #[test]
    fn test_other_read_marker_never_moves_backwards() {
        let mut store = ConversationStore::new(me());
        let mut a = conv("a", Some(10), 0);
        a.last_message_sender_id = Some(me());
        store.replace_all(vec![a]);

        store.apply(StorePatch::OtherRead {
            id: "a".into(),
            at: ts(15),
        });
        store.apply(StorePatch::OtherRead {
            id: "a".into(),
            at: ts(5),
        });

        let a = store.get(&"a".into()).unwrap();
        assert_eq!(a.other_last_read_at, Some(ts(15)));
        assert!(a.last_message_seen);
    }

    #[test]
    fn test_restore_only_raises() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![conv("a", Some(10), 5)]);

        store.apply(StorePatch::Restore {
            id: "a".into(),
            unread: 3,
            last_message: None,
        });
        assert_eq!(store.unread(&"a".into()), Some(5));

        store.apply(StorePatch::Restore {
            id: "a".into(),
            unread: 7,
            last_message: None,
        });
        assert_eq!(store.unread(&"a".into()), Some(7));
    }

    #[test]
    fn test_metadata_moves_preview_but_not_watermark() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![conv("a", Some(10), 0)]);

        store.apply(StorePatch::Metadata(ConversationRow {
            id: "a".into(),
            last_message_text: Some("fresh".to_string()),
            last_message_at: Some(ts(20)),
            last_message_sender_id: Some(UserId::from("a-other")),
            updated_at: Some(ts(20)),
        }));

        let a = store.get(&"a".into()).unwrap();
        assert_eq!(a.last_message_at, Some(ts(20)));
        assert_eq!(a.ingested_through, Some(ts(10)));
        assert!(a.is_newer_message(ts(20)));
    }

    #[test]
    fn test_replace_all_never_lowers_watermark() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![conv("a", Some(10), 0)]);
        store.apply_increment(&"a".into(), 1, Some(last("hey", 30, "a-other")));

        store.replace_all(vec![conv("a", Some(10), 0), conv("b", Some(5), 0)]);

        assert_eq!(store.get(&"a".into()).unwrap().ingested_through, Some(ts(30)));
        assert_eq!(store.get(&"b".into()).unwrap().ingested_through, Some(ts(5)));
    }

    #[test]
    fn test_local_preview_keeps_unread_and_watermark() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![conv("a", Some(10), 2)]);

        store.apply(StorePatch::LocalPreview {
            id: "a".into(),
            last_message: last("sent", 40, "me"),
        });

        let a = store.get(&"a".into()).unwrap();
        assert_eq!(a.unread_count, 2);
        assert_eq!(a.last_message_text.as_deref(), Some("sent"));
        assert_eq!(a.ingested_through, Some(ts(10)));
    }

    #[test]
    fn test_total_unread() {
        let mut store = ConversationStore::new(me());
        store.replace_all(vec![conv("a", Some(1), 2), conv("b", Some(2), 3)]);
        assert_eq!(store.total_unread(), 5);
    }
}
