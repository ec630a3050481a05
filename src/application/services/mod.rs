pub mod chat_listeners;
pub mod conversation_store;
pub mod pending_clears;
pub mod protection_window;
pub mod realtime_ingestor;
pub mod reconciliation;

pub use chat_listeners::{ChatEvent, ChatListeners};
pub use conversation_store::{ConversationStore, StorePatch};
pub use pending_clears::{PENDING_CLEAR_TTL, PendingClears};
pub use protection_window::{PROTECTION_TTL, ProtectionWindow};
pub use realtime_ingestor::{IngestContext, Ingestion, PREVIEW_MAX_CHARS, RealtimeIngestor};
pub use reconciliation::{RECONCILE_MIN_INTERVAL, ReconcileGate, Reconciler, SkipReason};
