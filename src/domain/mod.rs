//! Domain layer with core entities, errors, and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;
/// Active view context.
pub mod view_context;

pub use entities::{Conversation, ConversationId, Message, UserId};
pub use errors::{CacheError, SyncError};
pub use ports::{ConversationBackendPort, ConversationCachePort, MessageCachePort, RealtimeEvent};
pub use view_context::ViewContext;
