mod backend_port;
mod cache_port;
mod realtime_port;

pub use backend_port::ConversationBackendPort;
pub use cache_port::{ConversationCachePort, MessageCachePort};
pub use realtime_port::{RealtimeEvent, RealtimePort};
