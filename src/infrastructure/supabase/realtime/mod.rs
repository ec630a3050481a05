//! Phoenix-channel realtime feed.

mod client;
mod connection;
mod constants;
mod error;
mod heartbeat;
mod payloads;

pub use client::{RealtimeClientConfig, SupabaseRealtime};
pub use constants::{HEARTBEAT_INTERVAL, SUBSCRIBED_CHANGES};
pub use error::{RealtimeError, RealtimeResult};
pub use payloads::parse_timestamp;
