use std::time::Duration;

pub const REALTIME_PATH: &str = "/realtime/v1/websocket";
pub const PROTOCOL_VERSION: &str = "1.0.0";

pub const PHOENIX_TOPIC: &str = "phoenix";
pub const TOPIC_PREFIX: &str = "realtime:";

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

pub const RECONNECT_DELAY_BASE: Duration = Duration::from_secs(1);
pub const RECONNECT_DELAY_MAX: Duration = Duration::from_secs(60);
pub const RECONNECT_JITTER_MAX: Duration = Duration::from_millis(500);
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Table changes the inbox listens to, as `(event, table)`.
pub const SUBSCRIBED_CHANGES: [(&str, &str); 6] = [
    ("INSERT", "messages"),
    ("UPDATE", "messages"),
    ("UPDATE", "conversations"),
    ("UPDATE", "conversation_participants"),
    ("INSERT", "message_reads"),
    ("*", "message_reactions"),
];

pub mod events {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const CLOSE: &str = "phx_close";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const POSTGRES_CHANGES: &str = "postgres_changes";
    pub const SYSTEM: &str = "system";
}
