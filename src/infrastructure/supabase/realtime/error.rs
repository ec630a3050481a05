use thiserror::Error;

pub type RealtimeResult<T> = Result<T, RealtimeError>;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("connection closed with code {code}: {reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("websocket error: {message}")]
    WebSocket { message: String },

    #[error("channel join rejected: {message}")]
    JoinRejected { message: String },

    #[error("channel error: {message}")]
    ChannelError { message: String },

    #[error("heartbeat timeout: no reply received")]
    HeartbeatTimeout,

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("channel closed")]
    ChannelClosed,

    #[error("not connected")]
    NotConnected,
}

impl RealtimeError {
    #[must_use]
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub const fn should_reconnect(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. }
            | Self::ConnectionClosed { .. }
            | Self::WebSocket { .. }
            | Self::ChannelError { .. }
            | Self::HeartbeatTimeout
            | Self::Timeout { .. } => true,

            Self::JoinRejected { .. }
            | Self::Serialization { .. }
            | Self::Protocol { .. }
            | Self::ChannelClosed
            | Self::NotConnected => false,
        }
    }
}
