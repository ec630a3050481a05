//! Backend synchronization error types.

use thiserror::Error;

/// Errors raised while talking to the backend.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum SyncError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("backend rejected credentials: {message}")]
    Unauthorized { message: String },

    #[error("rate limited by backend, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("backend error {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("failed to decode backend response: {message}")]
    Decode { message: String },

    #[error("realtime feed already subscribed")]
    AlreadySubscribed,

    #[error("sync engine is not running")]
    EngineStopped,
}

impl SyncError {
    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates backend error.
    #[must_use]
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns whether a later attempt may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::RateLimited { .. } | Self::Backend { .. }
        )
    }
}
