//! Local cache error types.

use thiserror::Error;

/// Local cache error variants.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Cache directory could not be determined.
    #[error("failed to determine cache directory")]
    CacheDirNotFound,

    /// Filesystem failure.
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be (de)serialized.
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
