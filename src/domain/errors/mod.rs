//! Domain error types.

mod cache_error;
mod sync_error;

pub use cache_error::CacheError;
pub use sync_error::SyncError;
