//! Infrastructure layer with external service adapters.

/// On-disk conversation and message caches.
pub mod cache;
/// Application configuration.
pub mod config;
/// Supabase REST and realtime adapters.
pub mod supabase;

pub use cache::{FileMessageCache, JsonConversationCache};
pub use config::{AppConfig, CliArgs, LogLevel, StorageManager};
pub use supabase::{PostgrestBackend, RealtimeClientConfig, SupabaseRealtime};
