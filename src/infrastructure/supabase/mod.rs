//! Supabase backend adapters.

mod dto;
pub mod realtime;
mod rest_client;

pub use realtime::{RealtimeClientConfig, RealtimeError, SupabaseRealtime};
pub use rest_client::PostgrestBackend;
