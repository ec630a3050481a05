//! Sync engine and the actor that owns it.

mod service;
mod settings;
mod sync_engine;

pub use service::{
    EngineCommand, EngineHandle, InboxSnapshot, SyncDependencies, SyncService, badge_label,
};
pub use settings::{RECONCILE_POLL_INTERVAL, SyncSettings};
pub use sync_engine::{Effect, SyncEngine};
