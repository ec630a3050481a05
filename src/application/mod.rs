//! Application layer: the sync engine, its services and use cases.

/// Sync engine and its single-writer actor.
pub mod engine;
/// Store, registries, ingestion and reconciliation.
pub mod services;
/// Use case implementations.
pub mod use_cases;

pub use engine::{EngineHandle, InboxSnapshot, SyncDependencies, SyncService, SyncSettings};
pub use use_cases::MarkReadUseCase;
