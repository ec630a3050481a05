//! inbox-sync - conversation cache and unread-count synchronization.
//!
//! Keeps a direct-message conversation list and its unread badges consistent
//! across a realtime feed, periodic reconciliation, and optimistic local clears.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the sync engine and use cases.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "inbox-sync";
