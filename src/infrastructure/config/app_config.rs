//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::args::CliArgs;
use crate::application::SyncSettings;

const APP_NAME: &str = "inbox-sync";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Sync engine timing.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Backend endpoints.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Local caches.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds an optimistic clear masks stale counts.
    #[serde(default = "default_pending_clear_ttl_secs")]
    pub pending_clear_ttl_secs: u64,

    /// Seconds a realtime increment is protected from stale reconciliation.
    #[serde(default = "default_protection_ttl_secs")]
    pub protection_ttl_secs: u64,

    /// Minimum milliseconds between non-forced reconciliations.
    #[serde(default = "default_reconcile_min_interval_ms")]
    pub reconcile_min_interval_ms: u64,

    /// Seconds between background reconciliations. Zero disables polling.
    #[serde(default = "default_reconcile_poll_interval_secs")]
    pub reconcile_poll_interval_secs: u64,

    /// Maximum characters of a last-message preview.
    #[serde(default = "default_preview_max_chars")]
    pub preview_max_chars: usize,

    /// Repair self's read marker when self sent a newer message.
    #[serde(default = "default_true")]
    pub repair_stale_read_markers: bool,
}

impl SyncConfig {
    #[must_use]
    pub const fn to_settings(&self) -> SyncSettings {
        SyncSettings {
            pending_clear_ttl: Duration::from_secs(self.pending_clear_ttl_secs),
            protection_ttl: Duration::from_secs(self.protection_ttl_secs),
            reconcile_min_interval: Duration::from_millis(self.reconcile_min_interval_ms),
            reconcile_poll_interval: Duration::from_secs(self.reconcile_poll_interval_secs),
            preview_max_chars: self.preview_max_chars,
            repair_stale_read_markers: self.repair_stale_read_markers,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pending_clear_ttl_secs: default_pending_clear_ttl_secs(),
            protection_ttl_secs: default_protection_ttl_secs(),
            reconcile_min_interval_ms: default_reconcile_min_interval_ms(),
            reconcile_poll_interval_secs: default_reconcile_poll_interval_secs(),
            preview_max_chars: default_preview_max_chars(),
            repair_stale_read_markers: true,
        }
    }
}

/// Backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    #[serde(default)]
    pub url: Option<String>,

    /// Public API key sent as `apikey`.
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Subscribe to the realtime feed.
    #[serde(default = "default_true")]
    pub realtime: bool,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            realtime: true,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Local cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory. Defaults to the platform cache directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Messages kept per conversation.
    #[serde(default = "default_message_cache_limit")]
    pub message_cache_limit: usize,

    /// Conversations whose messages are kept in memory.
    #[serde(default = "default_max_cached_conversations")]
    pub max_cached_conversations: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            message_cache_limit: default_message_cache_limit(),
            max_cached_conversations: default_max_cached_conversations(),
        }
    }
}

const fn default_pending_clear_ttl_secs() -> u64 {
    15
}

const fn default_protection_ttl_secs() -> u64 {
    30
}

const fn default_reconcile_min_interval_ms() -> u64 {
    2000
}

const fn default_reconcile_poll_interval_secs() -> u64 {
    60
}

const fn default_preview_max_chars() -> usize {
    100
}

const fn default_request_timeout_secs() -> u64 {
    15
}

const fn default_message_cache_limit() -> usize {
    100
}

const fn default_max_cached_conversations() -> usize {
    64
}

const fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(url) = &args.backend_url {
            self.backend.url = Some(url.clone());
        }
        if let Some(anon_key) = &args.anon_key {
            self.backend.anon_key = Some(anon_key.clone());
        }
        if args.no_realtime {
            self.backend.realtime = false;
        }
        if let Some(poll) = args.poll_interval {
            self.sync.reconcile_poll_interval_secs = poll;
        }
        if let Some(dir) = &args.cache_dir {
            self.cache.dir = Some(dir.clone());
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("inbox-sync.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}
