use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "inbox-sync",
    version,
    about = "Keeps a direct-message inbox and its unread counts in sync",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Backend project URL.
    #[arg(long, env = "INBOX_SYNC_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Backend public API key.
    #[arg(long, env = "INBOX_SYNC_ANON_KEY", hide_env_values = true)]
    pub anon_key: Option<String>,

    /// Access token of the signed-in user.
    #[arg(long, env = "INBOX_SYNC_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// ID of the signed-in user.
    #[arg(long, env = "INBOX_SYNC_USER_ID")]
    pub user_id: Option<String>,

    /// Do not subscribe to the realtime feed.
    #[arg(long)]
    pub no_realtime: bool,

    /// Seconds between background reconciliations. Zero disables polling.
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Cache directory.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,
}
