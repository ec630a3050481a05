use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use inbox_sync::application::{InboxSnapshot, SyncDependencies, SyncService};
use inbox_sync::domain::entities::{AccessToken, UserId};
use inbox_sync::domain::ports::{MessageCachePort, RealtimePort};
use inbox_sync::infrastructure::{
    AppConfig, CliArgs, FileMessageCache, JsonConversationCache, PostgrestBackend,
    RealtimeClientConfig, StorageManager, SupabaseRealtime,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    Ok(())
}

fn load_config() -> Result<(AppConfig, CliArgs, StorageManager)> {
    let args = CliArgs::parse();
    let storage = StorageManager::new().wrap_err("failed to locate config directory")?;
    let mut config = storage
        .load_config(args.config.as_deref())
        .wrap_err("failed to load configuration")?;
    config.merge_with_args(&args);
    Ok((config, args, storage))
}

async fn log_badge_changes(mut snapshots: watch::Receiver<InboxSnapshot>) {
    let mut last_badge = None;
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        let badge = snapshot.badge_label();
        if badge != last_badge {
            info!(
                badge = badge.as_deref().unwrap_or("-"),
                conversations = snapshot.conversations.len(),
                total_unread = snapshot.total_unread,
                "Inbox updated"
            );
            last_badge = badge;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();

    let (config, args, storage) = load_config()?;
    init_logging(&config)?;

    info!(version = inbox_sync::VERSION, "Starting {}", inbox_sync::NAME);

    let base_url = config
        .backend
        .url
        .clone()
        .ok_or_else(|| eyre!("backend URL is not configured"))?;
    let anon_key = config
        .backend
        .anon_key
        .clone()
        .ok_or_else(|| eyre!("backend API key is not configured"))?;
    let token = args
        .access_token
        .as_deref()
        .and_then(AccessToken::new)
        .ok_or_else(|| eyre!("an access token is required"))?;
    let self_id = args
        .user_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .map(UserId::from)
        .ok_or_else(|| eyre!("a user id is required"))?;

    let cache_dir = storage
        .cache_dir_for(&config)
        .wrap_err("failed to prepare cache directory")?;
    let conversation_cache = Arc::new(JsonConversationCache::new(&cache_dir));
    let message_cache: Arc<dyn MessageCachePort> = Arc::new(FileMessageCache::new(
        Some(cache_dir.clone()),
        config.cache.message_cache_limit,
        config.cache.max_cached_conversations,
    ));

    let backend = Arc::new(
        PostgrestBackend::new(
            &base_url,
            anon_key.clone(),
            token.clone(),
            Duration::from_secs(config.backend.request_timeout_secs),
        )
        .wrap_err("failed to create backend client")?,
    );

    let mut realtime = SupabaseRealtime::new(RealtimeClientConfig::new(&base_url, anon_key));
    let events = if config.backend.realtime {
        Some(
            realtime
                .subscribe(&token, &self_id)
                .wrap_err("failed to subscribe to realtime feed")?,
        )
    } else {
        warn!("Realtime disabled, relying on periodic reconciliation");
        None
    };

    let deps = SyncDependencies {
        self_id,
        backend,
        conversation_cache,
        message_cache: Some(message_cache),
    };
    let (handle, service_task) = SyncService::spawn(deps, config.sync.to_settings(), events);
    let badge_task = tokio::spawn(log_badge_changes(handle.watch()));

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for Ctrl-C")?;
    info!("Shutting down");

    realtime.unsubscribe();
    if handle.shutdown().is_err() {
        warn!("Sync service already stopped");
    }
    service_task.await.wrap_err("sync service task failed")?;
    badge_task.abort();

    Ok(())
}
