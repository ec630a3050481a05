use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{Notify, mpsc};
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::connection::{RealtimeSession, SessionEnd};
use super::constants::{
    MAX_RECONNECT_ATTEMPTS, PROTOCOL_VERSION, REALTIME_PATH, RECONNECT_DELAY_BASE,
    RECONNECT_DELAY_MAX, RECONNECT_JITTER_MAX, TOPIC_PREFIX,
};
use crate::domain::entities::{AccessToken, UserId};
use crate::domain::errors::SyncError;
use crate::domain::ports::{RealtimeEvent, RealtimePort};

pub struct RealtimeClientConfig {
    pub base_url: String,
    pub anon_key: String,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
}

impl RealtimeClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            auto_reconnect: true,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }

    #[must_use]
    pub const fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Websocket endpoint derived from the project URL.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = base
            .strip_prefix("https://")
            .map(|rest| format!("wss://{rest}"))
            .or_else(|| base.strip_prefix("http://").map(|rest| format!("ws://{rest}")))
            .unwrap_or_else(|| base.to_string());
        format!(
            "{base}{REALTIME_PATH}?apikey={}&vsn={PROTOCOL_VERSION}",
            self.anon_key
        )
    }
}

/// Realtime feed over a Phoenix channel, reconnecting with backoff.
pub struct SupabaseRealtime {
    config: RealtimeClientConfig,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
}

impl SupabaseRealtime {
    #[must_use]
    pub fn new(config: RealtimeClientConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
        }
    }
}

impl RealtimePort for SupabaseRealtime {
    fn subscribe(
        &mut self,
        token: &AccessToken,
        user_id: &UserId,
    ) -> Result<mpsc::UnboundedReceiver<RealtimeEvent>, SyncError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SyncError::AlreadySubscribed);
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let config = LoopConfig {
            url: self.config.websocket_url(),
            topic: format!("{TOPIC_PREFIX}inbox:{user_id}"),
            token: token.clone(),
            auto_reconnect: self.config.auto_reconnect,
            max_attempts: self.config.max_reconnect_attempts,
        };
        let running = self.running.clone();
        let stop = self.stop.clone();

        running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let result = std::panic::AssertUnwindSafe(run_realtime_loop(
                config,
                event_tx.clone(),
                running.clone(),
                stop,
            ));

            if let Err(panic_info) = result.catch_unwind().await {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };

                error!(panic = %panic_msg, "Realtime task panicked");
                running.store(false, Ordering::SeqCst);
                let _ = event_tx.send(RealtimeEvent::Error {
                    message: format!("Realtime task panicked: {panic_msg}"),
                    recoverable: false,
                });
            }
        });

        Ok(event_rx)
    }

    fn unsubscribe(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.stop.notify_one();
        }
    }

    fn is_subscribed(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct LoopConfig {
    url: String,
    topic: String,
    token: AccessToken,
    auto_reconnect: bool,
    max_attempts: u32,
}

async fn run_realtime_loop(
    config: LoopConfig,
    event_tx: mpsc::UnboundedSender<RealtimeEvent>,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
) {
    let mut reconnect_attempts: u32 = 0;

    while running.load(Ordering::SeqCst) {
        let session = RealtimeSession {
            url: &config.url,
            topic: &config.topic,
            access_token: config.token.as_str(),
            event_tx: &event_tx,
            stop: &stop,
        };

        match session.run().await {
            Ok(SessionEnd::Stopped) => break,
            Ok(SessionEnd::Dropped(e)) => {
                warn!(error = %e, "Realtime connection dropped");
                reconnect_attempts = 1;
                let _ = event_tx.send(RealtimeEvent::Disconnected {
                    reason: e.to_string(),
                });
                if !e.should_reconnect() {
                    let _ = event_tx.send(RealtimeEvent::Error {
                        message: e.to_string(),
                        recoverable: false,
                    });
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to join realtime channel");
                let _ = event_tx.send(RealtimeEvent::Error {
                    message: e.to_string(),
                    recoverable: e.should_reconnect(),
                });
                if !e.should_reconnect() {
                    break;
                }
                reconnect_attempts += 1;
            }
        }

        if !running.load(Ordering::SeqCst) || event_tx.is_closed() {
            break;
        }

        if !config.auto_reconnect {
            break;
        }

        if reconnect_attempts >= config.max_attempts {
            error!(
                attempts = reconnect_attempts,
                "Max reconnection attempts exceeded"
            );
            let _ = event_tx.send(RealtimeEvent::Error {
                message: format!(
                    "Max reconnection attempts ({}) exceeded",
                    config.max_attempts
                ),
                recoverable: false,
            });
            break;
        }

        let delay = calculate_backoff_delay(reconnect_attempts);
        info!(
            attempt = reconnect_attempts,
            delay_ms = delay.as_millis(),
            "Reconnecting to realtime"
        );
        let _ = event_tx.send(RealtimeEvent::Reconnecting {
            attempt: reconnect_attempts,
        });

        tokio::select! {
            () = sleep(delay) => {}
            () = stop.notified() => break,
        }
    }

    running.store(false, Ordering::SeqCst);
    info!("Realtime loop terminated");
}

#[allow(clippy::cast_possible_truncation)]
fn calculate_backoff_delay(attempt: u32) -> Duration {
    let base_delay = RECONNECT_DELAY_BASE.as_millis() as u64;
    let max_delay = RECONNECT_DELAY_MAX.as_millis() as u64;
    let jitter_max = RECONNECT_JITTER_MAX.as_millis() as u64;

    let exponential_delay = base_delay.saturating_mul(2_u64.saturating_pow(attempt.min(6)));
    let capped_delay = exponential_delay.min(max_delay);

    Duration::from_millis(capped_delay.saturating_add(rand_jitter(jitter_max)))
}

fn rand_jitter(max: u64) -> u64 {
    use std::time::SystemTime;

    if max == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);

    nanos % max
}
