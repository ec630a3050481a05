use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tracing::{debug, trace, warn};

use super::payloads::PhoenixMessage;

/// Frames the heartbeat task hands to the connection writer.
#[derive(Debug)]
pub enum Outbound {
    Frame(PhoenixMessage),
    /// The previous heartbeat was never answered.
    AckMissed,
}

pub struct HeartbeatManager {
    interval: Duration,
    reference: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    ack_received: Arc<AtomicBool>,
}

impl HeartbeatManager {
    /// Creates a manager whose message refs continue from `reference`.
    #[must_use]
    pub fn new(interval: Duration, reference: Arc<AtomicU64>) -> Self {
        Self {
            interval,
            reference,
            running: Arc::new(AtomicBool::new(false)),
            ack_received: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn start(&self, outbound_tx: mpsc::Sender<Outbound>) -> tokio::task::JoinHandle<()> {
        let interval = self.interval;
        let reference = self.reference.clone();
        let running = self.running.clone();
        let ack_received = self.ack_received.clone();

        running.store(true, Ordering::SeqCst);
        ack_received.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);

            while running.load(Ordering::SeqCst) {
                ticker.tick().await;

                if !running.load(Ordering::SeqCst) {
                    break;
                }

                if !ack_received.load(Ordering::SeqCst) {
                    warn!("Heartbeat reply not received, connection may be dead");
                    let _ = outbound_tx.send(Outbound::AckMissed).await;
                    break;
                }

                let next = reference.fetch_add(1, Ordering::SeqCst) + 1;
                ack_received.store(false, Ordering::SeqCst);
                if outbound_tx
                    .send(Outbound::Frame(PhoenixMessage::heartbeat(next)))
                    .await
                    .is_err()
                {
                    debug!("Heartbeat channel closed");
                    break;
                }
                trace!(reference = next, "Sent heartbeat");
            }

            debug!("Heartbeat loop stopped");
        })
    }

    pub fn acknowledge(&self) {
        self.ack_received.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for HeartbeatManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sends_heartbeat_each_interval() {
        let manager = HeartbeatManager::new(Duration::from_secs(25), Arc::new(AtomicU64::new(1)));
        let (tx, mut rx) = mpsc::channel(4);
        let _handle = manager.start(tx);

        match rx.recv().await {
            Some(Outbound::Frame(frame)) => {
                assert_eq!(frame.event, "heartbeat");
                assert_eq!(frame.reference.as_deref(), Some("2"));
            }
            other => panic!("unexpected outbound: {other:?}"),
        }

        manager.acknowledge();
        assert!(matches!(rx.recv().await, Some(Outbound::Frame(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_reply_is_reported() {
        let manager = HeartbeatManager::new(Duration::from_secs(25), Arc::new(AtomicU64::new(0)));
        let (tx, mut rx) = mpsc::channel(4);
        let _handle = manager.start(tx);

        assert!(matches!(rx.recv().await, Some(Outbound::Frame(_))));
        assert!(matches!(rx.recv().await, Some(Outbound::AckMissed)));
        assert!(rx.recv().await.is_none());
    }
}
