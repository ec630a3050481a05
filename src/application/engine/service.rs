//! Single-writer actor around [`SyncEngine`].
//!
//! Realtime events, UI actions, reconciliation results and timers all arrive
//! as messages on one task, which is the only code that ever touches the
//! engine. Network work runs on spawned tasks that report back through the
//! same command channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

use super::settings::SyncSettings;
use super::sync_engine::{Effect, SyncEngine};
use crate::application::services::{ChatEvent, ChatListeners, Reconciler};
use crate::application::use_cases::MarkReadUseCase;
use crate::domain::entities::{Conversation, ConversationId, MessageId, Reaction, UserId};
use crate::domain::errors::SyncError;
use crate::domain::ports::{ConversationBackendPort, ConversationCachePort, MessageCachePort};
use crate::domain::RealtimeEvent;

const EXPIRY_TICK: Duration = Duration::from_secs(1);
const BADGE_CAP: u32 = 99;

/// Renders the navigation badge: nothing for zero, `99+` above the cap.
#[must_use]
pub fn badge_label(total_unread: u32) -> Option<String> {
    match total_unread {
        0 => None,
        n if n > BADGE_CAP => Some(format!("{BADGE_CAP}+")),
        n => Some(n.to_string()),
    }
}

/// Read shape published to the conversation list and the navigation badge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxSnapshot {
    pub conversations: Vec<Conversation>,
    pub total_unread: u32,
    pub active: Option<ConversationId>,
    /// A reconciliation has completed at least once.
    pub reconciled: bool,
    /// Reconciliations that failed since the last successful one.
    pub reconcile_failures: u32,
}

impl InboxSnapshot {
    fn of(engine: &SyncEngine, reconcile_failures: u32) -> Self {
        Self {
            conversations: engine.conversations().to_vec(),
            total_unread: engine.total_unread(),
            active: engine.view().active().cloned(),
            reconciled: engine.is_reconciled(),
            reconcile_failures,
        }
    }

    #[must_use]
    pub fn badge_label(&self) -> Option<String> {
        badge_label(self.total_unread)
    }
}

#[derive(Debug)]
pub enum EngineCommand {
    Realtime(RealtimeEvent),
    EnterConversation(ConversationId),
    LeaveConversation,
    ClearUnread(ConversationId),
    MarkRead(ConversationId),
    UpdateLastMessage {
        id: ConversationId,
        text: String,
        sent_at: DateTime<Utc>,
    },
    Reconcile {
        force: bool,
    },
    ApplyReconciliation(Vec<Conversation>),
    ReconcileFailed,
    ReactionsFetched {
        message_id: MessageId,
        reactions: Vec<Reaction>,
    },
    ReadMarkerMoved {
        id: ConversationId,
        at: DateTime<Utc>,
    },
    Hydrate(Vec<Conversation>),
    Snapshot(oneshot::Sender<InboxSnapshot>),
    SubscribeChat {
        id: ConversationId,
        reply: oneshot::Sender<mpsc::UnboundedReceiver<ChatEvent>>,
    },
    Shutdown,
}

/// Cheap handle for talking to a running [`SyncService`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    snapshots: watch::Receiver<InboxSnapshot>,
}

impl EngineHandle {
    fn send(&self, command: EngineCommand) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::EngineStopped)
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has exited.
    pub fn ingest(&self, event: RealtimeEvent) -> Result<(), SyncError> {
        self.send(EngineCommand::Realtime(event))
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has exited.
    pub fn enter_conversation(&self, id: ConversationId) -> Result<(), SyncError> {
        self.send(EngineCommand::EnterConversation(id))
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has exited.
    pub fn leave_conversation(&self) -> Result<(), SyncError> {
        self.send(EngineCommand::LeaveConversation)
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has exited.
    pub fn clear_unread(&self, id: ConversationId) -> Result<(), SyncError> {
        self.send(EngineCommand::ClearUnread(id))
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has exited.
    pub fn mark_conversation_read(&self, id: ConversationId) -> Result<(), SyncError> {
        self.send(EngineCommand::MarkRead(id))
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has exited.
    pub fn update_last_message(
        &self,
        id: ConversationId,
        text: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.send(EngineCommand::UpdateLastMessage {
            id,
            text: text.into(),
            sent_at: Utc::now(),
        })
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has exited.
    pub fn reconcile(&self, force: bool) -> Result<(), SyncError> {
        self.send(EngineCommand::Reconcile { force })
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has exited.
    pub async fn snapshot(&self) -> Result<InboxSnapshot, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Snapshot(tx))?;
        rx.await.map_err(|_| SyncError::EngineStopped)
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has exited.
    pub async fn subscribe_to_chat(
        &self,
        id: ConversationId,
    ) -> Result<mpsc::UnboundedReceiver<ChatEvent>, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SubscribeChat { id, reply })?;
        rx.await.map_err(|_| SyncError::EngineStopped)
    }

    /// Receiver of every published snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<InboxSnapshot> {
        self.snapshots.clone()
    }

    /// # Errors
    /// Returns `SyncError::EngineStopped` if the service has already exited.
    pub fn shutdown(&self) -> Result<(), SyncError> {
        self.send(EngineCommand::Shutdown)
    }
}

/// Collaborators of the sync service.
#[derive(Clone)]
pub struct SyncDependencies {
    pub self_id: UserId,
    pub backend: Arc<dyn ConversationBackendPort>,
    pub conversation_cache: Arc<dyn ConversationCachePort>,
    pub message_cache: Option<Arc<dyn MessageCachePort>>,
}

pub struct SyncService {
    engine: SyncEngine,
    reconciler: Reconciler,
    reconcile_failures: u32,
    mark_read: MarkReadUseCase,
    backend: Arc<dyn ConversationBackendPort>,
    conversation_cache: Arc<dyn ConversationCachePort>,
    message_cache: Option<Arc<dyn MessageCachePort>>,
    listeners: ChatListeners,
    settings: SyncSettings,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    feedback: mpsc::WeakUnboundedSender<EngineCommand>,
    snapshots: watch::Sender<InboxSnapshot>,
}

impl SyncService {
    /// Starts the service task.
    ///
    /// The task exits on [`EngineHandle::shutdown`] or once every handle is dropped.
    #[must_use]
    pub fn spawn(
        deps: SyncDependencies,
        settings: SyncSettings,
        realtime: Option<mpsc::UnboundedReceiver<RealtimeEvent>>,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(InboxSnapshot::default());

        let reconciler = Reconciler::new(
            Arc::clone(&deps.backend),
            deps.self_id.clone(),
            settings.reconcile_min_interval,
        )
        .with_repair(settings.repair_stale_read_markers);

        let service = Self {
            engine: SyncEngine::new(deps.self_id.clone(), &settings),
            reconciler,
            reconcile_failures: 0,
            mark_read: MarkReadUseCase::new(Arc::clone(&deps.backend), deps.self_id),
            backend: deps.backend,
            conversation_cache: deps.conversation_cache,
            message_cache: deps.message_cache,
            listeners: ChatListeners::new(),
            settings,
            commands: command_rx,
            feedback: command_tx.downgrade(),
            snapshots: snapshot_tx,
        };

        let handle = EngineHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        let task = tokio::spawn(service.run(realtime));
        (handle, task)
    }

    async fn run(mut self, mut realtime: Option<mpsc::UnboundedReceiver<RealtimeEvent>>) {
        info!(user_id = %self.engine.self_id(), "Sync service started");

        self.spawn_hydration();
        self.start_reconcile(false);

        let mut expiry = interval(EXPIRY_TICK);
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let period = self.settings.reconcile_poll_interval;
        let mut poll = (!period.is_zero()).then(|| {
            let mut poll = interval_at(tokio::time::Instant::now() + period, period);
            poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
            poll
        });

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(EngineCommand::Shutdown) => break,
                    Some(command) => self.handle(command).await,
                },
                event = recv_or_pending(&mut realtime) => match event {
                    Some(event) => self.handle(EngineCommand::Realtime(event)).await,
                    None => {
                        warn!("Realtime feed closed");
                        realtime = None;
                    }
                },
                _ = expiry.tick() => {
                    self.engine.expire_at(Instant::now());
                }
                () = tick_or_pending(&mut poll) => {
                    self.start_reconcile(false);
                }
            }

            self.flush().await;
        }

        info!("Sync service stopped");
    }

    async fn handle(&mut self, command: EngineCommand) {
        let now = Instant::now();
        let effects = match command {
            EngineCommand::Realtime(event) => self.handle_realtime(event, now).await,
            EngineCommand::EnterConversation(id) => self.engine.enter_conversation_at(&id, now),
            EngineCommand::LeaveConversation => self.engine.leave_conversation_at(now),
            EngineCommand::ClearUnread(id) => {
                self.engine.clear_unread_at(&id, now);
                Vec::new()
            }
            EngineCommand::MarkRead(id) => self.engine.mark_conversation_read_at(&id, now),
            EngineCommand::UpdateLastMessage { id, text, sent_at } => {
                self.engine.update_last_message_at(&id, &text, sent_at, now);
                Vec::new()
            }
            EngineCommand::Reconcile { force } => vec![Effect::Reconcile { force }],
            EngineCommand::ApplyReconciliation(conversations) => {
                self.engine.apply_reconciliation_at(conversations, now);
                self.reconcile_failures = 0;
                self.publish();
                Vec::new()
            }
            EngineCommand::ReconcileFailed => {
                self.reconcile_failures = self.reconcile_failures.saturating_add(1);
                self.publish();
                Vec::new()
            }
            EngineCommand::ReactionsFetched {
                message_id,
                reactions,
            } => {
                let event = ChatEvent::ReactionsChanged {
                    message_id,
                    reactions,
                };
                self.listeners.dispatch(None, &event);
                Vec::new()
            }
            EngineCommand::ReadMarkerMoved { id, at } => {
                self.engine.record_read_marker_at(&id, at, now);
                Vec::new()
            }
            EngineCommand::Hydrate(conversations) => {
                self.engine.hydrate_at(conversations, now);
                Vec::new()
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(InboxSnapshot::of(&self.engine, self.reconcile_failures));
                Vec::new()
            }
            EngineCommand::SubscribeChat { id, reply } => {
                let _ = reply.send(self.listeners.subscribe(id));
                Vec::new()
            }
            EngineCommand::Shutdown => Vec::new(),
        };

        for effect in effects {
            self.run_effect(effect);
        }
    }

    async fn handle_realtime(&mut self, event: RealtimeEvent, now: Instant) -> Vec<Effect> {
        match &event {
            RealtimeEvent::Connected => info!("Realtime feed connected"),
            RealtimeEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Realtime feed disconnected");
            }
            RealtimeEvent::Reconnecting { attempt } => {
                debug!(attempt, "Realtime feed reconnecting");
            }
            RealtimeEvent::Error {
                message,
                recoverable,
            } => warn!(error = %message, recoverable, "Realtime feed error"),
            _ => {}
        }

        let mut resolved = None;
        if let Some(cache) = &self.message_cache {
            match &event {
                RealtimeEvent::MessageInsert(message) => {
                    if let Err(e) = cache.append(message).await {
                        warn!(error = %e, "Failed to cache message");
                    }
                }
                RealtimeEvent::MessageUpdate(message) => {
                    if let Err(e) = cache.update(message).await {
                        warn!(error = %e, "Failed to update cached message");
                    }
                }
                RealtimeEvent::ReadReceipt(receipt) => {
                    resolved = cache.conversation_of(&receipt.message_id).await;
                }
                _ => {}
            }
        }

        self.listeners.dispatch_realtime(&event);
        self.engine.apply_realtime_at(&event, resolved, now)
    }

    fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::Reconcile { force } => self.start_reconcile(force),
            Effect::MarkRead(id) => {
                let mark_read = self.mark_read.clone();
                let feedback = self.feedback.clone();
                tokio::spawn(async move {
                    if let Some(at) = mark_read.execute_best_effort(&id).await
                        && let Some(tx) = feedback.upgrade()
                    {
                        let _ = tx.send(EngineCommand::ReadMarkerMoved { id, at });
                    }
                });
            }
            Effect::AcknowledgeMessage(message_id) => {
                let mark_read = self.mark_read.clone();
                tokio::spawn(async move {
                    mark_read.acknowledge_best_effort(&message_id).await;
                });
            }
            Effect::FetchReactions(message_id) => {
                let backend = Arc::clone(&self.backend);
                let feedback = self.feedback.clone();
                tokio::spawn(async move {
                    match backend.fetch_reactions(&message_id).await {
                        Ok(reactions) => {
                            if let Some(tx) = feedback.upgrade() {
                                let _ = tx.send(EngineCommand::ReactionsFetched {
                                    message_id,
                                    reactions,
                                });
                            }
                        }
                        Err(e) => {
                            warn!(message_id = %message_id, error = %e, "Failed to fetch reactions");
                        }
                    }
                });
            }
        }
    }

    fn start_reconcile(&self, force: bool) {
        let guard = match self.reconciler.try_begin(force) {
            Ok(guard) => guard,
            Err(reason) => {
                debug!(%reason, force, "Reconciliation skipped");
                return;
            }
        };

        let excluded = self.engine.exclusions_at(Instant::now());
        let reconciler = self.reconciler.clone();
        let feedback = self.feedback.clone();
        tokio::spawn(async move {
            let _guard = guard;
            match reconciler.fetch(&excluded).await {
                Ok(conversations) => {
                    if let Some(tx) = feedback.upgrade() {
                        let _ = tx.send(EngineCommand::ApplyReconciliation(conversations));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Reconciliation failed, keeping current list");
                    if let Some(tx) = feedback.upgrade() {
                        let _ = tx.send(EngineCommand::ReconcileFailed);
                    }
                }
            }
        });
    }

    fn spawn_hydration(&self) {
        let cache = Arc::clone(&self.conversation_cache);
        let feedback = self.feedback.clone();
        tokio::spawn(async move {
            match cache.load().await {
                Ok(conversations) if conversations.is_empty() => {
                    debug!("Conversation cache is empty");
                }
                Ok(conversations) => {
                    if let Some(tx) = feedback.upgrade() {
                        let _ = tx.send(EngineCommand::Hydrate(conversations));
                    }
                }
                Err(e) => warn!(error = %e, "Failed to load conversation cache"),
            }
        });
    }

    /// Persists and publishes the store if the last step changed it.
    async fn flush(&mut self) {
        if !self.engine.take_dirty() {
            return;
        }

        if let Err(e) = self.conversation_cache.save(self.engine.conversations()).await {
            warn!(error = %e, "Failed to persist conversations");
        }
        self.publish();
    }

    fn publish(&self) {
        let next = InboxSnapshot::of(&self.engine, self.reconcile_failures);
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick_or_pending(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use test_case::test_case;
    use tokio::time::timeout;

    use super::*;
    use crate::domain::entities::{ConversationRow, Message, UserProfile};
    use crate::domain::ports::mocks::{FakeBackend, MockConversationCachePort};

    const WAIT: Duration = Duration::from_secs(5);

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn row(id: &str, last_at: i64) -> ConversationRow {
        ConversationRow {
            id: id.into(),
            last_message_text: Some("earlier".to_string()),
            last_message_at: Some(ts(last_at)),
            last_message_sender_id: Some("other".into()),
            updated_at: Some(ts(last_at)),
        }
    }

    fn backend_with_two_unread() -> FakeBackend {
        let backend = FakeBackend::new();
        backend.add_conversation(
            row("c", 10),
            Some(ts(1)),
            UserProfile::new("other", "Other"),
            None,
        );
        backend.add_message(Message::text("m1", "c", "other", "one", ts(5)));
        backend.add_message(Message::text("m2", "c", "other", "earlier", ts(10)));
        backend
    }

    fn cache(cached: Vec<Conversation>) -> Arc<MockConversationCachePort> {
        let mut cache = MockConversationCachePort::new();
        cache.expect_load().returning(move || Ok(cached.clone()));
        cache.expect_save().returning(|_| Ok(()));
        Arc::new(cache)
    }

    fn spawn(
        backend: &FakeBackend,
        cached: Vec<Conversation>,
    ) -> (EngineHandle, JoinHandle<()>) {
        SyncService::spawn(
            SyncDependencies {
                self_id: "me".into(),
                backend: Arc::new(backend.clone()),
                conversation_cache: cache(cached),
                message_cache: None,
            },
            SyncSettings::default(),
            None,
        )
    }

    async fn wait_for(
        handle: &EngineHandle,
        pred: impl FnMut(&InboxSnapshot) -> bool,
    ) -> InboxSnapshot {
        let mut rx = handle.watch();
        timeout(WAIT, rx.wait_for(pred))
            .await
            .expect("timed out waiting for snapshot")
            .expect("engine stopped")
            .clone()
    }

    #[test_case(0, None ; "zero hides badge")]
    #[test_case(7, Some("7") ; "exact count")]
    #[test_case(99, Some("99") ; "at cap")]
    #[test_case(100, Some("99+") ; "above cap")]
    fn test_badge_label(total: u32, expected: Option<&str>) {
        assert_eq!(badge_label(total).as_deref(), expected);
    }

    #[tokio::test]
    async fn test_initial_reconciliation_publishes_counts() {
        let backend = backend_with_two_unread();
        let (handle, _task) = spawn(&backend, Vec::new());

        let snapshot = wait_for(&handle, |s| s.reconciled).await;

        assert_eq!(snapshot.total_unread, 2);
        assert_eq!(snapshot.badge_label().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_increment_survives_stale_reconciliation_in_flight() {
        let backend = backend_with_two_unread();
        let gate = backend.hold_counts();
        let mut cached = Conversation::new("c", UserProfile::new("other", "Other"));
        cached.unread_count = 2;
        cached.last_message_at = Some(ts(10));
        let (handle, _task) = spawn(&backend, vec![cached]);

        wait_for(&handle, |s| s.total_unread == 2).await;
        handle
            .ingest(RealtimeEvent::MessageInsert(Message::text(
                "m3",
                "c",
                "other",
                "third",
                ts(20),
            )))
            .unwrap();
        wait_for(&handle, |s| s.total_unread == 3).await;

        gate.add_permits(16);
        let snapshot = wait_for(&handle, |s| s.reconciled).await;

        assert_eq!(snapshot.total_unread, 3);
        assert_eq!(
            snapshot.conversations[0].last_message_text.as_deref(),
            Some("third")
        );
    }

    #[tokio::test]
    async fn test_open_conversation_clears_even_if_mutation_fails() {
        let backend = backend_with_two_unread();
        backend.set_fail_mutation(true);
        let (handle, _task) = spawn(&backend, Vec::new());
        wait_for(&handle, |s| s.reconciled && s.total_unread == 2).await;

        handle.enter_conversation("c".into()).unwrap();
        let snapshot = wait_for(&handle, |s| s.total_unread == 0).await;
        assert_eq!(snapshot.active, Some(ConversationId::from("c")));

        backend.add_conversation(
            row("d", 12),
            Some(ts(1)),
            UserProfile::new("other2", "Other Two"),
            None,
        );
        backend.add_message(Message::text("m3", "d", "other2", "new", ts(12)));
        handle.reconcile(true).unwrap();

        let snapshot = wait_for(&handle, |s| {
            s.conversations.iter().any(|c| c.id.as_str() == "d")
        })
        .await;
        let c = snapshot
            .conversations
            .iter()
            .find(|c| c.id.as_str() == "c")
            .unwrap();
        assert_eq!(c.unread_count, 0);
        assert_eq!(snapshot.total_unread, 1);
        assert!(backend.read_updates().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reconciliation_keeps_hydrated_list() {
        let backend = backend_with_two_unread();
        backend.set_fail_fetch(true);
        let mut cached = Conversation::new("c", UserProfile::new("other", "Other"));
        cached.unread_count = 4;
        let (handle, _task) = spawn(&backend, vec![cached]);

        let snapshot = wait_for(&handle, |s| {
            !s.conversations.is_empty() && s.reconcile_failures >= 1
        })
        .await;
        assert_eq!(snapshot.total_unread, 4);

        let failures = snapshot.reconcile_failures;
        handle.reconcile(true).unwrap();
        let snapshot = wait_for(&handle, |s| s.reconcile_failures > failures).await;
        assert_eq!(snapshot.total_unread, 4);
        assert!(!snapshot.reconciled);

        backend.set_fail_fetch(false);
        handle.reconcile(true).unwrap();
        let snapshot = wait_for(&handle, |s| s.reconciled && s.reconcile_failures == 0).await;
        assert_eq!(snapshot.total_unread, 2);
    }

    #[tokio::test]
    async fn test_chat_subscriber_receives_messages() {
        let backend = backend_with_two_unread();
        let (handle, _task) = spawn(&backend, Vec::new());
        wait_for(&handle, |s| s.reconciled).await;

        let mut chat = handle.subscribe_to_chat("c".into()).await.unwrap();
        handle
            .ingest(RealtimeEvent::MessageInsert(Message::text(
                "m3",
                "c",
                "other",
                "hello",
                ts(20),
            )))
            .unwrap();

        let event = timeout(WAIT, chat.recv()).await.unwrap().unwrap();
        assert!(matches!(event, ChatEvent::MessageInserted(m) if m.id.as_str() == "m3"));
    }

    #[tokio::test]
    async fn test_reaction_change_reaches_every_chat() {
        let backend = backend_with_two_unread();
        backend.add_reaction(Reaction {
            message_id: "m2".into(),
            user_id: "other".into(),
            emoji: "👍".to_string(),
            created_at: None,
        });
        let (handle, _task) = spawn(&backend, Vec::new());
        wait_for(&handle, |s| s.reconciled).await;

        let mut here = handle.subscribe_to_chat("c".into()).await.unwrap();
        let mut elsewhere = handle.subscribe_to_chat("z".into()).await.unwrap();
        handle
            .ingest(RealtimeEvent::ReactionChange {
                message_id: "m2".into(),
            })
            .unwrap();

        for chat in [&mut here, &mut elsewhere] {
            match timeout(WAIT, chat.recv()).await.unwrap().unwrap() {
                ChatEvent::ReactionsChanged {
                    message_id,
                    reactions,
                } => {
                    assert_eq!(message_id.as_str(), "m2");
                    assert_eq!(reactions.len(), 1);
                    assert_eq!(reactions[0].emoji, "👍");
                }
                other => panic!("unexpected chat event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_message_in_open_chat_is_recorded_as_read() {
        let backend = backend_with_two_unread();
        let (handle, _task) = spawn(&backend, Vec::new());
        wait_for(&handle, |s| s.reconciled).await;

        handle.enter_conversation("c".into()).unwrap();
        handle
            .ingest(RealtimeEvent::MessageInsert(Message::text(
                "m3",
                "c",
                "other",
                "hello",
                ts(20),
            )))
            .unwrap();

        timeout(WAIT, async {
            while backend.message_reads().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("message read was never recorded");
        assert_eq!(
            backend.message_reads(),
            vec![(MessageId::from("m3"), UserId::from("me"))]
        );
        assert_eq!(handle.snapshot().await.unwrap().total_unread, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let backend = backend_with_two_unread();
        let (handle, task) = spawn(&backend, Vec::new());

        handle.shutdown().unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(
            handle.snapshot().await,
            Err(SyncError::EngineStopped)
        ));
    }
}
