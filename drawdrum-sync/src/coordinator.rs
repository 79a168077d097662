use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::events::{
    AdminCommand, InitPayload, LogoPayload, PassportPayload, SyncEvent, TextUpdate,
};
use crate::registry::{ChannelId, ConnectionRegistry, EventChannel};
use crate::state::{DisplayState, DEFAULT_TIMER_SIZE};
use crate::store::StateStore;
use crate::timer::{TimerAction, TimerActionKind, TimerCommand, TimerEngine};

/// Mutable application context: the one display state and timer checkpoint.
///
/// Owned by the coordinator; nothing else holds a reference to it.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub display: DisplayState,
    pub timer: TimerEngine,
}

impl AppContext {
    pub fn snapshot(&self) -> InitPayload {
        InitPayload::new(&self.display, self.timer.snapshot())
    }
}

/// Applies admin mutations and fans the results out to every subscriber.
///
/// All operations hold one lock across read-modify-persist-broadcast, so
/// mutations never interleave and a subscriber's snapshot is never older than
/// the last completed mutation.
pub struct SyncCoordinator {
    store: Arc<dyn StateStore>,
    registry: ConnectionRegistry,
    context: Mutex<AppContext>,
}

impl SyncCoordinator {
    /// Load persisted state from `store`; the timer starts idle at
    /// `default_timer_duration` seconds
    pub fn new(store: Arc<dyn StateStore>, default_timer_duration: u32) -> Self {
        Self::with_timer_defaults(store, default_timer_duration, DEFAULT_TIMER_SIZE)
    }

    /// Like [`SyncCoordinator::new`], with the timer size used until an admin
    /// has saved formatting of their own
    pub fn with_timer_defaults(
        store: Arc<dyn StateStore>,
        default_timer_duration: u32,
        default_timer_size: u32,
    ) -> Self {
        let mut state = store.load();
        if state.updated_at.is_none() && default_timer_size > 0 {
            state.formatting.timer_size_px = default_timer_size;
        }
        let timer = TimerEngine::new(default_timer_duration, state.formatting.timer_size_px);

        let logo = if state.has_logo() {
            state.logo_path.clone()
        } else {
            "none".to_string()
        };
        let updated_at = state.updated_at;
        tracing::info!(
            "Display state loaded (logo: {}, updated: {:?}), timer idle at {}s",
            logo,
            updated_at,
            default_timer_duration
        );

        Self {
            store,
            registry: ConnectionRegistry::new(),
            context: Mutex::new(AppContext {
                display: state,
                timer,
            }),
        }
    }

    /// Replace text, prize and formatting wholesale, then auto-start the timer
    pub async fn set_text(&self, update: TextUpdate) -> PassportPayload {
        let mut ctx = self.context.lock().await;

        let formatting = update.formatting.unwrap_or_default().resolve();
        ctx.display.text = update.text;
        ctx.display.prize_text = update.prize;
        ctx.display.formatting = formatting;
        ctx.display.updated_at = Some(Utc::now());
        self.persist(&ctx.display).await;

        let payload = PassportPayload::from(&ctx.display);
        self.registry
            .broadcast(&SyncEvent::PassportUpdate(payload.clone()))
            .await;

        let duration = ctx.timer.duration();
        let timer_size = ctx.display.formatting.timer_size_px;
        let action = ctx.timer.start(duration, timer_size);
        self.registry.broadcast(&SyncEvent::TimerAction(action)).await;

        tracing::info!(
            "Passport text updated ({} chars), timer started at {}s",
            payload.passport_text.chars().count(),
            duration
        );
        payload
    }

    /// Replace the logo reference; an empty path removes the logo.
    ///
    /// Returns the previous path so the caller can clean up the old file.
    pub async fn set_logo(&self, path: impl Into<String>) -> String {
        let mut ctx = self.context.lock().await;

        let path = path.into();
        let previous = std::mem::replace(&mut ctx.display.logo_path, path.clone());
        ctx.display.updated_at = Some(Utc::now());
        self.persist(&ctx.display).await;

        self.registry
            .broadcast(&SyncEvent::LogoUpdate(LogoPayload { logo_path: path.clone() }))
            .await;

        if path.is_empty() {
            tracing::info!("Logo removed");
        } else {
            tracing::info!("Logo set to {}", path);
        }
        previous
    }

    /// Hand `channel` the current state, then register it for broadcasts.
    ///
    /// The `init` event is queued on the channel before registration, so it
    /// always arrives ahead of any later update.
    pub async fn subscribe(
        &self,
        channel: Arc<dyn EventChannel>,
    ) -> Result<(ChannelId, InitPayload)> {
        let ctx = self.context.lock().await;

        let snapshot = ctx.snapshot();
        channel.send(&SyncEvent::Init(snapshot.clone()))?;
        let id = self.registry.register(channel).await;

        Ok((id, snapshot))
    }

    pub async fn unsubscribe(&self, id: ChannelId) -> bool {
        self.registry.unregister(id).await
    }

    /// Current display state and timer checkpoint
    pub async fn snapshot(&self) -> InitPayload {
        self.context.lock().await.snapshot()
    }

    pub async fn client_count(&self) -> usize {
        self.registry.len().await
    }

    pub async fn timer_start(&self, duration: u32, timer_size: u32) -> TimerAction {
        let mut ctx = self.context.lock().await;
        let action = ctx.timer.start(duration, timer_size);
        self.announce(action).await
    }

    pub async fn timer_pause(&self, remaining: Option<u32>) -> Result<TimerAction> {
        let mut ctx = self.context.lock().await;
        let action = ctx.timer.pause(remaining)?;
        Ok(self.announce(action).await)
    }

    pub async fn timer_resume(&self, remaining: Option<u32>) -> Result<TimerAction> {
        let mut ctx = self.context.lock().await;
        let action = ctx.timer.resume(remaining)?;
        Ok(self.announce(action).await)
    }

    pub async fn timer_reset(&self, duration: u32, timer_size: u32) -> TimerAction {
        let mut ctx = self.context.lock().await;
        let action = ctx.timer.reset(duration, timer_size);
        self.announce(action).await
    }

    /// Apply an admin timer request, filling missing values from the
    /// current configuration
    pub async fn apply_timer(&self, command: TimerCommand) -> Result<TimerAction> {
        let mut ctx = self.context.lock().await;

        let duration = command.duration.unwrap_or_else(|| ctx.timer.duration());
        let timer_size = command
            .timer_size
            .filter(|size| *size > 0)
            .unwrap_or_else(|| ctx.timer.timer_size());

        let action = match command.action {
            TimerActionKind::Start => ctx.timer.start(duration, timer_size),
            TimerActionKind::Pause => ctx.timer.pause(command.remaining)?,
            TimerActionKind::Resume => ctx.timer.resume(command.remaining)?,
            TimerActionKind::Reset => ctx.timer.reset(duration, timer_size),
        };

        Ok(self.announce(action).await)
    }

    /// Dispatch a message received from an admin connection
    pub async fn handle_command(&self, command: AdminCommand) -> Result<()> {
        match command {
            AdminCommand::PassportUpdate(update) => {
                self.set_text(update).await;
            }
            AdminCommand::LogoUpdate(update) => {
                self.set_logo(update.logo_path).await;
            }
            AdminCommand::TimerAction(command) => {
                self.apply_timer(command).await?;
            }
        }
        Ok(())
    }

    async fn announce(&self, action: TimerAction) -> TimerAction {
        tracing::info!(
            "Timer {}: {}s of {}s",
            action.action,
            action.remaining,
            action.duration
        );
        self.registry
            .broadcast(&SyncEvent::TimerAction(action.clone()))
            .await;
        action
    }

    /// Best-effort durability; the in-memory state stays authoritative.
    ///
    /// The write runs on the blocking pool and is awaited while the caller
    /// still holds the context lock, so saves land in mutation order.
    async fn persist(&self, state: &DisplayState) {
        let store = Arc::clone(&self.store);
        let state = state.clone();

        match tokio::task::spawn_blocking(move || store.save(&state)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Failed to persist display state: {}", e),
            Err(e) => tracing::error!("Display state write did not complete: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::QueueChannel;
    use crate::store::MemoryStateStore;

    fn coordinator() -> SyncCoordinator {
        SyncCoordinator::new(Arc::new(MemoryStateStore::new()), 300)
    }

    #[tokio::test]
    async fn test_fresh_coordinator_snapshot_is_default() {
        let coordinator = coordinator();
        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.passport_text, "");
        assert_eq!(snapshot.logo_path, "");
        assert_eq!(snapshot.timer.remaining, 300);
        assert!(!snapshot.timer.running);
    }

    #[tokio::test]
    async fn test_state_loaded_from_store() {
        let store = Arc::new(MemoryStateStore::with_state(DisplayState {
            text: "Persisted".to_string(),
            ..Default::default()
        }));
        let coordinator = SyncCoordinator::new(store, 120);
        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.passport_text, "Persisted");
        assert_eq!(snapshot.timer.duration, 120);
    }

    #[tokio::test]
    async fn test_timer_size_default_only_for_fresh_state() {
        let fresh = SyncCoordinator::with_timer_defaults(Arc::new(MemoryStateStore::new()), 60, 96);
        let snapshot = fresh.snapshot().await;
        assert_eq!(snapshot.timer.timer_size, 96);
        assert_eq!(snapshot.formatting.timer_size_px, 96);

        let saved = DisplayState {
            updated_at: Some(Utc::now()),
            ..Default::default()
        };
        let restored = SyncCoordinator::with_timer_defaults(
            Arc::new(MemoryStateStore::with_state(saved)),
            60,
            96,
        );
        assert_eq!(restored.snapshot().await.timer.timer_size, DEFAULT_TIMER_SIZE);
    }

    #[tokio::test]
    async fn test_restored_logo_is_kept() {
        let store = Arc::new(MemoryStateStore::with_state(DisplayState {
            logo_path: "/uploads/saved.png".to_string(),
            updated_at: Some(Utc::now()),
            ..Default::default()
        }));
        let coordinator = SyncCoordinator::new(store, 300);
        assert_eq!(coordinator.snapshot().await.logo_path, "/uploads/saved.png");
    }

    /// Records every saved state, in order
    #[derive(Default)]
    struct RecordingStore {
        saved: std::sync::Mutex<Vec<DisplayState>>,
    }

    impl StateStore for RecordingStore {
        fn load(&self) -> DisplayState {
            DisplayState::default()
        }

        fn save(&self, state: &DisplayState) -> Result<()> {
            self.saved.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_saves_complete_in_mutation_order() {
        let store = Arc::new(RecordingStore::default());
        let coordinator = SyncCoordinator::new(store.clone(), 300);

        coordinator.set_text(TextUpdate::new("first")).await;
        coordinator.set_logo("/uploads/a.png").await;
        coordinator.set_text(TextUpdate::new("second")).await;

        let saved = store.saved.lock().unwrap();
        let texts: Vec<&str> = saved.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "first", "second"]);
        assert_eq!(saved[1].logo_path, "/uploads/a.png");
    }

    #[tokio::test]
    async fn test_subscribe_queues_init_first() {
        let coordinator = coordinator();
        let (channel, mut rx) = QueueChannel::open();

        let (_, init) = coordinator.subscribe(Arc::new(channel)).await.unwrap();
        coordinator.set_logo("/uploads/logo.png").await;

        assert_eq!(rx.recv().await.unwrap(), SyncEvent::Init(init));
        assert_eq!(rx.recv().await.unwrap().kind(), "logo_update");
    }

    #[tokio::test]
    async fn test_set_logo_returns_previous() {
        let coordinator = coordinator();
        assert_eq!(coordinator.set_logo("/uploads/a.png").await, "");
        assert_eq!(coordinator.set_logo("").await, "/uploads/a.png");
    }

    #[tokio::test]
    async fn test_apply_timer_defaults_to_configured_duration() {
        let coordinator = coordinator();
        coordinator.timer_reset(90, 48).await;

        let action = coordinator
            .apply_timer(TimerCommand::new(TimerActionKind::Start))
            .await
            .unwrap();
        assert_eq!(action.duration, 90);
        assert_eq!(action.remaining, 90);
    }

    #[tokio::test]
    async fn test_rejected_transition_is_not_broadcast() {
        let coordinator = coordinator();
        let (channel, mut rx) = QueueChannel::open();
        coordinator.subscribe(Arc::new(channel)).await.unwrap();
        let _init = rx.recv().await.unwrap();

        assert!(coordinator.timer_pause(None).await.is_err());
        assert!(rx.try_recv().is_err());
    }
}
