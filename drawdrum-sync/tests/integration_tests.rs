use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use drawdrum_sync::{
    AdminCommand, EventChannel, FormattingInput, MemoryStateStore, QueueChannel, SqliteStateStore,
    StateStore, SyncCoordinator, SyncError, SyncEvent, TextUpdate, TimerActionKind, TimerPhase,
};
use drawdrum_sync::DisplayState;
use tempfile::tempdir;
use tokio::sync::mpsc::UnboundedReceiver;

fn memory_coordinator() -> SyncCoordinator {
    SyncCoordinator::new(Arc::new(MemoryStateStore::new()), 300)
}

async fn join(coordinator: &SyncCoordinator) -> UnboundedReceiver<SyncEvent> {
    let (channel, mut rx) = QueueChannel::open();
    coordinator.subscribe(Arc::new(channel)).await.unwrap();
    // Skip the init snapshot
    assert_eq!(rx.recv().await.unwrap().kind(), "init");
    rx
}

fn drain(rx: &mut UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Channel that fails every send and counts attempts
struct FlakyChannel {
    attempts: AtomicUsize,
}

impl EventChannel for FlakyChannel {
    fn send(&self, _event: &SyncEvent) -> drawdrum_sync::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SyncError::ChannelClosed)
    }
}

/// Store whose writes always fail
struct ReadOnlyStore;

impl StateStore for ReadOnlyStore {
    fn load(&self) -> DisplayState {
        DisplayState::default()
    }

    fn save(&self, _state: &DisplayState) -> drawdrum_sync::Result<()> {
        Err(SyncError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }
}

#[tokio::test]
async fn test_subscribe_sees_latest_text() {
    let coordinator = memory_coordinator();

    for n in 1..=5 {
        let text = format!("Round {}", n);
        coordinator.set_text(TextUpdate::new(text.clone())).await;

        let (channel, _rx) = QueueChannel::open();
        let (id, snapshot) = coordinator.subscribe(Arc::new(channel)).await.unwrap();
        assert_eq!(snapshot.passport_text, text);
        coordinator.unsubscribe(id).await;
    }
}

#[tokio::test]
async fn test_concurrent_writers_never_leave_stale_snapshot() {
    let coordinator = Arc::new(memory_coordinator());

    let mut tasks = Vec::new();
    for n in 0..20 {
        let coordinator = Arc::clone(&coordinator);
        tasks.push(tokio::spawn(async move {
            coordinator.set_text(TextUpdate::new(format!("text {}", n))).await;
            coordinator.snapshot().await
        }));
    }

    for task in tasks {
        let snapshot = task.await.unwrap();
        assert!(snapshot.passport_text.starts_with("text "));
    }

    // Final snapshot matches the last passport_update every display saw
    let mut rx = join(&coordinator).await;
    coordinator.set_text(TextUpdate::new("final")).await;
    let events = drain(&mut rx);
    assert_eq!(coordinator.snapshot().await.passport_text, "final");
    assert!(matches!(&events[0], SyncEvent::PassportUpdate(p) if p.passport_text == "final"));
}

#[tokio::test]
async fn test_broadcast_survives_one_failing_channel() {
    let coordinator = memory_coordinator();

    let mut receivers = Vec::new();
    for _ in 0..4 {
        receivers.push(join(&coordinator).await);
    }

    // FlakyChannel rejects the init send, so register it straight away
    let flaky = Arc::new(FlakyChannel {
        attempts: AtomicUsize::new(0),
    });
    let result = coordinator.subscribe(flaky.clone()).await;
    assert!(matches!(result, Err(SyncError::ChannelClosed)));
    assert_eq!(coordinator.client_count().await, 4);

    coordinator.set_logo("/uploads/logo_1.png").await;

    for rx in receivers.iter_mut() {
        let events = drain(rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "logo_update");
    }
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disconnected_display_is_dropped_on_next_broadcast() {
    let coordinator = memory_coordinator();
    let mut staying = join(&coordinator).await;
    let leaving = join(&coordinator).await;
    assert_eq!(coordinator.client_count().await, 2);

    drop(leaving);
    coordinator.set_logo("").await;

    assert_eq!(coordinator.client_count().await, 1);
    assert_eq!(drain(&mut staying).len(), 1);
}

#[tokio::test]
async fn test_unsubscribe_twice_is_noop() {
    let coordinator = memory_coordinator();
    let (channel, _rx) = QueueChannel::open();
    let (id, _) = coordinator.subscribe(Arc::new(channel)).await.unwrap();

    assert!(coordinator.unsubscribe(id).await);
    assert!(!coordinator.unsubscribe(id).await);
}

#[tokio::test]
async fn test_reset_from_any_state() {
    let coordinator = memory_coordinator();

    coordinator.timer_reset(60, 48).await;
    let snap = coordinator.snapshot().await.timer;
    assert_eq!((snap.running, snap.remaining), (false, 60));

    coordinator.timer_start(60, 48).await;
    coordinator.timer_reset(45, 48).await;
    let snap = coordinator.snapshot().await.timer;
    assert_eq!((snap.running, snap.remaining, snap.phase), (false, 45, TimerPhase::Idle));

    coordinator.timer_start(60, 48).await;
    coordinator.timer_pause(Some(20)).await.unwrap();
    coordinator.timer_reset(30, 48).await;
    let snap = coordinator.snapshot().await.timer;
    assert_eq!((snap.running, snap.remaining), (false, 30));
}

#[tokio::test]
async fn test_pause_resume_keeps_remaining() {
    let coordinator = memory_coordinator();
    let mut rx = join(&coordinator).await;

    coordinator.timer_start(300, 48).await;
    coordinator.timer_pause(Some(137)).await.unwrap();
    let resumed = coordinator.timer_resume(Some(137)).await.unwrap();

    assert_eq!(resumed.remaining, 137);
    let snap = coordinator.snapshot().await.timer;
    assert!(snap.running);
    assert_eq!(snap.remaining, 137);

    let actions: Vec<TimerActionKind> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::TimerAction(action) => Some(action.action),
            _ => None,
        })
        .collect();
    assert_eq!(
        actions,
        vec![TimerActionKind::Start, TimerActionKind::Pause, TimerActionKind::Resume]
    );
}

#[tokio::test]
async fn test_cleared_logo_matches_never_set_logo() {
    let never_set = memory_coordinator();
    let cleared = memory_coordinator();
    cleared.set_logo("/uploads/logo_2.png").await;
    cleared.set_logo("").await;

    let (channel, _rx) = QueueChannel::open();
    let (_, snapshot) = cleared.subscribe(Arc::new(channel)).await.unwrap();

    assert_eq!(snapshot.logo_path, "");
    assert_eq!(snapshot.logo_path, never_set.snapshot().await.logo_path);
}

#[tokio::test]
async fn test_set_text_broadcasts_update_then_timer_start() {
    let coordinator = memory_coordinator();
    coordinator.timer_reset(180, 48).await;

    let mut displays = vec![join(&coordinator).await, join(&coordinator).await];

    let update = TextUpdate::new("Hello\n**World**").with_formatting(FormattingInput {
        color: Some("#FF0000".to_string()),
        ..Default::default()
    });
    coordinator.set_text(update).await;

    for rx in displays.iter_mut() {
        let events = drain(rx);
        assert_eq!(events.len(), 2);

        match &events[0] {
            SyncEvent::PassportUpdate(payload) => {
                assert_eq!(payload.passport_text, "Hello\n**World**");
                assert_eq!(payload.formatting.color, "#FF0000");
            }
            other => panic!("expected passport_update, got {:?}", other),
        }

        match &events[1] {
            SyncEvent::TimerAction(action) => {
                assert_eq!(action.action, TimerActionKind::Start);
                assert_eq!(action.duration, 180);
                assert_eq!(action.remaining, action.duration);
            }
            other => panic!("expected timer_action, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_set_text_replaces_formatting_wholesale() {
    let coordinator = memory_coordinator();

    coordinator
        .set_text(TextUpdate::new("first").with_formatting(FormattingInput {
            color: Some("#00FF00".to_string()),
            columns: Some(3),
            ..Default::default()
        }))
        .await;
    coordinator
        .set_text(TextUpdate::new("second").with_formatting(FormattingInput {
            columns: Some(2),
            ..Default::default()
        }))
        .await;

    let formatting = coordinator.snapshot().await.formatting;
    assert_eq!(formatting.color, "#FFFFFF");
    assert_eq!(formatting.columns, 2);
}

#[tokio::test]
async fn test_snapshot_reports_checkpoint_not_extrapolation() {
    let coordinator = memory_coordinator();
    coordinator.timer_start(300, 48).await;
    coordinator.timer_pause(Some(42)).await.unwrap();
    coordinator.timer_resume(Some(42)).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let (channel, _rx) = QueueChannel::open();
    let (_, snapshot) = coordinator.subscribe(Arc::new(channel)).await.unwrap();
    assert!(snapshot.timer.running);
    assert_eq!(snapshot.timer.remaining, 42);
}

#[tokio::test]
async fn test_admin_commands_dispatch() {
    let coordinator = memory_coordinator();
    let mut rx = join(&coordinator).await;

    for raw in [
        r#"{"type":"passport_update","text":"Draw #1","prize":"Bike"}"#,
        r#"{"type":"logo_update","logoPath":"/uploads/logo_3.png"}"#,
        r#"{"type":"timer_action","action":"pause","remaining":12}"#,
    ] {
        let command = AdminCommand::from_json(raw).unwrap();
        coordinator.handle_command(command).await.unwrap();
    }

    let kinds: Vec<&str> = drain(&mut rx).iter().map(SyncEvent::kind).collect();
    assert_eq!(
        kinds,
        vec!["passport_update", "timer_action", "logo_update", "timer_action"]
    );

    let snapshot = coordinator.snapshot().await;
    assert_eq!(snapshot.prize_text, "Bike");
    assert_eq!(snapshot.logo_path, "/uploads/logo_3.png");
    assert_eq!(snapshot.timer.phase, TimerPhase::Paused);
    assert_eq!(snapshot.timer.remaining, 12);
}

#[tokio::test]
async fn test_storage_failure_keeps_memory_state() {
    let coordinator = SyncCoordinator::new(Arc::new(ReadOnlyStore), 300);
    let mut rx = join(&coordinator).await;

    coordinator.set_text(TextUpdate::new("still shown")).await;

    assert_eq!(coordinator.snapshot().await.passport_text, "still shown");
    assert_eq!(drain(&mut rx).len(), 2);
}

#[tokio::test]
async fn test_state_restored_after_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("drawdrum.db");

    {
        let store = SqliteStateStore::new(&db_path).unwrap();
        let coordinator = SyncCoordinator::new(Arc::new(store), 300);
        coordinator
            .set_text(TextUpdate::new("Winner: 42").with_prize("Trip"))
            .await;
        coordinator.set_logo("/uploads/logo_4.png").await;
        coordinator.timer_pause(Some(10)).await.unwrap();
    }

    let store = SqliteStateStore::new(&db_path).unwrap();
    let coordinator = SyncCoordinator::new(Arc::new(store), 300);
    let snapshot = coordinator.snapshot().await;

    assert_eq!(snapshot.passport_text, "Winner: 42");
    assert_eq!(snapshot.prize_text, "Trip");
    assert_eq!(snapshot.logo_path, "/uploads/logo_4.png");
    // Timer is ephemeral
    assert_eq!(snapshot.timer.phase, TimerPhase::Idle);
    assert_eq!(snapshot.timer.remaining, 300);
}
