// Connection manager: sessions, status events, send retries, reconnect backoff

mod common;

use common::{ConnectStep, MockConnector, StatusRecorder, manager, server_config};
use rconwatch::error::ConnectionError;
use rconwatch::models::ConnectionStatus;
use std::time::Duration;

#[tokio::test]
async fn test_connect_then_list_returns_sanitized_text() {
    let connector = MockConnector::new();
    connector.respond(
        "list",
        "§6There are §c2§6 of a max of §c20§6 players online:\u{1b}[0m Alex, Steve\r\n",
    );
    let manager = manager(vec![server_config("s1")], &connector);

    manager.connect("s1").await.unwrap();
    assert_eq!(manager.status("s1"), ConnectionStatus::Connected);

    let result = manager.send("s1", "list").await;
    assert!(result.success);
    assert!(result.normalized_text.contains("2 of a max of 20"));
    assert!(!result.normalized_text.contains('§'));
    assert!(!result.normalized_text.contains('\u{1b}'));
    assert_eq!(
        result.normalized_text,
        "There are 2 of a max of 20 players online: Alex, Steve"
    );
}

#[tokio::test]
async fn test_empty_response_becomes_placeholder() {
    let connector = MockConnector::new();
    connector.respond("save-all", "   \n");
    let manager = manager(vec![server_config("s1")], &connector);
    manager.connect("s1").await.unwrap();

    let result = manager.send("s1", "save-all").await;
    assert!(result.success);
    assert_eq!(result.normalized_text, rconwatch::sanitize::EMPTY_PLACEHOLDER);
}

#[tokio::test]
async fn test_unknown_server() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);

    let err = manager.connect("nope").await.unwrap_err();
    assert!(matches!(err, ConnectionError::UnknownServer(_)));

    let result = manager.send("nope", "list").await;
    assert!(!result.success);
    assert!(!result.normalized_text.is_empty());
    assert_eq!(connector.connect_attempts(), 0);
}

#[tokio::test]
async fn test_send_before_connect_fails_without_io() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);

    let result = manager.send("s1", "list").await;
    assert!(!result.success);
    assert!(connector.sent().is_empty());
    assert_eq!(manager.status("s1"), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);
    let recorder = StatusRecorder::attach(&manager);

    manager.connect("s1").await.unwrap();
    manager.connect("s1").await.unwrap();

    assert_eq!(connector.connect_attempts(), 1);
    assert_eq!(
        recorder.statuses(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
}

#[tokio::test]
async fn test_invalid_config_rejected_before_io() {
    let connector = MockConnector::new();
    let mut config = server_config("s1");
    config.password = String::new();
    let manager = manager(vec![config], &connector);
    let recorder = StatusRecorder::attach(&manager);

    let err = manager.connect("s1").await.unwrap_err();
    assert!(matches!(err, ConnectionError::InvalidConfig(_)));
    assert_eq!(connector.connect_attempts(), 0);
    assert_eq!(recorder.statuses(), vec![ConnectionStatus::Error]);
    assert!(recorder.last().unwrap().reason.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_host_times_out_with_error_status() {
    let connector = MockConnector::new();
    connector.plan_connects([ConnectStep::Hang]);
    let manager = manager(vec![server_config("s1")], &connector);
    let recorder = StatusRecorder::attach(&manager);

    let started = tokio::time::Instant::now();
    let err = manager.connect("s1").await.unwrap_err();
    assert!(matches!(err, ConnectionError::Timeout(_)));
    assert!(started.elapsed() >= Duration::from_millis(5_000));

    assert_eq!(
        recorder.statuses(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Error]
    );
    let reason = recorder.last().unwrap().reason.unwrap();
    assert!(reason.contains("timed out"), "reason: {reason}");
    assert!(manager.connected_servers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_authentication_failure_is_terminal() {
    let connector = MockConnector::new();
    connector.plan_connects([ConnectStep::RejectAuth]);
    let manager = manager(vec![server_config("s1")], &connector);

    let err = manager.connect("s1").await.unwrap_err();
    assert!(matches!(err, ConnectionError::Authentication));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_retries_then_succeeds() {
    let connector = MockConnector::new();
    connector.respond("list", "There are 0 of a max of 20 players online:");
    let manager = manager(vec![server_config("s1")], &connector);
    manager.connect("s1").await.unwrap();

    connector.fail_next_sends(2);
    let result = manager.send("s1", "list").await;

    assert!(result.success);
    assert_eq!(connector.sent_count("list"), 3);
    assert_eq!(connector.connect_attempts(), 3);
    assert_eq!(manager.status("s1"), ConnectionStatus::Connected);
    assert!(result.execution_time_ms >= 4_000);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_session_reconnects_with_linear_backoff() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);
    manager.connect("s1").await.unwrap();
    let recorder = StatusRecorder::attach(&manager);

    connector.fail_next_sends(3);
    // Two redials inside the send, then the scheduled reconnects.
    connector.plan_connects([
        ConnectStep::Accept,
        ConnectStep::Accept,
        ConnectStep::Refuse,
        ConnectStep::Accept,
    ]);
    let result = manager.send("s1", "list").await;
    assert!(!result.success);
    assert!(result.normalized_text.contains("3 attempt(s)"));
    assert_eq!(connector.connect_attempts(), 3);
    assert_eq!(manager.status("s1"), ConnectionStatus::Disconnected);
    let drop_reason = recorder.last().unwrap().reason.unwrap();
    assert!(drop_reason.contains("reconnecting in 2000ms"), "{drop_reason}");

    // First reconnect after 1 × 2000ms.
    tokio::time::sleep(Duration::from_millis(1_999)).await;
    assert_eq!(connector.connect_attempts(), 3);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(connector.connect_attempts(), 4);
    assert_eq!(manager.status("s1"), ConnectionStatus::Error);

    // Second reconnect 2 × 2000ms after the first failure.
    tokio::time::sleep(Duration::from_millis(3_997)).await;
    assert_eq!(connector.connect_attempts(), 4);
    tokio::time::sleep(Duration::from_millis(3)).await;
    assert_eq!(connector.connect_attempts(), 5);
    assert_eq!(manager.status("s1"), ConnectionStatus::Connected);

    assert_eq!(
        recorder.statuses(),
        vec![
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Error,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_until_explicit_connect() {
    let connector = MockConnector::new();
    let mut config = server_config("s1");
    config.retry_attempts = 2;
    config.retry_delay_ms = 1_000;
    let manager = manager(vec![config], &connector);
    manager.connect("s1").await.unwrap();
    let recorder = StatusRecorder::attach(&manager);

    connector.fail_next_sends(1);
    connector.plan_connects([ConnectStep::Refuse; 3]);
    let result = manager.send("s1", "list").await;
    assert!(!result.success);
    assert_eq!(connector.sent_count("list"), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connect_attempts(), 4);
    assert_eq!(manager.status("s1"), ConnectionStatus::Error);
    let reason = recorder.last().unwrap().reason.unwrap();
    assert!(reason.contains("giving up"), "{reason}");

    manager.connect("s1").await.unwrap();
    assert_eq!(manager.status("s1"), ConnectionStatus::Connected);
    assert_eq!(connector.connect_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_disabled_leaves_session_disconnected() {
    let connector = MockConnector::new();
    let mut config = server_config("s1");
    config.auto_reconnect = false;
    let manager = manager(vec![config], &connector);
    manager.connect("s1").await.unwrap();

    connector.fail_next_sends(3);
    let result = manager.send("s1", "list").await;
    assert!(!result.success);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connect_attempts(), 3);
    assert_eq!(manager.status("s1"), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);
    manager.connect("s1").await.unwrap();
    let recorder = StatusRecorder::attach(&manager);

    connector.fail_next_sends(3);
    let _ = manager.send("s1", "list").await;
    manager.disconnect("s1").await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connect_attempts(), 3);
    let last = recorder.last().unwrap();
    assert_eq!(last.status, ConnectionStatus::Disconnected);
    assert_eq!(last.reason, None);
    assert_eq!(manager.status("s1"), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_then_connect_emits_only_fresh_transitions() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);
    let recorder = StatusRecorder::attach(&manager);

    manager.connect("s1").await.unwrap();
    manager.disconnect("s1").await;
    recorder.clear();

    manager.connect("s1").await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(
        recorder.statuses(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
}

#[tokio::test]
async fn test_disconnect_unknown_or_idle_is_noop() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);
    let recorder = StatusRecorder::attach(&manager);

    manager.disconnect("s1").await;
    manager.disconnect("nope").await;
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn test_connected_servers_lists_only_connected() {
    let connector = MockConnector::new();
    connector.plan_connects([ConnectStep::Accept, ConnectStep::RejectAuth]);
    let manager = manager(
        vec![server_config("b"), server_config("a"), server_config("c")],
        &connector,
    );

    manager.connect("b").await.unwrap();
    assert!(manager.connect("a").await.is_err());
    manager.connect("c").await.unwrap();

    assert_eq!(manager.connected_servers(), vec!["b", "c"]);
    assert_eq!(manager.status("a"), ConnectionStatus::Disconnected);

    manager.disconnect_all().await;
    assert!(manager.connected_servers().is_empty());
}

#[tokio::test]
async fn test_commands_on_one_server_keep_send_order() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);
    manager.connect("s1").await.unwrap();

    let (a, b, c) = tokio::join!(
        manager.send("s1", "first"),
        manager.send("s1", "second"),
        manager.send("s1", "third"),
    );
    assert!(a.success && b.success && c.success);
    assert_eq!(connector.sent(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_panicking_observer_does_not_block_others() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);
    let _ = manager.on_status_change(|_| panic!("observer bug"));
    let recorder = StatusRecorder::attach(&manager);

    manager.connect("s1").await.unwrap();
    assert_eq!(
        recorder.statuses(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
}

#[tokio::test]
async fn test_unsubscribed_observer_stops_receiving() {
    let connector = MockConnector::new();
    let manager = manager(vec![server_config("s1")], &connector);
    let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = seen.clone();
    let subscription = manager.on_status_change(move |_| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });

    manager.connect("s1").await.unwrap();
    let before = seen.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(before, 2);

    subscription.unsubscribe();
    manager.disconnect("s1").await;
    assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), before);
}
