//! Control facade tests: start, stop, port handling and lifecycle events

use std::time::Duration;

use tokio::time::timeout;

use crate::common::{eventually, free_port, running_server, script_server, TestClient, STEP_TIMEOUT};
use replserver::{Phase, ReplError, ServerEvent, ServerStatus};

// ============================================================================
// START / STOP
// ============================================================================

#[tokio::test]
async fn test_start_and_stop_toggle_running() {
    let server = script_server();
    assert!(!server.running());
    assert_eq!(server.status(), ServerStatus::Stopped);

    server.start().await.unwrap();
    assert!(server.running());
    assert_eq!(server.status(), ServerStatus::Running);
    assert_eq!(server.status().to_string(), "RUNNING");
    assert_eq!(
        server.local_addr().map(|a| a.port()),
        Some(server.listen_port())
    );

    server.stop().await.unwrap();
    assert!(!server.running());
    assert_eq!(server.phase(), Phase::Stopped);
    assert_eq!(server.status().to_string(), "STOPPED");
    assert_eq!(server.local_addr(), None);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let server = running_server().await;
    let addr = server.local_addr();

    server.start().await.unwrap();
    assert!(server.running());
    assert_eq!(server.local_addr(), addr);

    let mut client = TestClient::connect_to(&server).await;
    assert_eq!(client.eval("1+1").await, "2");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let server = running_server().await;
    server.stop().await.unwrap();
    server.stop().await.unwrap();
    assert!(!server.running());
}

#[tokio::test]
async fn test_stop_releases_port() {
    let server = running_server().await;
    let port = server.listen_port();
    server.stop().await.unwrap();

    let rebound = tokio::net::TcpListener::bind(("127.0.0.1", port)).await;
    assert!(rebound.is_ok(), "port {} should be free after stop", port);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let server = running_server().await;
    server.stop().await.unwrap();

    server.start().await.unwrap();
    assert!(server.running());
    let mut client = TestClient::connect_to(&server).await;
    assert_eq!(client.eval("2*21").await, "42");

    server.stop().await.unwrap();
}

// ============================================================================
// LISTEN PORT
// ============================================================================

#[tokio::test]
async fn test_set_listen_port_while_running_is_rejected() {
    let server = running_server().await;
    let port = server.listen_port();

    let err = server.set_listen_port(i64::from(free_port())).unwrap_err();
    assert!(matches!(err, ReplError::InvalidState { .. }));
    assert_eq!(server.listen_port(), port);
    assert!(server.running());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_port_change_takes_effect_on_next_start() {
    let server = running_server().await;
    server.stop().await.unwrap();

    let new_port = free_port();
    server.set_listen_port(i64::from(new_port)).unwrap();
    server.start().await.unwrap();
    assert_eq!(server.local_addr().map(|a| a.port()), Some(new_port));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_out_of_range_ports_rejected() {
    let server = script_server();
    let port = server.listen_port();
    for bad in [0_i64, -5, 65536] {
        let err = server.set_listen_port(bad).unwrap_err();
        assert!(matches!(err, ReplError::InvalidConfig { .. }), "port {}", bad);
    }
    assert_eq!(server.listen_port(), port);
}

// ============================================================================
// BIND FAILURE
// ============================================================================

#[tokio::test]
async fn test_bind_conflict_leaves_server_stopped() {
    let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = held.local_addr().unwrap().port();

    let server = script_server();
    server.set_listen_port(i64::from(port)).unwrap();

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ReplError::Bind { .. }), "got {:?}", err);
    assert!(!server.running());
    assert_eq!(server.phase(), Phase::Stopped);

    // The port can still be changed after a failed start
    drop(held);
    server.set_listen_port(i64::from(free_port())).unwrap();
    server.start().await.unwrap();
    assert!(server.running());
    server.stop().await.unwrap();
}

// ============================================================================
// MULTIPLE INSTANCES
// ============================================================================

#[tokio::test]
async fn test_instances_are_independent() {
    let first = running_server().await;
    let second = running_server().await;
    assert_ne!(first.listen_port(), second.listen_port());

    let mut a = TestClient::connect_to(&first).await;
    let mut b = TestClient::connect_to(&second).await;
    assert_eq!(a.eval("x = 1").await, "1");
    assert!(b.eval("x").await.starts_with("ERROR: ReferenceError"));

    first.stop().await.unwrap();
    a.expect_closed().await;
    assert!(second.running());
    assert_eq!(b.eval("3+4").await, "7");

    second.stop().await.unwrap();
}

// ============================================================================
// EVENTS
// ============================================================================

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<ServerEvent>) -> ServerEvent {
    timeout(STEP_TIMEOUT, rx.recv())
        .await
        .expect("No event in time")
        .expect("Event channel closed")
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let server = script_server();
    let mut events = server.subscribe();

    server.start().await.unwrap();
    let addr = server.local_addr().unwrap();
    assert_eq!(next_event(&mut events).await, ServerEvent::Started { addr });

    let mut client = TestClient::connect(addr).await;
    let opened = match next_event(&mut events).await {
        ServerEvent::SessionOpened { id, .. } => id,
        other => panic!("expected SessionOpened, got {:?}", other),
    };
    assert_eq!(server.session_ids(), vec![opened]);

    client.send_line("/quit").await;
    assert_eq!(client.read_line().await.as_deref(), Some("Bye!"));
    assert_eq!(
        next_event(&mut events).await,
        ServerEvent::SessionClosed { id: opened }
    );

    server.stop().await.unwrap();
    assert_eq!(next_event(&mut events).await, ServerEvent::Stopped);
}

#[tokio::test]
async fn test_stop_waits_for_sessions() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;
    assert!(eventually(|| server.session_count() == 1).await);

    timeout(Duration::from_secs(5), server.stop())
        .await
        .expect("stop() did not finish in time")
        .unwrap();
    assert_eq!(server.session_count(), 0);
    client.expect_closed().await;
}
