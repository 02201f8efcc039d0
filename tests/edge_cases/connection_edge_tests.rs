//! Connection Edge Case Tests
//!
//! Clients that disappear, send partial input, or connect during shutdown.

use std::io::Write;

use crate::common::{eventually, running_server, server_with, TestClient};
use replserver::config::DEFAULT_PROMPT;
use replserver::ServerConfig;

// ============================================================================
// ABRUPT DISCONNECTS
// ============================================================================

#[tokio::test]
async fn test_dropped_client_is_unregistered() {
    let server = running_server().await;
    let client = TestClient::connect_to(&server).await;
    assert!(eventually(|| server.session_count() == 1).await);

    drop(client);
    assert!(eventually(|| server.session_count() == 0).await);
    assert!(server.running());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_partial_line_at_eof_is_dropped() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    client.send_raw(b"1+").await;
    client.finish_writing().await;
    client.expect_closed().await;
    assert!(eventually(|| server.session_count() == 0).await);

    // Server keeps serving others
    let mut other = TestClient::connect_to(&server).await;
    assert_eq!(other.eval("1+1").await, "2");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_closing_after_complete_line_gets_reply() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    client.send_raw(b"6*7\n").await;
    client.finish_writing().await;
    assert_eq!(client.read_line().await.as_deref(), Some("42"));
    client.expect_closed().await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_utf8_is_replaced_not_fatal() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    client.send_raw(b"'\xff'\n").await;
    let reply = client.read_line().await.expect("connection closed");
    assert_eq!(reply, "\u{fffd}");
    client.expect_prompt().await;
    assert_eq!(client.eval("1").await, "1");

    server.stop().await.unwrap();
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[tokio::test]
async fn test_server_from_config_file() {
    let port = crate::common::free_port();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "listen_port = {}\nprompt = \"{}\"\nbanner = \"\"",
        port, DEFAULT_PROMPT
    )
    .unwrap();

    let config = ServerConfig::load(file.path()).unwrap();
    let server = server_with(config);
    server.start().await.unwrap();
    assert_eq!(server.listen_port(), port);

    // No banner line: the prompt comes first
    let mut client = TestClient::connect_raw(server.local_addr().unwrap(), DEFAULT_PROMPT).await;
    client.expect_prompt().await;
    assert_eq!(client.eval("10 / 4").await, "2.5");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_custom_prompt() {
    let config = ServerConfig::with_port(crate::common::free_port() as i64)
        .unwrap()
        .prompt(">> ")
        .banner("");
    let server = server_with(config);
    server.start().await.unwrap();

    let mut client = TestClient::connect_raw(server.local_addr().unwrap(), ">> ").await;
    client.expect_prompt().await;
    assert_eq!(client.eval("true && 'yes'").await, "yes");

    server.stop().await.unwrap();
}
