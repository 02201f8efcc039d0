//! Wire protocol tests: slash commands, `/message` framing, line limits

use replserver::repl_server::protocol::{
    decode_response, encode_request, EvalRequest, ResponseStatus, MAX_LINE_BYTES,
};
use replserver::SessionId;

use crate::common::{running_server, TestClient};

// ============================================================================
// SLASH COMMANDS
// ============================================================================

#[tokio::test]
async fn test_quit_says_bye_and_closes() {
    let server = running_server().await;
    for command in ["/quit", "/q"] {
        let mut client = TestClient::connect_to(&server).await;
        client.send_line(command).await;
        assert_eq!(client.read_line().await.as_deref(), Some("Bye!"));
        client.expect_closed().await;
    }
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_session_id_matches_registry() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    let reply = client.eval("/session_id").await;
    let id = reply
        .strip_prefix("/session_id ")
        .unwrap_or_else(|| panic!("unexpected reply {:?}", reply));
    let ids: Vec<String> = server.session_ids().iter().map(SessionId::to_string).collect();
    assert_eq!(ids, vec![id.to_string()]);

    // Stable for the life of the connection
    assert_eq!(client.eval("/session_id").await, reply);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_empty_line_only_reprompts() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    client.send_line("").await;
    client.expect_prompt().await;
    client.send_line("   ").await;
    client.expect_prompt().await;
    assert_eq!(client.eval("7").await, "7");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_crlf_terminated_lines() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    client.send_raw(b"1+1\r\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("2"));
    client.expect_prompt().await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_pipelined_lines_answered_in_order() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    client.send_raw(b"let a = 2\na * 3\na * 4\n").await;
    for expected in ["undefined", "6", "8"] {
        assert_eq!(client.read_line().await.as_deref(), Some(expected));
        client.expect_prompt().await;
    }

    server.stop().await.unwrap();
}

// ============================================================================
// /message
// ============================================================================

#[tokio::test]
async fn test_message_round_trip() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    let request = EvalRequest {
        session_id: Some("tool-1".to_string()),
        id: 7,
        src: "let z = 20;\nz + 1".to_string(),
    };
    let reply = client.eval(&encode_request(&request).unwrap()).await;
    assert!(reply.starts_with("/message_response "), "got {:?}", reply);

    let response = decode_response(&reply).unwrap();
    assert_eq!(response.id, 7);
    assert_eq!(response.session_id.as_deref(), Some("tool-1"));
    assert_eq!(response.kind, "eval_response");
    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.result, serde_json::json!(21));

    // Bindings made through /message are visible to plain lines
    assert_eq!(client.eval("z").await, "20");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_message_evaluation_error() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    let request = EvalRequest {
        session_id: None,
        id: 1,
        src: "nope".to_string(),
    };
    let reply = client.eval(&encode_request(&request).unwrap()).await;
    let response = decode_response(&reply).unwrap();
    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(
        response.result,
        serde_json::json!("ReferenceError: nope is not defined")
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_message_with_bad_base64() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    let reply = client.eval("/message !!!not-base64!!!").await;
    assert!(reply.starts_with("ERROR: ProtocolError"), "got {:?}", reply);
    assert_eq!(client.eval("1").await, "1");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_message_with_invalid_json() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    // base64 of `{"id":"x"}`
    let reply = client.eval("/message eyJpZCI6IngifQ==").await;
    assert!(reply.starts_with("ERROR: ProtocolError"), "got {:?}", reply);

    server.stop().await.unwrap();
}

// ============================================================================
// LINE LIMITS
// ============================================================================

#[tokio::test]
async fn test_over_long_line_is_rejected() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    let long = "1".repeat(MAX_LINE_BYTES + 10);
    let reply = client.eval(&long).await;
    assert_eq!(
        reply,
        format!("ERROR: ProtocolError: line exceeds {} bytes", MAX_LINE_BYTES)
    );
    assert_eq!(client.eval("2+2").await, "4");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_multiline_string_result_stays_on_one_line() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    assert_eq!(client.eval(r"'a\nb'").await, r"a\nb");

    server.stop().await.unwrap();
}
