//! Evaluator failure tests: timeouts, panics and custom evaluators

use std::sync::Arc;
use std::time::Duration;

use crate::common::{free_port, server_with_evaluator, TestClient};
use replserver::{Bindings, EvalError, Evaluation, Evaluator, ScriptEvaluator, ServerConfig, Value};

fn config() -> ServerConfig {
    ServerConfig::with_port(i64::from(free_port()))
        .unwrap()
        .eval_timeout(Duration::from_secs(1))
}

/// Script evaluator that sleeps on `sleep` and panics on `panic`
fn misbehaving_evaluator() -> Arc<dyn Evaluator> {
    let script = ScriptEvaluator::new();
    Arc::new(
        move |bindings: Bindings, source: &str| -> Result<Evaluation, EvalError> {
            match source.trim() {
                "sleep" => {
                    std::thread::sleep(Duration::from_secs(3));
                    let mut bindings = bindings;
                    bindings.insert("slept".to_string(), Value::Bool(true));
                    Ok(Evaluation {
                        value: Value::Undefined,
                        bindings,
                    })
                }
                "panic" => panic!("evaluator blew up"),
                _ => script.evaluate(bindings, source),
            }
        },
    )
}

#[tokio::test]
async fn test_slow_evaluation_times_out() {
    let server = server_with_evaluator(config(), misbehaving_evaluator());
    server.start().await.unwrap();
    let mut client = TestClient::connect_to(&server).await;

    assert_eq!(client.eval("let k = 1").await, "undefined");
    let reply = client.eval("sleep").await;
    assert!(reply.starts_with("ERROR: Timeout:"), "got {:?}", reply);

    // The abandoned evaluation never lands in the session
    assert_eq!(client.eval("k").await, "1");
    assert!(client.eval("slept").await.starts_with("ERROR: ReferenceError"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_panicking_evaluator_reports_internal_error() {
    let server = server_with_evaluator(config(), misbehaving_evaluator());
    server.start().await.unwrap();
    let mut client = TestClient::connect_to(&server).await;

    assert_eq!(
        client.eval("panic").await,
        "ERROR: InternalError: evaluator panicked"
    );
    assert_eq!(client.eval("1+1").await, "2");
    assert_eq!(server.session_count(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_during_slow_evaluation() {
    let server = server_with_evaluator(config(), misbehaving_evaluator());
    server.start().await.unwrap();
    let mut client = TestClient::connect_to(&server).await;

    client.send_line("sleep").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    tokio::time::timeout(Duration::from_secs(2), server.stop())
        .await
        .expect("stop() waited for the evaluator")
        .unwrap();
    assert!(!server.running());
    client.expect_closed().await;
}

#[tokio::test]
async fn test_custom_evaluator_receives_bindings() {
    let echo = Arc::new(
        |mut bindings: Bindings, source: &str| -> Result<Evaluation, EvalError> {
            let count = match bindings.get("count") {
                Some(Value::Number(n)) => *n + 1.0,
                _ => 1.0,
            };
            bindings.insert("count".to_string(), Value::Number(count));
            Ok(Evaluation {
                value: Value::Str(format!("{}:{}", count, source)),
                bindings,
            })
        },
    );
    let server = server_with_evaluator(config(), echo);
    server.start().await.unwrap();
    let mut client = TestClient::connect_to(&server).await;

    assert_eq!(client.eval("hello").await, "1:hello");
    assert_eq!(client.eval("again").await, "2:again");

    server.stop().await.unwrap();
}
