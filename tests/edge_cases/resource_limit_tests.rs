//! Resource Limit Tests
//!
//! One client building oversized values must get an error reply while the
//! server and every other session keep working.

use crate::common::{running_server, TestClient};

#[tokio::test]
async fn test_deeply_nested_arrays_are_refused() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    assert_eq!(client.eval("a = 0").await, "0");
    let line = format!("{}0", "a=[a];".repeat(1_000));
    for _ in 0..20 {
        assert_eq!(
            client.eval(&line).await,
            "ERROR: RangeError: Maximum array nesting depth exceeded"
        );
    }
    // Failed lines never reach the session bindings
    assert_eq!(client.eval("a").await, "0");

    // Nesting below the limit still works
    let shallow = format!("{}a.length", "a=[a];".repeat(200));
    assert_eq!(client.eval(&shallow).await, "1");

    let mut other = TestClient::connect_to(&server).await;
    assert_eq!(other.eval("1+1").await, "2");
    assert!(server.running());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_exponential_growth_is_refused() {
    let server = running_server().await;
    let mut client = TestClient::connect_to(&server).await;

    let arrays = format!("b = [1, 1, 1, 1]; {}0", "b = [b, b, b, b]; ".repeat(20));
    assert_eq!(client.eval(&arrays).await, "ERROR: RangeError: Invalid array length");

    let strings = format!("s = 'abcd'; {}0", "s = s + s; ".repeat(40));
    assert_eq!(client.eval(&strings).await, "ERROR: RangeError: Invalid string length");

    assert_eq!(client.eval("'still' + ' here'").await, "still here");

    server.stop().await.unwrap();
}
