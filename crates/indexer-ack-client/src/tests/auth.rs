//! Credential rejection.
//!
//! - A 401 on send fails `submit` and every later submit
//! - A 401 on poll resolves every outstanding delivery as fatal

use super::harness::{client_with, outcome_within, test_config, AckScript, SendScript};
use crate::client::DeliveryOutcome;
use crate::error::IngestError;
use crate::protocol::EventPayload;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn send_auth_failure_is_fatal_and_sticky() {
    let (client, transport) = client_with(test_config());
    transport.queue_send(SendScript::Unauthorized);

    let err = client
        .submit(EventPayload::new(serde_json::json!(1)))
        .await
        .unwrap_err();
    assert!(err.is_fatal());

    let err = client
        .submit(EventPayload::new(serde_json::json!(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Auth { .. }));

    // No retries and nothing left behind.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.send_calls(), 1);
    assert_eq!(client.status().outstanding_handles, 0);
    assert_eq!(client.status().outstanding_deliveries, 0);
}

#[tokio::test(start_paused = true)]
async fn poll_auth_failure_fails_outstanding_deliveries() {
    let (client, transport) = client_with(test_config());
    transport.queue_ack(AckScript::Unauthorized);

    let first = client.submit(EventPayload::new(serde_json::json!(1))).await.unwrap();
    let second = client.submit(EventPayload::new(serde_json::json!(2))).await.unwrap();

    for ticket in [first, second] {
        match outcome_within(ticket, Duration::from_secs(30)).await {
            DeliveryOutcome::FatalAuth { message } => assert_eq!(message, "Invalid token"),
            other => panic!("expected fatal auth, got {:?}", other),
        }
    }

    // Polling stops once credentials are known bad.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.ack_queries().len(), 1);
    assert!(client.submit(EventPayload::new(serde_json::json!(3))).await.is_err());
}
