//! Confirmation rules.
//!
//! - Only an explicit `true` for the current handle confirms
//! - A late `true` for a superseded handle is ignored
//! - Confirmed handles are evicted and never queried again
//! - Concurrent submits on one channel never share an ack id

use super::harness::{client_with, outcome_within, test_config, AckScript};
use crate::client::DeliveryOutcome;
use crate::protocol::{AckId, EventPayload};
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(120);

#[tokio::test(start_paused = true)]
async fn omitted_and_false_ids_stay_pending() {
    let (client, transport) = client_with(test_config());
    transport.queue_ack(AckScript::results(&[(0, false)]));
    transport.queue_ack(AckScript::results(&[]));
    transport.queue_ack(AckScript::results(&[(1, true)]));

    let _ticket = client
        .submit(EventPayload::new(serde_json::json!("pending")))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(transport.ack_queries().len(), 3);
    assert_eq!(client.status().outstanding_deliveries, 1);
    assert_eq!(client.status().outstanding_handles, 1);
}

#[tokio::test(start_paused = true)]
async fn late_ack_for_superseded_handle_does_not_confirm() {
    let (client, transport) = client_with(test_config());

    let ticket = client
        .submit(EventPayload::new(serde_json::json!("resent")))
        .await
        .unwrap();

    // Handle 0 expires at the 11s tick and is resent as handle 1.
    tokio::time::sleep(Duration::from_millis(11_500)).await;
    let sent = transport.sent_events();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].ack_id, Some(AckId(1)));

    // The service reports the old handle; the delivery must not resolve.
    transport.queue_ack(AckScript::results(&[(0, true), (1, false)]));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(client.status().outstanding_deliveries, 1);

    transport.set_default_ack(AckScript::AckWhenQueried(vec![1]));
    assert_eq!(
        outcome_within(ticket, LIMIT).await,
        DeliveryOutcome::Confirmed { attempts: 2 }
    );
}

#[tokio::test(start_paused = true)]
async fn confirmed_handles_are_not_requeried() {
    let (client, transport) = client_with(test_config());
    transport.set_default_ack(AckScript::AckAll);

    let ticket = client
        .submit(EventPayload::new(serde_json::json!("once")))
        .await
        .unwrap();
    outcome_within(ticket, LIMIT).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.ack_queries().len(), 1);
    assert_eq!(client.status().outstanding_handles, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_submits_get_distinct_ack_ids() {
    let (client, transport) = client_with(test_config());
    transport.set_default_ack(AckScript::AckAll);

    let submits = (0..10).map(|i| client.submit(EventPayload::new(serde_json::json!({ "n": i }))));
    let tickets: Vec<_> = join_all(submits)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    let sent = transport.sent_events();
    assert_eq!(transport.channels_used().len(), 1);
    let ids: HashSet<AckId> = sent.iter().filter_map(|s| s.ack_id).collect();
    assert_eq!(ids.len(), 10);

    for ticket in tickets {
        assert!(outcome_within(ticket, LIMIT).await.is_confirmed());
    }
}

#[tokio::test(start_paused = true)]
async fn ticket_wait_repeats_resolved_outcome() {
    let (client, transport) = client_with(test_config());
    transport.set_default_ack(AckScript::AckAll);

    let mut ticket = client
        .submit(EventPayload::new(serde_json::json!("twice")))
        .await
        .unwrap();

    let first = tokio::time::timeout(LIMIT, ticket.wait()).await.unwrap();
    assert_eq!(first, DeliveryOutcome::Confirmed { attempts: 1 });
    assert_eq!(ticket.wait().await, first);
    assert_eq!(ticket.outcome().await, first);
}
