//! Channel lifecycle.
//!
//! - A channel with pending handles is never retired
//! - Invalidation during a poll moves pending deliveries to a new channel
//! - Invalidation during a send resends on a new channel

use super::harness::{client_with, outcome_within, test_config, AckScript, SendScript};
use crate::channel::ChannelState;
use crate::client::DeliveryOutcome;
use crate::protocol::EventPayload;
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(120);

#[tokio::test(start_paused = true)]
async fn channel_with_pending_handles_not_retired() {
    let mut config = test_config();
    config.channel_idle_threshold = Duration::from_secs(5);
    config.per_handle_timeout = Duration::from_secs(600);
    let (client, transport) = client_with(config);
    // Failing polls do not count as activity.
    transport.set_default_ack(AckScript::TransportError);

    let _ticket = client
        .submit(EventPayload::new(serde_json::json!("stuck")))
        .await
        .unwrap();
    let channel = client.status().active_channel.unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.status().active_channel, Some(channel));
    assert_eq!(client.status().outstanding_handles, 1);
}

#[tokio::test(start_paused = true)]
async fn poll_invalidation_resends_on_new_channel() {
    let (client, transport) = client_with(test_config());
    transport.queue_ack(AckScript::ChannelInvalid);
    transport.set_default_ack(AckScript::AckAll);

    let ticket = client
        .submit(EventPayload::new(serde_json::json!("moved")))
        .await
        .unwrap();
    let first = client.status().active_channel.unwrap();

    assert_eq!(
        outcome_within(ticket, LIMIT).await,
        DeliveryOutcome::Confirmed { attempts: 2 }
    );

    let channels = transport.channels_used();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0], first);
    assert_eq!(client.status().active_channel, Some(channels[1]));
    assert_eq!(client.status().outstanding_handles, 0);
}

#[tokio::test(start_paused = true)]
async fn send_invalidation_resends_on_new_channel() {
    let (client, transport) = client_with(test_config());
    transport.queue_send(SendScript::ChannelInvalid);
    transport.set_default_ack(AckScript::AckAll);

    let ticket = client
        .submit(EventPayload::new(serde_json::json!("retry elsewhere")))
        .await
        .unwrap();
    // The rejected channel is gone before the resend.
    let status = client.status();
    assert!(status.active_channel.is_none());
    assert_eq!(status.channel.map(|c| c.state), Some(ChannelState::Invalidated));

    assert_eq!(
        outcome_within(ticket, LIMIT).await,
        DeliveryOutcome::Confirmed { attempts: 2 }
    );
    assert_eq!(transport.send_calls(), 2);
    assert_eq!(transport.channels_used().len(), 2);
}
