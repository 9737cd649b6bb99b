//! Event sender: one payload onto one channel, with transport retry.

use crate::channel::{Channel, ChannelRegistry};
use crate::config::SendRetryConfig;
use crate::error::IngestResult;
use crate::protocol::DeliveryId;
use crate::tracker::{AckTracker, DeliveryHandle};
use crate::transport::IngestTransport;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Delivers events and registers their handles before returning them.
pub struct EventSender {
    transport: Arc<dyn IngestTransport>,
    registry: Arc<ChannelRegistry>,
    tracker: Arc<AckTracker>,
    retry: SendRetryConfig,
}

impl EventSender {
    pub fn new(
        transport: Arc<dyn IngestTransport>,
        registry: Arc<ChannelRegistry>,
        tracker: Arc<AckTracker>,
        retry: SendRetryConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            tracker,
            retry,
        }
    }

    /// Send `event` on `channel` as attempt number `attempt` of `delivery_id`.
    ///
    /// A pending slot is reserved first, so a full channel fails with
    /// [`IngestError::Capacity`](crate::IngestError::Capacity) before
    /// anything goes on the wire. Transport failures are retried with
    /// exponential backoff up to `max_send_retries`; every other failure
    /// returns immediately. On success the handle is already tracked; on
    /// failure or cancellation the slot is released.
    pub async fn send(
        &self,
        channel: &Channel,
        delivery_id: DeliveryId,
        event: &Value,
        attempt: u32,
    ) -> IngestResult<DeliveryHandle> {
        let reservation = self.tracker.reserve_slot(&channel.id)?;

        let mut tries = 0;
        loop {
            tries += 1;

            match self.transport.send_event(&channel.id, event).await {
                Ok(ack_id) => {
                    self.registry.mark_activity(&channel.id, Instant::now());
                    let handle = DeliveryHandle::pending(ack_id, channel.id, delivery_id, attempt);
                    reservation.register(handle.clone())?;

                    debug!(
                        channel = %channel.id,
                        delivery_id = %delivery_id,
                        ack_id = %ack_id,
                        attempt = attempt,
                        "Event sent"
                    );
                    return Ok(handle);
                }
                Err(e) if e.is_retryable() && tries < self.retry.max_send_retries => {
                    let delay = self.retry.delay_for(tries);
                    warn!(
                        channel = %channel.id,
                        delivery_id = %delivery_id,
                        try_number = tries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    drop(reservation);
                    if e.is_fatal() {
                        error!(channel = %channel.id, error = %e, "Send rejected credentials");
                    } else {
                        warn!(
                            channel = %channel.id,
                            delivery_id = %delivery_id,
                            try_number = tries,
                            error = %e,
                            "Send failed"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::protocol::AckId;
    use crate::tests::harness::{MockTransport, SendScript};
    use crate::tracker::TrackerLimits;
    use std::time::Duration;

    fn sender(transport: Arc<MockTransport>, per_channel: usize) -> (EventSender, Arc<ChannelRegistry>, Arc<AckTracker>) {
        let registry = Arc::new(ChannelRegistry::new());
        let tracker = Arc::new(AckTracker::new(TrackerLimits {
            max_pending_per_channel: per_channel,
            max_pending_total: 100,
        }));
        let retry = SendRetryConfig {
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(400),
            max_send_retries: 3,
        };
        let sender = EventSender::new(transport, registry.clone(), tracker.clone(), retry);
        (sender, registry, tracker)
    }

    #[tokio::test]
    async fn test_send_registers_handle() {
        let transport = Arc::new(MockTransport::new());
        let (sender, registry, tracker) = sender(transport.clone(), 10);
        let channel = registry.acquire_channel();

        let handle = sender
            .send(&channel, DeliveryId::new_random(), &serde_json::json!({"event": 1}), 1)
            .await
            .unwrap();

        assert_eq!(handle.ack_id, AckId(0));
        assert_eq!(handle.attempt, 1);
        assert_eq!(tracker.pending_ids(&channel.id), vec![AckId(0)]);
        assert_eq!(transport.sent_events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_retried_with_backoff() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_send(SendScript::TransportError);
        transport.queue_send(SendScript::TransportError);
        let (sender, registry, tracker) = sender(transport.clone(), 10);
        let channel = registry.acquire_channel();

        let start = Instant::now();
        let handle = sender
            .send(&channel, DeliveryId::new_random(), &serde_json::json!({}), 1)
            .await
            .unwrap();

        // 100ms + 200ms of backoff before the third try.
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(transport.send_calls(), 3);
        assert_eq!(tracker.pending_ids(&channel.id), vec![handle.ack_id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_retries_exhausted_releases_slot() {
        let transport = Arc::new(MockTransport::new());
        for _ in 0..3 {
            transport.queue_send(SendScript::TransportError);
        }
        let (sender, registry, tracker) = sender(transport.clone(), 10);
        let channel = registry.acquire_channel();

        let err = sender
            .send(&channel, DeliveryId::new_random(), &serde_json::json!({}), 1)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(transport.send_calls(), 3);
        assert_eq!(tracker.total_outstanding(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_send(SendScript::Unauthorized);
        let (sender, registry, tracker) = sender(transport.clone(), 10);
        let channel = registry.acquire_channel();

        let err = sender
            .send(&channel, DeliveryId::new_random(), &serde_json::json!({}), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Auth { .. }));
        assert_eq!(transport.send_calls(), 1);
        assert_eq!(tracker.total_outstanding(), 0);
    }

    #[tokio::test]
    async fn test_malformed_success_is_not_a_handle() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_send(SendScript::MissingAckId);
        let (sender, registry, tracker) = sender(transport.clone(), 10);
        let channel = registry.acquire_channel();

        let err = sender
            .send(&channel, DeliveryId::new_random(), &serde_json::json!({}), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Protocol(_)));
        assert_eq!(transport.send_calls(), 1);
        assert!(tracker.pending_ids(&channel.id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_send_releases_slot() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_send(SendScript::Delay(Duration::from_secs(10)));
        let (sender, registry, tracker) = sender(transport.clone(), 1);
        let channel = registry.acquire_channel();

        let payload = serde_json::json!({});
        let send = sender.send(&channel, DeliveryId::new_random(), &payload, 1);
        assert!(tokio::time::timeout(Duration::from_secs(1), send).await.is_err());

        assert_eq!(tracker.total_outstanding(), 0);
        assert_eq!(tracker.pending_count(&channel.id), 0);
        sender
            .send(&channel, DeliveryId::new_random(), &serde_json::json!({}), 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_channel_sends_nothing() {
        let transport = Arc::new(MockTransport::new());
        let (sender, registry, _tracker) = sender(transport.clone(), 1);
        let channel = registry.acquire_channel();

        sender
            .send(&channel, DeliveryId::new_random(), &serde_json::json!({}), 1)
            .await
            .unwrap();
        let err = sender
            .send(&channel, DeliveryId::new_random(), &serde_json::json!({}), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Capacity { .. }));
        assert_eq!(transport.send_calls(), 1);
    }
}
