//! Acknowledgment poller: batched status queries for a channel's pending ids.

use crate::channel::{ChannelId, ChannelRegistry};
use crate::error::{IngestError, IngestResult};
use crate::protocol::AckResults;
use crate::tracker::{AckTracker, DeliveryHandle};
use crate::transport::IngestTransport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of one poll.
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Status map as returned by the endpoint.
    pub results: AckResults,
    /// Handles this poll confirmed and evicted.
    pub acked: Vec<DeliveryHandle>,
}

/// Queries the acknowledgment endpoint and feeds the tracker.
pub struct AckPoller {
    transport: Arc<dyn IngestTransport>,
    registry: Arc<ChannelRegistry>,
    tracker: Arc<AckTracker>,
    /// One in-flight poll per channel.
    poll_locks: Mutex<HashMap<ChannelId, Arc<tokio::sync::Mutex<()>>>>,
    nudge: Notify,
}

impl AckPoller {
    pub fn new(
        transport: Arc<dyn IngestTransport>,
        registry: Arc<ChannelRegistry>,
        tracker: Arc<AckTracker>,
    ) -> Self {
        Self {
            transport,
            registry,
            tracker,
            poll_locks: Mutex::new(HashMap::new()),
            nudge: Notify::new(),
        }
    }

    fn poll_lock(&self, channel: &ChannelId) -> Arc<tokio::sync::Mutex<()>> {
        self.poll_locks.lock().entry(*channel).or_default().clone()
    }

    /// Query the status of every PENDING handle on `channel` in one request.
    ///
    /// An empty channel is not polled. A response without a usable status map
    /// counts as empty results. Auth, transport and channel errors are
    /// returned to the caller.
    pub async fn poll_once(&self, channel: &ChannelId) -> IngestResult<PollOutcome> {
        let lock = self.poll_lock(channel);
        let _guard = lock.lock().await;

        let ids = self.tracker.pending_ids(channel);
        if ids.is_empty() {
            return Ok(PollOutcome::default());
        }

        let results = match self.transport.query_acks(channel, &ids).await {
            Ok(results) => results,
            Err(IngestError::Protocol(message)) => {
                warn!(channel = %channel, error = %message, "Unusable ack response, treating as empty");
                return Ok(PollOutcome::default());
            }
            Err(e) => return Err(e),
        };

        self.registry.mark_activity(channel, Instant::now());
        let acked = self.tracker.apply_ack_results(channel, &results);

        debug!(
            channel = %channel,
            queried = ids.len(),
            reported = results.len(),
            acked = acked.len(),
            "Polled acknowledgments"
        );

        Ok(PollOutcome { results, acked })
    }

    /// Drop per-channel state for a channel that will not be polled again.
    pub fn forget_channel(&self, channel: &ChannelId) {
        self.poll_locks.lock().remove(channel);
    }

    /// Request an immediate poll cycle.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    /// Resolves when [`nudge`](Self::nudge) has been called.
    pub async fn nudged(&self) {
        self.nudge.notified().await;
    }
}
