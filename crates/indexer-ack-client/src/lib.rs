//! Indexer-ack client: reliable event ingestion with acknowledgment tracking.
//!
//! A successful send only means the service *received* an event. Durable
//! indexing is confirmed later by polling an acknowledgment endpoint with
//! the ack ids the sends returned. This crate keeps the bookkeeping between
//! the two and resends anything that never confirms.
//!
//! # Core Invariants
//!
//! 1. **Channel-Scoped Ids**: an ack id means nothing without its channel
//! 2. **Bounded Memory**: pending handles per channel and in total are capped
//! 3. **No False Confirmation**: only an explicit `true` confirms a delivery
//! 4. **At-Least-Once**: a delivery resolves confirmed, failed or unconfirmed
//!
//! # Architecture
//!
//! ```text
//! submit -> EventSender --POST event--> ingestion endpoint
//!               |                              |
//!               v                           ackId
//!          AckTracker <------------------------'
//!               ^
//!               |  acked / expired
//!          AckPoller --POST ack query--> ack endpoint
//!               |
//!               v
//!        ResendPolicy -> EventSender (same payload, next attempt)
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod poller;
pub mod protocol;
pub mod resend;
pub mod sender;
pub mod tracker;
pub mod transport;

#[cfg(test)]
mod tests;

pub use channel::{Channel, ChannelId, ChannelRegistry, ChannelState};
pub use client::{
    ClientStatus, DeliveryOutcome, DeliveryTicket, IngestClient, ShutdownReport,
    UnconfirmedDelivery,
};
pub use config::{
    BackpressureMode, ChannelPlacement, ClientConfig, EndpointConfig, SendRetryConfig,
};
pub use error::{IngestError, IngestResult};
pub use poller::{AckPoller, PollOutcome};
pub use protocol::{AckId, AckResults, DeliveryId, EventPayload, IdempotencyMarker};
pub use resend::{ResendDecision, ResendPolicy, ResendReason, ResendRequest};
pub use sender::EventSender;
pub use tracker::{AckTracker, DeliveryHandle, HandleState, SlotReservation, TrackerLimits};
pub use transport::{HttpTransport, IngestTransport};
