//! Resend policy: what happens to a delivery whose handle will never confirm.

use crate::channel::ChannelId;
use crate::protocol::{AckId, DeliveryId};

/// Why a delivery needs another send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendReason {
    /// The handle aged past the per-handle timeout.
    Expired,
    /// The handle's channel was invalidated by the service.
    ChannelInvalidated,
    /// The send produced no usable handle.
    LostSend,
}

/// A delivery queued for resend.
#[derive(Debug, Clone, Copy)]
pub struct ResendRequest {
    pub delivery_id: DeliveryId,
    /// The expired handle being replaced, if the last send produced one.
    pub superseded: Option<(ChannelId, AckId)>,
    pub reason: ResendReason,
}

/// Outcome of a resend decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendDecision {
    /// Send again as this attempt number.
    Resend { attempt: u32 },
    /// Attempts are exhausted; report the delivery failed.
    GiveUp { attempts: u32 },
}

/// Caps the number of sends per payload.
#[derive(Debug, Clone, Copy)]
pub struct ResendPolicy {
    max_attempts: u32,
}

impl ResendPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide the fate of a delivery that has been sent `attempts` times.
    pub fn decide(&self, attempts: u32) -> ResendDecision {
        if attempts >= self.max_attempts {
            ResendDecision::GiveUp { attempts }
        } else {
            ResendDecision::Resend {
                attempt: attempts + 1,
            }
        }
    }

    /// Whether a request still refers to the delivery's live handle.
    ///
    /// A request naming a handle other than `current` is stale: the delivery
    /// was confirmed or resent in the meantime.
    pub fn is_current(request: &ResendRequest, current: Option<(ChannelId, AckId)>) -> bool {
        match request.reason {
            ResendReason::LostSend => current.is_none(),
            ResendReason::Expired | ResendReason::ChannelInvalidated => {
                request.superseded.is_some() && request.superseded == current
            }
        }
    }
}
