//! Acknowledgment tracker: per-channel bookkeeping of outstanding handles.
//!
//! # State machine
//!
//! ```text
//! PENDING ──ack=true──▶ ACKED (evicted)
//!    │
//!    └──timeout / channel invalid──▶ EXPIRED ──forget()──▶ resent as new PENDING (attempt + 1)
//! ```
//!
//! Expired handles stay in their pending set until the resend decision has
//! been made, so a late `true` for them lands on an entry that ignores it
//! instead of on nothing. They still occupy a slot until then.
//!
//! A send holds a [`SlotReservation`] while it is on the wire. Dropping the
//! reservation without registering a handle gives the slot back, so a send
//! cancelled mid-flight cannot leak capacity.

use crate::channel::ChannelId;
use crate::error::{IngestError, IngestResult};
use crate::protocol::{AckId, AckResults, DeliveryId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Handle lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Acked,
    Expired,
}

/// Receipt for one accepted event.
#[derive(Debug, Clone)]
pub struct DeliveryHandle {
    pub ack_id: AckId,
    pub channel_id: ChannelId,
    pub delivery_id: DeliveryId,
    pub sent_at: Instant,
    pub attempt: u32,
    pub state: HandleState,
}

impl DeliveryHandle {
    /// A freshly issued handle in state PENDING.
    pub fn pending(
        ack_id: AckId,
        channel_id: ChannelId,
        delivery_id: DeliveryId,
        attempt: u32,
    ) -> Self {
        Self {
            ack_id,
            channel_id,
            delivery_id,
            sent_at: Instant::now(),
            attempt,
            state: HandleState::Pending,
        }
    }
}

/// Handles of one channel, keyed by ack id.
#[derive(Debug, Default)]
struct PendingSet {
    handles: HashMap<AckId, DeliveryHandle>,
    /// Slots held by sends that have not returned yet.
    reserved: usize,
}

impl PendingSet {
    fn occupied(&self) -> usize {
        self.handles.len() + self.reserved
    }
}

/// Tracker configuration.
#[derive(Debug, Clone, Copy)]
pub struct TrackerLimits {
    pub max_pending_per_channel: usize,
    pub max_pending_total: usize,
}

/// Bookkeeping of outstanding handles for every channel of one client.
///
/// Each channel's set has its own lock; the outer map lock is only held to
/// look up or insert a channel.
pub struct AckTracker {
    channels: RwLock<HashMap<ChannelId, Arc<Mutex<PendingSet>>>>,
    /// Handles plus reservations across all channels.
    occupied_total: AtomicUsize,
    limits: TrackerLimits,
    capacity_freed: Notify,
}

impl AckTracker {
    pub fn new(limits: TrackerLimits) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            occupied_total: AtomicUsize::new(0),
            limits,
            capacity_freed: Notify::new(),
        }
    }

    fn set(&self, channel: &ChannelId) -> Option<Arc<Mutex<PendingSet>>> {
        self.channels.read().get(channel).cloned()
    }

    fn set_or_insert(&self, channel: &ChannelId) -> Arc<Mutex<PendingSet>> {
        if let Some(set) = self.set(channel) {
            return set;
        }
        self.channels.write().entry(*channel).or_default().clone()
    }

    fn free_slots(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.occupied_total.fetch_sub(count, Ordering::SeqCst);
        self.capacity_freed.notify_waiters();
    }

    /// Reserve a slot for a send about to be issued on `channel`.
    ///
    /// The slot is held until the returned reservation registers a handle or
    /// is dropped.
    pub fn reserve_slot(&self, channel: &ChannelId) -> IngestResult<SlotReservation<'_>> {
        // Held across the reservation so `drop_if_empty` cannot discard the
        // set between lookup and increment.
        let mut channels = self.channels.write();
        let set = channels.entry(*channel).or_default().clone();
        let mut set = set.lock();

        if set.occupied() >= self.limits.max_pending_per_channel {
            return Err(IngestError::Capacity {
                outstanding: set.occupied(),
                limit: self.limits.max_pending_per_channel,
            });
        }

        let limit = self.limits.max_pending_total;
        self.occupied_total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < limit).then_some(total + 1)
            })
            .map_err(|total| IngestError::Capacity {
                outstanding: total,
                limit,
            })?;

        set.reserved += 1;
        Ok(SlotReservation {
            tracker: self,
            channel: *channel,
            held: true,
        })
    }

    /// Give back a reservation whose send produced no handle.
    ///
    /// Called when a [`SlotReservation`] is dropped unused.
    pub fn release_slot(&self, channel: &ChannelId) {
        let Some(set) = self.set(channel) else {
            return;
        };
        let mut set = set.lock();
        if set.reserved > 0 {
            set.reserved -= 1;
            drop(set);
            self.free_slots(1);
        }
    }

    /// Record a handle issued for a reserved send.
    ///
    /// An ack id that is already outstanding on the channel is a protocol
    /// violation; the reservation is released and the handle refused.
    pub fn register_pending(&self, handle: DeliveryHandle) -> IngestResult<()> {
        let set = self.set_or_insert(&handle.channel_id);
        let mut set = set.lock();

        if set.reserved > 0 {
            set.reserved -= 1;
        } else {
            // Unreserved registration still counts against the total.
            self.occupied_total.fetch_add(1, Ordering::SeqCst);
        }

        if set.handles.contains_key(&handle.ack_id) {
            drop(set);
            self.free_slots(1);
            return Err(IngestError::Protocol(format!(
                "ack id {} issued twice on channel {}",
                handle.ack_id, handle.channel_id
            )));
        }

        debug!(
            channel = %handle.channel_id,
            ack_id = %handle.ack_id,
            attempt = handle.attempt,
            "Registered pending handle"
        );
        set.handles.insert(handle.ack_id, handle);
        Ok(())
    }

    /// Apply one poll's results. Returns the handles confirmed by it.
    ///
    /// Only PENDING handles mapped to `true` are confirmed and evicted. Ids
    /// missing from `results` stay PENDING; `true` for an EXPIRED handle is
    /// ignored because a duplicate is already in flight.
    pub fn apply_ack_results(
        &self,
        channel: &ChannelId,
        results: &AckResults,
    ) -> Vec<DeliveryHandle> {
        let Some(set) = self.set(channel) else {
            return Vec::new();
        };
        let mut set = set.lock();

        let mut acked = Vec::new();
        for (ack_id, confirmed) in results {
            if !confirmed {
                continue;
            }
            match set.handles.get(ack_id).map(|h| h.state) {
                Some(HandleState::Pending) => {
                    if let Some(mut handle) = set.handles.remove(ack_id) {
                        handle.state = HandleState::Acked;
                        acked.push(handle);
                    }
                }
                Some(_) => {
                    debug!(channel = %channel, ack_id = %ack_id, "Ignoring late ack for expired handle");
                }
                None => {
                    debug!(channel = %channel, ack_id = %ack_id, "Ignoring ack for unknown handle");
                }
            }
        }
        drop(set);

        self.free_slots(acked.len());
        acked
    }

    /// Mark every PENDING handle older than `timeout` as EXPIRED and return
    /// them. They remain tracked until replaced or forgotten.
    pub fn sweep_expired(&self, now: Instant, timeout: Duration) -> Vec<DeliveryHandle> {
        let sets: Vec<_> = self.channels.read().values().cloned().collect();

        let mut expired = Vec::new();
        for set in sets {
            let mut set = set.lock();
            for handle in set.handles.values_mut() {
                if handle.state == HandleState::Pending
                    && now.saturating_duration_since(handle.sent_at) > timeout
                {
                    handle.state = HandleState::Expired;
                    expired.push(handle.clone());
                }
            }
        }

        if !expired.is_empty() {
            warn!(count = expired.len(), "Handles expired without acknowledgment");
        }
        expired
    }

    /// Mark every PENDING handle of an invalidated channel as EXPIRED.
    pub fn expire_channel(&self, channel: &ChannelId) -> Vec<DeliveryHandle> {
        let Some(set) = self.set(channel) else {
            return Vec::new();
        };
        let mut set = set.lock();

        set.handles
            .values_mut()
            .filter(|handle| handle.state == HandleState::Pending)
            .map(|handle| {
                handle.state = HandleState::Expired;
                handle.clone()
            })
            .collect()
    }

    /// Drop an expired handle once its delivery has been resent or given up.
    pub fn forget(&self, channel: &ChannelId, ack_id: AckId) -> Option<DeliveryHandle> {
        let set = self.set(channel)?;
        let removed = set.lock().handles.remove(&ack_id);
        if removed.is_some() {
            self.free_slots(1);
        }
        self.drop_if_empty(channel);
        removed
    }

    /// Drop a channel's set when it holds nothing. Returns whether it did.
    pub fn drop_if_empty(&self, channel: &ChannelId) -> bool {
        let mut channels = self.channels.write();
        let empty = channels
            .get(channel)
            .map(|set| set.lock().occupied() == 0)
            .unwrap_or(false);
        if empty {
            channels.remove(channel);
        }
        empty
    }

    /// PENDING ack ids of a channel, ascending.
    pub fn pending_ids(&self, channel: &ChannelId) -> Vec<AckId> {
        let Some(set) = self.set(channel) else {
            return Vec::new();
        };
        let set = set.lock();
        let mut ids: Vec<AckId> = set
            .handles
            .values()
            .filter(|handle| handle.state == HandleState::Pending)
            .map(|handle| handle.ack_id)
            .collect();
        ids.sort();
        ids
    }

    /// Handles plus reservations held by a channel.
    pub fn pending_count(&self, channel: &ChannelId) -> usize {
        self.set(channel).map(|set| set.lock().occupied()).unwrap_or(0)
    }

    /// Handles plus reservations across all channels.
    pub fn total_outstanding(&self) -> usize {
        self.occupied_total.load(Ordering::SeqCst)
    }

    /// Channels that have at least one PENDING handle.
    pub fn channels_with_pending(&self) -> Vec<ChannelId> {
        self.channels
            .read()
            .iter()
            .filter(|(_, set)| {
                set.lock()
                    .handles
                    .values()
                    .any(|handle| handle.state == HandleState::Pending)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Wait until some slot is freed.
    pub async fn capacity_freed(&self) {
        self.capacity_freed.notified().await;
    }
}

/// A slot held for one send on one channel.
#[must_use = "dropping a reservation releases its slot"]
pub struct SlotReservation<'a> {
    tracker: &'a AckTracker,
    channel: ChannelId,
    held: bool,
}

impl SlotReservation<'_> {
    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Turn the reservation into a PENDING handle.
    pub fn register(mut self, handle: DeliveryHandle) -> IngestResult<()> {
        self.held = false;
        self.tracker.register_pending(handle)
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.held {
            self.tracker.release_slot(&self.channel);
        }
    }
}
