//! Channel registry: allocation, reuse and retirement of channel identities.
//!
//! Ack ids are only unique within a channel, so a channel belongs to exactly
//! one logical sender. A registry hands out at most one active channel at a
//! time and replaces it when it goes idle or the service stops recognizing it.

use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque, globally unique channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// Generate a fresh random channel id.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ChannelId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// In use for new sends.
    Active,
    /// Retired locally after idling with nothing pending.
    Retired,
    /// Rejected by the service; its handles expired.
    Invalidated,
}

/// Snapshot of a channel.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub created_at: Instant,
    pub last_activity_at: Instant,
    pub state: ChannelState,
}

impl Channel {
    fn new(now: Instant) -> Self {
        Self {
            id: ChannelId::new_random(),
            created_at: now,
            last_activity_at: now,
            state: ChannelState::Active,
        }
    }

    /// Whether the channel accepts new sends.
    pub fn is_active(&self) -> bool {
        self.state == ChannelState::Active
    }
}

/// Owner of the single active channel of one logical sender.
///
/// A retired or invalidated channel stays recorded, in its final state,
/// until the next [`acquire_channel`](Self::acquire_channel) replaces it.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    current: Mutex<Option<Channel>>,
}

impl ChannelRegistry {
    /// Create an empty registry. The first channel is allocated lazily.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the active channel, allocating a fresh one if needed.
    pub fn acquire_channel(&self) -> Channel {
        let mut current = self.current.lock();
        match current.as_ref() {
            Some(channel) if channel.is_active() => channel.clone(),
            _ => {
                let channel = Channel::new(Instant::now());
                info!(channel = %channel.id, "Allocated ingestion channel");
                *current = Some(channel.clone());
                channel
            }
        }
    }

    /// Snapshot of the active channel, if any.
    pub fn current(&self) -> Option<Channel> {
        self.current
            .lock()
            .as_ref()
            .filter(|channel| channel.is_active())
            .cloned()
    }

    /// Snapshot of the latest channel in whatever state it is in.
    pub fn latest(&self) -> Option<Channel> {
        self.current.lock().clone()
    }

    /// Record send or poll activity on a channel.
    ///
    /// Activity on a channel that is no longer current is ignored.
    pub fn mark_activity(&self, channel_id: &ChannelId, now: Instant) {
        let mut current = self.current.lock();
        if let Some(channel) = current.as_mut() {
            if channel.id == *channel_id && channel.is_active() {
                channel.last_activity_at = channel.last_activity_at.max(now);
            }
        }
    }

    /// Retire the active channel if it has been idle longer than
    /// `idle_threshold` and has no pending handles.
    pub fn retire_if_idle(&self, now: Instant, idle_threshold: Duration, pending: usize) -> bool {
        let mut current = self.current.lock();
        let Some(channel) = current.as_mut() else {
            return false;
        };
        if !channel.is_active() || pending > 0 {
            return false;
        }

        let idle_for = now.saturating_duration_since(channel.last_activity_at);
        if idle_for <= idle_threshold {
            return false;
        }

        channel.state = ChannelState::Retired;
        info!(
            channel = %channel.id,
            idle_secs = idle_for.as_secs(),
            "Retired idle ingestion channel"
        );
        true
    }

    /// Discard a channel the service reported as invalid.
    ///
    /// Returns whether it was the active channel. The next
    /// [`acquire_channel`](Self::acquire_channel) allocates a replacement.
    pub fn invalidate(&self, channel_id: &ChannelId) -> bool {
        let mut current = self.current.lock();
        match current.as_mut() {
            Some(channel) if channel.id == *channel_id && channel.is_active() => {
                channel.state = ChannelState::Invalidated;
                warn!(channel = %channel_id, "Ingestion channel invalidated by service");
                true
            }
            _ => {
                debug!(channel = %channel_id, "Invalidation for non-current channel ignored");
                false
            }
        }
    }
}
