//! Client facade: `submit`, `status` and `shutdown` over the delivery machinery.
//!
//! One client is one logical sender with one active channel. A background
//! driver task runs on `poll_interval` and, per tick:
//!
//! 1. polls every channel that has PENDING handles and confirms deliveries,
//! 2. sweeps handles older than `per_handle_timeout` into EXPIRED,
//! 3. dispatches resends for expired handles and lost sends,
//! 4. retires the active channel once it idles with nothing pending.
//!
//! Resends run as tasks owned by the driver so shutdown can abort them.

use crate::channel::{Channel, ChannelId, ChannelRegistry};
use crate::config::{BackpressureMode, ClientConfig};
use crate::error::{IngestError, IngestResult};
use crate::poller::AckPoller;
use crate::protocol::{AckId, DeliveryId, EventPayload, IdempotencyMarker};
use crate::resend::{ResendDecision, ResendPolicy, ResendReason, ResendRequest};
use crate::sender::EventSender;
use crate::tracker::{AckTracker, DeliveryHandle, TrackerLimits};
use crate::transport::{HttpTransport, IngestTransport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Terminal status of a submitted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Indexed durably; `attempts` sends were needed.
    Confirmed { attempts: u32 },
    /// Gave up after `attempts` sends.
    Failed { attempts: u32, reason: String },
    /// Credentials were rejected; nothing further was attempted.
    FatalAuth { message: String },
    /// Still unconfirmed when the client shut down.
    Unconfirmed { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Caller's reference to a submitted payload.
#[derive(Debug)]
pub struct DeliveryTicket {
    delivery_id: DeliveryId,
    receiver: oneshot::Receiver<DeliveryOutcome>,
    resolved: Option<DeliveryOutcome>,
}

impl DeliveryTicket {
    pub fn delivery_id(&self) -> DeliveryId {
        self.delivery_id
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(mut self) -> DeliveryOutcome {
        self.wait().await
    }

    /// Wait for the terminal outcome without consuming the ticket.
    ///
    /// Once resolved, later calls return the same outcome immediately.
    pub async fn wait(&mut self) -> DeliveryOutcome {
        if let Some(outcome) = &self.resolved {
            return outcome.clone();
        }
        let outcome = (&mut self.receiver)
            .await
            .unwrap_or(DeliveryOutcome::Unconfirmed { attempts: 0 });
        self.resolved = Some(outcome.clone());
        outcome
    }
}

/// A delivery left unconfirmed at shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconfirmedDelivery {
    pub delivery_id: DeliveryId,
    pub attempts: u32,
    /// The last handle issued for it, if any.
    pub handle: Option<(ChannelId, AckId)>,
}

/// Final state reported by [`IngestClient::shutdown`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// Deliveries confirmed by the final flush poll.
    pub confirmed_on_flush: usize,
    pub unconfirmed: Vec<UnconfirmedDelivery>,
}

/// Point-in-time view of the client.
#[derive(Debug, Clone)]
pub struct ClientStatus {
    pub active_channel: Option<ChannelId>,
    /// Latest channel, still shown once retired or invalidated until a send
    /// allocates its replacement.
    pub channel: Option<Channel>,
    /// Handles plus in-flight reservations.
    pub outstanding_handles: usize,
    /// Submitted payloads without a terminal outcome.
    pub outstanding_deliveries: usize,
}

/// Client-side record of one submitted payload.
struct Delivery {
    payload: EventPayload,
    first_submitted_at: DateTime<Utc>,
    /// Sends issued so far.
    attempts: u32,
    /// The live handle, if the last send produced one.
    current: Option<(ChannelId, AckId)>,
    completion: oneshot::Sender<DeliveryOutcome>,
}

struct ClientInner {
    config: ClientConfig,
    registry: Arc<ChannelRegistry>,
    tracker: Arc<AckTracker>,
    sender: EventSender,
    poller: AckPoller,
    policy: ResendPolicy,
    /// Unresolved deliveries, capped at `max_pending_total`.
    deliveries: Mutex<HashMap<DeliveryId, Delivery>>,
    delivery_resolved: Notify,
    resend_tx: mpsc::UnboundedSender<ResendRequest>,
    fatal: Mutex<Option<String>>,
    shutting_down: AtomicBool,
}

struct DriverHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<ShutdownReport>,
}

/// Reliable ingestion client with acknowledgment tracking.
pub struct IngestClient {
    inner: Arc<ClientInner>,
    driver: Mutex<Option<DriverHandle>>,
}

impl IngestClient {
    /// Create a client talking HTTP to the configured endpoint.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: ClientConfig) -> IngestResult<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config.endpoint)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a client over an arbitrary transport.
    ///
    /// Must be called within a Tokio runtime.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn IngestTransport>) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let tracker = Arc::new(AckTracker::new(TrackerLimits {
            max_pending_per_channel: config.max_pending_per_channel,
            max_pending_total: config.max_pending_total,
        }));
        let sender = EventSender::new(
            transport.clone(),
            registry.clone(),
            tracker.clone(),
            config.send_retry.clone(),
        );
        let poller = AckPoller::new(transport, registry.clone(), tracker.clone());
        let (resend_tx, resend_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ClientInner {
            policy: ResendPolicy::new(config.max_attempts),
            config,
            registry,
            tracker,
            sender,
            poller,
            deliveries: Mutex::new(HashMap::new()),
            delivery_resolved: Notify::new(),
            resend_tx,
            fatal: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_driver(inner.clone(), resend_rx, shutdown_rx));

        info!(
            poll_interval_ms = inner.config.poll_interval.as_millis() as u64,
            ack_timeout_secs = inner.config.per_handle_timeout.as_secs(),
            max_attempts = inner.policy.max_attempts(),
            "Ingestion client started"
        );

        Self {
            inner,
            driver: Mutex::new(Some(DriverHandle { shutdown_tx, task })),
        }
    }

    /// Submit a payload for at-least-once delivery.
    ///
    /// The first send happens before this returns. Credential rejection is
    /// returned here; so is a full pending set in
    /// [`BackpressureMode::Reject`]. Everything else resolves through the
    /// ticket.
    ///
    /// Unresolved deliveries, including ones waiting for a resend, count
    /// against `max_pending_total`. Dropping the returned future before it
    /// completes abandons the payload and frees everything it held.
    pub async fn submit(&self, payload: EventPayload) -> IngestResult<DeliveryTicket> {
        self.inner.check_accepting()?;

        let delivery_id = DeliveryId::new_random();
        let (completion, receiver) = oneshot::channel();
        let delivery = Delivery {
            payload,
            first_submitted_at: Utc::now(),
            attempts: 0,
            current: None,
            completion,
        };

        let wait = self.inner.config.backpressure == BackpressureMode::Wait;
        self.inner.admit(delivery_id, delivery, wait).await?;

        let mut admitted = Admitted {
            inner: &*self.inner,
            delivery_id,
            armed: true,
        };
        self.inner.dispatch(delivery_id, None, wait).await?;
        admitted.armed = false;

        Ok(DeliveryTicket {
            delivery_id,
            receiver,
            resolved: None,
        })
    }

    /// Current channel and outstanding counts.
    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            active_channel: self.inner.registry.current().map(|channel| channel.id),
            channel: self.inner.registry.latest(),
            outstanding_handles: self.inner.tracker.total_outstanding(),
            outstanding_deliveries: self.inner.deliveries.lock().len(),
        }
    }

    /// Stop the driver, abort in-flight resends, make one final poll and
    /// report what is still unconfirmed.
    ///
    /// Tickets of unconfirmed deliveries resolve to
    /// [`DeliveryOutcome::Unconfirmed`]. Calling this twice returns an empty
    /// report the second time.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        let Some(driver) = self.driver.lock().take() else {
            return ShutdownReport::default();
        };
        let _ = driver.shutdown_tx.send(());

        match driver.task.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Ingestion driver task failed");
                self.inner.report_unconfirmed(0)
            }
        }
    }
}

impl Drop for IngestClient {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.task.abort();
        }
    }
}

/// Abandons an admitted delivery unless its first dispatch completes.
struct Admitted<'a> {
    inner: &'a ClientInner,
    delivery_id: DeliveryId,
    armed: bool,
}

impl Drop for Admitted<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.abandon(self.delivery_id);
        }
    }
}

impl ClientInner {
    fn check_accepting(&self) -> IngestResult<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(IngestError::Shutdown);
        }
        if let Some(message) = self.fatal.lock().clone() {
            return Err(IngestError::Auth {
                status: 401,
                message,
            });
        }
        Ok(())
    }

    /// Record a new delivery once the table has room for it.
    async fn admit(
        &self,
        delivery_id: DeliveryId,
        delivery: Delivery,
        wait_for_capacity: bool,
    ) -> IngestResult<()> {
        let limit = self.config.max_pending_total;
        let mut delivery = Some(delivery);

        loop {
            let resolved = self.delivery_resolved.notified();
            tokio::pin!(resolved);
            resolved.as_mut().enable();

            let outstanding = {
                let mut deliveries = self.deliveries.lock();
                if deliveries.len() < limit {
                    if let Some(delivery) = delivery.take() {
                        deliveries.insert(delivery_id, delivery);
                    }
                    return Ok(());
                }
                deliveries.len()
            };

            if !wait_for_capacity {
                return Err(IngestError::Capacity { outstanding, limit });
            }
            debug!(
                outstanding = outstanding,
                limit = limit,
                "Delivery table full, waiting for deliveries to resolve"
            );
            self.poller.nudge();
            tokio::select! {
                _ = resolved => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            self.check_accepting()?;
        }
    }

    /// Drop a delivery whose submission was cancelled or refused.
    fn abandon(&self, delivery_id: DeliveryId) {
        if let Some(delivery) = self.deliveries.lock().remove(&delivery_id) {
            if let Some((channel, ack_id)) = delivery.current {
                self.tracker.forget(&channel, ack_id);
            }
            debug!(delivery_id = %delivery_id, "Submission abandoned");
            self.delivery_resolved.notify_waiters();
        }
    }

    /// Send (or resend) a delivery on the active channel.
    ///
    /// On success the delivery points at its new handle and the superseded
    /// one is dropped. Errors returned here are the ones the caller must act
    /// on: auth, capacity when not waiting, and shutdown. Lost sends are
    /// queued for resend and report `Ok`.
    async fn dispatch(
        self: &Arc<Self>,
        delivery_id: DeliveryId,
        mut superseded: Option<(ChannelId, AckId)>,
        wait_for_capacity: bool,
    ) -> IngestResult<()> {
        let prepared = self.deliveries.lock().get_mut(&delivery_id).map(|delivery| {
            delivery.attempts += 1;
            delivery.current = None;
            let marker = IdempotencyMarker {
                delivery_id,
                attempt: delivery.attempts,
                first_submitted_at: delivery.first_submitted_at,
            };
            (delivery.payload.to_wire(&marker), delivery.attempts)
        });
        let Some((wire, attempt)) = prepared else {
            self.drop_superseded(superseded);
            return Ok(());
        };

        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                self.drop_superseded(superseded);
                return Err(IngestError::Shutdown);
            }

            let channel = self.registry.acquire_channel();
            match self.sender.send(&channel, delivery_id, &wire, attempt).await {
                Ok(handle) => {
                    self.attach_handle(&handle);
                    self.drop_superseded(superseded);
                    return Ok(());
                }
                Err(IngestError::Capacity { outstanding, limit }) => {
                    if !wait_for_capacity {
                        self.drop_superseded(superseded);
                        return Err(IngestError::Capacity { outstanding, limit });
                    }
                    if superseded.is_some() {
                        // Our own expired handle holds a slot; give it up.
                        self.drop_superseded(superseded.take());
                        continue;
                    }
                    debug!(
                        delivery_id = %delivery_id,
                        outstanding = outstanding,
                        limit = limit,
                        "Pending set full, waiting for acknowledgments"
                    );
                    self.poller.nudge();
                    tokio::select! {
                        _ = self.tracker.capacity_freed() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(IngestError::Auth { status, message }) => {
                    self.drop_superseded(superseded);
                    self.fail_all_fatal(&message);
                    return Err(IngestError::Auth { status, message });
                }
                Err(IngestError::ChannelInvalid { channel, .. }) => {
                    self.invalidate_channel(&channel);
                    self.drop_superseded(superseded);
                    self.queue_lost_send(delivery_id);
                    return Ok(());
                }
                Err(IngestError::Rejected { status, message }) => {
                    self.drop_superseded(superseded);
                    self.complete(
                        delivery_id,
                        DeliveryOutcome::Failed {
                            attempts: attempt,
                            reason: format!("rejected with HTTP {}: {}", status, message),
                        },
                    );
                    return Ok(());
                }
                Err(e) => {
                    debug!(delivery_id = %delivery_id, error = %e, "Send lost, queueing resend");
                    self.drop_superseded(superseded);
                    self.queue_lost_send(delivery_id);
                    return Ok(());
                }
            }
        }
    }

    /// Point a delivery at its freshly registered handle.
    fn attach_handle(&self, handle: &DeliveryHandle) {
        let attached = match self.deliveries.lock().get_mut(&handle.delivery_id) {
            Some(delivery) => {
                delivery.current = Some((handle.channel_id, handle.ack_id));
                true
            }
            None => false,
        };
        if !attached {
            // Resolved while the send was in flight.
            self.tracker.forget(&handle.channel_id, handle.ack_id);
        }
    }

    fn drop_superseded(&self, superseded: Option<(ChannelId, AckId)>) {
        if let Some((channel, ack_id)) = superseded {
            self.tracker.forget(&channel, ack_id);
        }
    }

    fn queue_lost_send(&self, delivery_id: DeliveryId) {
        let request = ResendRequest {
            delivery_id,
            superseded: None,
            reason: ResendReason::LostSend,
        };
        if self.resend_tx.send(request).is_err() {
            debug!(delivery_id = %delivery_id, "Driver gone, lost send left unconfirmed");
        }
    }

    /// Act on a resend request from the driver.
    async fn resend(self: Arc<Self>, request: ResendRequest) {
        let decision = {
            let deliveries = self.deliveries.lock();
            match deliveries.get(&request.delivery_id) {
                Some(delivery) if ResendPolicy::is_current(&request, delivery.current) => {
                    Some(self.policy.decide(delivery.attempts))
                }
                _ => None,
            }
        };

        match decision {
            None => {
                debug!(delivery_id = %request.delivery_id, "Stale resend request dropped");
                self.drop_superseded(request.superseded);
            }
            Some(ResendDecision::GiveUp { attempts }) => {
                warn!(
                    delivery_id = %request.delivery_id,
                    attempts = attempts,
                    reason = ?request.reason,
                    "Delivery failed after exhausting attempts"
                );
                self.drop_superseded(request.superseded);
                self.complete(
                    request.delivery_id,
                    DeliveryOutcome::Failed {
                        attempts,
                        reason: format!("no acknowledgment after {} attempts", attempts),
                    },
                );
            }
            Some(ResendDecision::Resend { attempt }) => {
                info!(
                    delivery_id = %request.delivery_id,
                    attempt = attempt,
                    reason = ?request.reason,
                    "Resending delivery"
                );
                if let Err(e) = self.dispatch(request.delivery_id, request.superseded, true).await {
                    debug!(delivery_id = %request.delivery_id, error = %e, "Resend stopped");
                }
            }
        }
    }

    /// Confirm deliveries whose *current* handle was acknowledged.
    fn confirm(&self, acked: Vec<DeliveryHandle>) {
        for handle in acked {
            let delivery = {
                let mut deliveries = self.deliveries.lock();
                // A handle acked before `attach_handle` ran still belongs to
                // the latest attempt.
                let is_current = deliveries
                    .get(&handle.delivery_id)
                    .map(|d| match d.current {
                        Some(current) => current == (handle.channel_id, handle.ack_id),
                        None => handle.attempt == d.attempts,
                    })
                    .unwrap_or(false);
                if is_current {
                    deliveries.remove(&handle.delivery_id)
                } else {
                    None
                }
            };

            match delivery {
                Some(delivery) => {
                    debug!(
                        delivery_id = %handle.delivery_id,
                        channel = %handle.channel_id,
                        ack_id = %handle.ack_id,
                        attempts = delivery.attempts,
                        "Delivery confirmed"
                    );
                    let _ = delivery.completion.send(DeliveryOutcome::Confirmed {
                        attempts: delivery.attempts,
                    });
                    self.delivery_resolved.notify_waiters();
                }
                None => debug!(
                    delivery_id = %handle.delivery_id,
                    ack_id = %handle.ack_id,
                    "Ack for superseded handle ignored"
                ),
            }
        }
    }

    fn complete(&self, delivery_id: DeliveryId, outcome: DeliveryOutcome) {
        if let Some(delivery) = self.deliveries.lock().remove(&delivery_id) {
            if let Some((channel, ack_id)) = delivery.current {
                self.tracker.forget(&channel, ack_id);
            }
            let _ = delivery.completion.send(outcome);
            self.delivery_resolved.notify_waiters();
        }
    }

    /// Replace an invalidated channel and queue its handles for resend.
    fn invalidate_channel(&self, channel: &ChannelId) {
        self.registry.invalidate(channel);
        self.poller.forget_channel(channel);

        let expired = self.tracker.expire_channel(channel);
        if !expired.is_empty() {
            warn!(
                channel = %channel,
                handles = expired.len(),
                "Expiring handles of invalidated channel"
            );
        }
        for handle in expired {
            let _ = self.resend_tx.send(ResendRequest {
                delivery_id: handle.delivery_id,
                superseded: Some((handle.channel_id, handle.ack_id)),
                reason: ResendReason::ChannelInvalidated,
            });
        }
        self.tracker.drop_if_empty(channel);
    }

    /// Credentials were rejected: resolve everything as fatal.
    fn fail_all_fatal(&self, message: &str) {
        error!(error = %message, "Credentials rejected, failing all outstanding deliveries");
        *self.fatal.lock() = Some(message.to_string());

        let drained: Vec<(DeliveryId, Delivery)> = self.deliveries.lock().drain().collect();
        for (_, delivery) in drained {
            if let Some((channel, ack_id)) = delivery.current {
                self.tracker.forget(&channel, ack_id);
            }
            let _ = delivery.completion.send(DeliveryOutcome::FatalAuth {
                message: message.to_string(),
            });
        }
        self.delivery_resolved.notify_waiters();
    }

    fn is_fatal(&self) -> bool {
        self.fatal.lock().is_some()
    }

    /// Poll every channel with pending handles, one at a time.
    async fn poll_all(&self) -> usize {
        let mut confirmed = 0;
        for channel in self.tracker.channels_with_pending() {
            match self.poller.poll_once(&channel).await {
                Ok(outcome) => {
                    confirmed += outcome.acked.len();
                    self.confirm(outcome.acked);
                }
                Err(IngestError::Auth { message, .. }) => {
                    self.fail_all_fatal(&message);
                    break;
                }
                Err(IngestError::ChannelInvalid { channel, .. }) => {
                    self.invalidate_channel(&channel);
                }
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Ack poll failed, retrying next interval");
                }
            }
        }
        confirmed
    }

    /// Expire overdue handles and queue their resends.
    fn sweep(&self) {
        let expired = self
            .tracker
            .sweep_expired(Instant::now(), self.config.per_handle_timeout);
        for handle in expired {
            let _ = self.resend_tx.send(ResendRequest {
                delivery_id: handle.delivery_id,
                superseded: Some((handle.channel_id, handle.ack_id)),
                reason: ResendReason::Expired,
            });
        }
    }

    fn retire_idle_channel(&self) {
        let Some(channel) = self.registry.current() else {
            return;
        };
        let pending = self.tracker.pending_count(&channel.id);
        if self
            .registry
            .retire_if_idle(Instant::now(), self.config.channel_idle_threshold, pending)
        {
            self.poller.forget_channel(&channel.id);
            self.tracker.drop_if_empty(&channel.id);
        }
    }

    /// Resolve every remaining delivery as unconfirmed.
    fn report_unconfirmed(&self, confirmed_on_flush: usize) -> ShutdownReport {
        let drained: Vec<(DeliveryId, Delivery)> = self.deliveries.lock().drain().collect();
        let mut unconfirmed = Vec::with_capacity(drained.len());
        for (delivery_id, delivery) in drained {
            let _ = delivery.completion.send(DeliveryOutcome::Unconfirmed {
                attempts: delivery.attempts,
            });
            unconfirmed.push(UnconfirmedDelivery {
                delivery_id,
                attempts: delivery.attempts,
                handle: delivery.current,
            });
        }
        self.delivery_resolved.notify_waiters();
        ShutdownReport {
            confirmed_on_flush,
            unconfirmed,
        }
    }
}

async fn run_driver(
    inner: Arc<ClientInner>,
    mut resend_rx: mpsc::UnboundedReceiver<ResendRequest>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> ShutdownReport {
    let mut ticker = interval(inner.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing can be pending yet.
    ticker.tick().await;

    let mut resends: JoinSet<()> = JoinSet::new();
    let mut deferred: Vec<ResendRequest> = Vec::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            Some(request) = resend_rx.recv() => {
                if request.reason == ResendReason::LostSend {
                    // Wait a tick so a failing endpoint is not hammered.
                    deferred.push(request);
                } else {
                    resends.spawn(inner.clone().resend(request));
                }
            }
            _ = ticker.tick() => {
                if inner.is_fatal() {
                    continue;
                }
                tokio::select! {
                    _ = inner.poll_all() => {}
                    _ = &mut shutdown_rx => break,
                }
                inner.sweep();
                for request in deferred.drain(..) {
                    resends.spawn(inner.clone().resend(request));
                }
                inner.retire_idle_channel();
            }
            _ = inner.poller.nudged() => {
                if !inner.is_fatal() {
                    tokio::select! {
                        _ = inner.poll_all() => {}
                        _ = &mut shutdown_rx => break,
                    }
                }
            }
            Some(joined) = resends.join_next(), if !resends.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(error = %e, "Resend task panicked");
                    }
                }
            }
        }
    }

    info!(in_flight_resends = resends.len(), "Ingestion client shutting down");
    resends.shutdown().await;

    let confirmed_on_flush = if inner.is_fatal() {
        0
    } else {
        inner.poll_all().await
    };
    let report = inner.report_unconfirmed(confirmed_on_flush);

    info!(
        confirmed_on_flush = report.confirmed_on_flush,
        unconfirmed = report.unconfirmed.len(),
        "Ingestion client stopped"
    );
    report
}
