// ── Connection manager ──
//
// Owns the persistent channel to the remote: one supervisor task per connect
// cycle performs the handshake, pumps frames in both directions, and
// schedules reconnection with exponential backoff. Everything the rest of
// the crate observes (lifecycle events, telemetry, command responses) flows
// out of this module through the event bus.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, trace, warn};

use fleetsync_api::{
    Channel, CommandResponse, Connector, EventCategory, InboundMessage, OutboundMessage,
};

use crate::bus::{Event, EventBus, Subscription};
use crate::config::{ReconnectPolicy, SyncConfig};
use crate::pending::PendingRegistry;
use crate::queue::OutboundQueue;
use crate::store::{TelemetryPoint, TelemetryStore};

const FRAME_PREVIEW_LEN: usize = 120;

// ── State ────────────────────────────────────────────────────────────

/// Lifecycle of the persistent channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Progress of the current reconnection sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    /// Reconnection attempts scheduled since the channel was last open.
    pub attempt_count: u32,
    /// Delay before the next scheduled attempt, if one is pending.
    pub next_delay: Option<Duration>,
}

/// Delay before reconnection attempt `attempt` (zero-based):
/// `min(base_delay * 2^attempt, max_delay)`.
pub fn backoff_delay(policy: &ReconnectPolicy, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| policy.base_delay.checked_mul(factor))
        .map_or(policy.max_delay, |delay| delay.min(policy.max_delay))
}

// ── ConnectionManager ────────────────────────────────────────────────

/// Handle to one persistent channel. Cheaply cloneable.
///
/// Methods that may start the supervisor ([`connect`](Self::connect) and
/// [`send`](Self::send) from `Idle`) must be called inside a tokio runtime.
///
/// The supervisor only holds the shared state, not a handle: dropping the
/// last handle cancels it and closes the channel.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
    _shutdown: Arc<DropGuard>,
}

struct Inner {
    config: SyncConfig,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    bus: Arc<EventBus>,
    pending: Arc<PendingRegistry>,
    telemetry: Arc<TelemetryStore>,
    outbound: Mutex<Outbound>,
    reconnect: Mutex<ReconnectState>,
    /// Parent token; each connect cycle runs under a child of it.
    cancel: CancellationToken,
    cancel_child: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
    _internal: Vec<Subscription>,
}

struct Outbound {
    queue: OutboundQueue,
    /// Present only while a session is pumping frames.
    writer: Option<mpsc::UnboundedSender<OutboundMessage>>,
}

impl ConnectionManager {
    /// Build a manager in the `Idle` state. Nothing happens on the network
    /// until [`connect`](Self::connect) or [`send`](Self::send).
    pub fn new(config: SyncConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let bus = EventBus::new();
        let pending = PendingRegistry::new();
        let telemetry = Arc::new(TelemetryStore::new(config.telemetry_capacity));

        // Registered before any consumer handler so the stores are current
        // by the time user callbacks run.
        let internal = vec![
            bus.subscribe(EventCategory::Telemetry, {
                let telemetry = Arc::clone(&telemetry);
                move |event: &Event| match TelemetryPoint::from_event(event) {
                    Some(point) => telemetry.append(point),
                    None => debug!("telemetry event without entity id ignored"),
                }
            }),
            bus.subscribe(EventCategory::CommandResponse, {
                let pending = Arc::clone(&pending);
                move |event: &Event| match CommandResponse::from_value(&event.data) {
                    Ok(response) => {
                        pending.resolve(&response);
                    }
                    Err(e) => warn!(error = %e, "unreadable command response"),
                }
            }),
        ];

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let queue = OutboundQueue::new(config.queue_capacity);
        let shutdown = Arc::new(cancel.clone().drop_guard());

        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                state,
                bus,
                pending,
                telemetry,
                outbound: Mutex::new(Outbound {
                    queue,
                    writer: None,
                }),
                reconnect: Mutex::new(ReconnectState::default()),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task: Mutex::new(None),
                _internal: internal,
            }),
            _shutdown: shutdown,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start (or restart) the supervisor. No-op while a supervisor is
    /// already running. Resets the reconnection counter. Safe to call from a
    /// `reconnect_failed` handler.
    pub fn connect(&self) {
        let mut task = lock(&self.inner.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            trace!("connect ignored, supervisor already running");
            return;
        }

        *lock(&self.inner.reconnect) = ReconnectState::default();
        let child = self.inner.cancel.child_token();
        *lock(&self.inner.cancel_child) = child.clone();
        self.inner.state.send_replace(ConnectionState::Connecting);

        *task = Some(tokio::spawn(supervise(Arc::clone(&self.inner), child)));
    }

    /// Stop the supervisor and close the channel. No reconnection is
    /// scheduled; outstanding commands fail with `TransportUnavailable`.
    /// Queued messages stay queued for a later [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        lock(&self.inner.cancel_child).cancel();

        let handle = lock(&self.inner.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "supervisor task ended abnormally");
            }
        }

        self.inner.close("disconnect requested");
        lock(&self.inner.reconnect).next_delay = None;
        debug!("disconnected");
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Write `msg` now if the channel is open, otherwise queue it for the
    /// next open. From `Idle` this also starts connecting.
    pub fn send(&self, msg: OutboundMessage) {
        let start = {
            let mut outbound = lock(&self.inner.outbound);
            let msg = match &outbound.writer {
                Some(writer) => match writer.send(msg) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(msg)) => msg,
                },
                None => msg,
            };
            outbound.enqueue(msg);
            *self.inner.state.borrow() == ConnectionState::Idle
        };

        if start {
            self.connect();
        }
    }

    /// Write `msg` if the channel is open; otherwise hand it back untouched.
    /// Never queues.
    pub fn try_send(&self, msg: OutboundMessage) -> Result<(), OutboundMessage> {
        let outbound = lock(&self.inner.outbound);
        match &outbound.writer {
            Some(writer) => writer.send(msg).map_err(|mpsc::error::SendError(msg)| msg),
            None => Err(msg),
        }
    }

    /// Messages waiting for the channel to open.
    pub fn queued_len(&self) -> usize {
        lock(&self.inner.outbound).queue.len()
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        *lock(&self.inner.reconnect)
    }

    /// Register a handler on the manager's event bus.
    pub fn subscribe<F>(&self, category: EventCategory, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(category, handler)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn pending(&self) -> &Arc<PendingRegistry> {
        &self.inner.pending
    }

    pub fn telemetry(&self) -> &Arc<TelemetryStore> {
        &self.inner.telemetry
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.config.url.as_str())
            .field("state", &self.state())
            .field("queued", &self.queued_len())
            .finish_non_exhaustive()
    }
}

impl Outbound {
    fn enqueue(&mut self, msg: OutboundMessage) {
        if let Some(dropped) = self.queue.push(msg) {
            warn!(
                message_type = %dropped.message_type,
                "outbound queue full, dropped oldest message"
            );
        }
    }
}

// ── Inner transitions ────────────────────────────────────────────────

impl Inner {
    fn publish(&self, category: EventCategory, data: serde_json::Value) {
        self.bus.publish(&Event::new(category, data));
    }

    /// Connecting → Open: flush the queue into the session writer and
    /// install it before the state flips, all under the outbound lock, so
    /// FIFO order holds against concurrent `send` calls and `Open` always
    /// means `try_send` can write.
    fn open(&self, writer: mpsc::UnboundedSender<OutboundMessage>) {
        *lock(&self.reconnect) = ReconnectState::default();

        let mut outbound = lock(&self.outbound);
        let backlog = outbound.queue.drain();
        let flushed = backlog.len();
        for msg in backlog {
            // The session holds the receiver for as long as the writer exists.
            let _ = writer.send(msg);
        }
        outbound.writer = Some(writer);
        self.state.send_replace(ConnectionState::Open);
        drop(outbound);

        info!(url = %self.config.url, "channel open");
        if flushed > 0 {
            debug!(flushed, "flushed outbound queue");
        }
        self.publish(
            EventCategory::Connected,
            json!({ "url": self.config.url.as_str() }),
        );
    }

    /// Any → Closed. Announces `disconnected` only when leaving Connecting
    /// or Open, and fails every outstanding command.
    fn close(&self, reason: &str) {
        let previous = self.state.send_replace(ConnectionState::Closed);
        if matches!(
            previous,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            info!(reason, "channel closed");
            self.publish(EventCategory::Disconnected, json!({ "reason": reason }));
        }

        self.pending
            .reject_all(&format!("channel closed: {reason}"));
    }

    /// Take the writer away from `send` and put anything it never wrote back
    /// at the front of the queue. Commands awaiting a response are dropped:
    /// their callers are failed by `close`.
    fn retire_writer(
        &self,
        mut unsent: Vec<OutboundMessage>,
        out_rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
    ) {
        let mut outbound = lock(&self.outbound);
        outbound.writer = None;
        while let Ok(msg) = out_rx.try_recv() {
            unsent.push(msg);
        }
        unsent.retain(|msg| !msg.awaits_response());
        if unsent.is_empty() {
            return;
        }

        let requeued = unsent.len();
        let dropped = outbound.queue.requeue_front(unsent);
        drop(outbound);
        debug!(requeued, dropped = dropped.len(), "requeued unsent messages");
    }

    /// Decide whether to try again. Returns the delay to wait, or `None`
    /// after announcing give-up.
    fn schedule_retry(&self) -> Option<Duration> {
        let policy = &self.config.reconnect;
        let scheduled = {
            let mut reconnect = lock(&self.reconnect);
            if reconnect.attempt_count >= policy.max_attempts {
                reconnect.next_delay = None;
                None
            } else {
                let delay = backoff_delay(policy, reconnect.attempt_count);
                reconnect.attempt_count += 1;
                reconnect.next_delay = Some(delay);
                Some((reconnect.attempt_count, delay))
            }
        };

        let Some((attempt, delay)) = scheduled else {
            // Release the slot first so a handler may `connect()` again.
            drop(lock(&self.task).take());
            error!(
                url = %self.config.url,
                max_attempts = policy.max_attempts,
                "reconnection limit reached, giving up"
            );
            self.publish(
                EventCategory::ReconnectFailed,
                json!({ "attempts": policy.max_attempts }),
            );
            return None;
        };

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        info!(attempt, delay_ms, "scheduling reconnect");
        self.publish(
            EventCategory::Reconnecting,
            json!({ "attempt": attempt, "delay_ms": delay_ms }),
        );
        Some(delay)
    }

    fn dispatch_inbound(&self, text: &str) {
        match InboundMessage::parse(text) {
            Ok(msg) => {
                let event = Event::from(msg);
                let delivered = self.bus.publish(&event);
                trace!(category = %event.category, delivered, "inbound event");
            }
            Err(e) => {
                warn!(error = %e, frame = preview(text), "dropping malformed frame");
            }
        }
    }
}

// ── Supervisor ───────────────────────────────────────────────────────

/// Connect → pump → on close, back off → reconnect, until cancelled or the
/// attempt budget is spent.
async fn supervise(inner: Arc<Inner>, cancel: CancellationToken) {
    loop {
        inner.state.send_replace(ConnectionState::Connecting);
        info!(url = %inner.config.url, "connecting");

        let handshake = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = tokio::time::timeout(
                inner.config.connect_timeout,
                inner.connector.connect(&inner.config.url),
            ) => result,
        };

        match handshake {
            Ok(Ok(channel)) => {
                let reason = run_session(&inner, channel, &cancel).await;
                inner.close(&reason);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "handshake failed");
                inner.close(&e.to_string());
            }
            Err(_) => {
                warn!(timeout = ?inner.config.connect_timeout, "handshake timed out");
                inner.close("handshake timed out");
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        let Some(delay) = inner.schedule_retry() else {
            break;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!("supervisor exiting");
}

/// Pump one open channel until it fails, the remote closes it, or the cycle
/// is cancelled. Returns the close reason.
async fn run_session(inner: &Inner, channel: Channel, cancel: &CancellationToken) -> String {
    let Channel {
        mut sink,
        mut stream,
    } = channel;
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    inner.open(out_tx);

    let mut keepalive = inner.config.keepalive_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let mut unsent = Vec::new();
    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "close handshake failed");
                }
                break "disconnect requested".to_string();
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => inner.dispatch_inbound(&text),
                Some(Err(e)) => {
                    warn!(error = %e, "channel failed");
                    break e.to_string();
                }
                None => {
                    info!("channel closed by remote");
                    break "closed by remote".to_string();
                }
            },
            Some(msg) = out_rx.recv() => {
                let frame = match msg.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, message_type = %msg.message_type, "dropping unserializable message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(frame).await {
                    warn!(error = %e, "write failed");
                    unsent.push(msg);
                    break e.to_string();
                }
                trace!(message_type = %msg.message_type, "frame written");
            }
            () = next_tick(keepalive.as_mut()) => {
                let ping = OutboundMessage::ping();
                let frame = match ping.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "keepalive frame unserializable");
                        continue;
                    }
                };
                if let Err(e) = sink.send(frame).await {
                    warn!(error = %e, "keepalive failed");
                    break e.to_string();
                }
            }
        }
    };

    inner.retire_writer(unsent, &mut out_rx);
    reason
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(FRAME_PREVIEW_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
