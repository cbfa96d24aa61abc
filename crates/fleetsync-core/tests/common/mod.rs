// Shared fixtures: an in-memory `Connector` whose sessions the test drives
// directly, plus event capture helpers.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

use fleetsync_api::{Channel, Connector, Error};
use fleetsync_core::{
    ConnectionManager, ConnectionState, Event, EventCategory, ReconnectPolicy, SyncConfig,
};

/// Upper bound on any single wait; virtual time under `start_paused`.
pub const WAIT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handshake fails immediately.
    Fail,
    /// Handshake succeeds and a [`Session`] is handed to the test.
    Accept,
    /// Handshake never completes.
    Hang,
}

/// Remote end of one accepted channel.
pub struct Session {
    /// Frames the client wrote.
    pub outgoing: mpsc::UnboundedReceiver<String>,
    /// Frames to deliver to the client. Dropping it closes the channel.
    pub incoming: mpsc::UnboundedSender<Result<String, Error>>,
}

impl Session {
    pub fn push(&self, frame: impl Into<String>) {
        self.incoming.send(Ok(frame.into())).unwrap();
    }

    pub fn push_json(&self, frame: &Value) {
        self.push(frame.to_string());
    }

    /// Next frame written by the client, decoded.
    pub async fn next_frame(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.outgoing.recv())
            .await
            .expect("client wrote a frame")
            .expect("channel still open");
        serde_json::from_str(&text).unwrap()
    }
}

pub struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    otherwise: Outcome,
    attempts: AtomicUsize,
    sessions: mpsc::UnboundedSender<Session>,
}

impl MockConnector {
    /// Outcomes are consumed in order; `otherwise` applies once the script
    /// runs out.
    pub fn new(
        script: impl IntoIterator<Item = Outcome>,
        otherwise: Outcome,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Session>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            otherwise,
            attempts: AtomicUsize::new(0),
            sessions: tx,
        });
        (connector, rx)
    }

    pub fn accepting() -> (Arc<Self>, mpsc::UnboundedReceiver<Session>) {
        Self::new([], Outcome::Accept)
    }

    /// Handshakes attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect<'a>(&'a self, _url: &'a Url) -> BoxFuture<'a, Result<Channel, Error>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.otherwise);

        Box::pin(async move {
            match outcome {
                Outcome::Fail => Err(Error::WebSocketConnect("connection refused".into())),
                Outcome::Hang => std::future::pending().await,
                Outcome::Accept => {
                    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
                    let (in_tx, in_rx) = mpsc::unbounded_channel();

                    let sink = futures_util::sink::unfold(out_tx, |tx, frame: String| async move {
                        tx.send(frame)
                            .map_err(|_| Error::WebSocketSend("peer gone".into()))?;
                        Ok::<_, Error>(tx)
                    });
                    let stream = UnboundedReceiverStream::new(in_rx);

                    let _ = self.sessions.send(Session {
                        outgoing: out_rx,
                        incoming: in_tx,
                    });
                    Ok(Channel::new(sink, stream))
                }
            }
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

pub fn config(base_ms: u64, max_ms: u64, max_attempts: u32) -> SyncConfig {
    SyncConfig {
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            max_attempts,
        },
        ..SyncConfig::default()
    }
}

/// Forward every event of `category` into a channel.
pub fn capture(
    manager: &ConnectionManager,
    category: EventCategory,
) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.subscribe(category, move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("event arrived")
        .expect("bus alive")
}

pub async fn next_session(rx: &mut mpsc::UnboundedReceiver<Session>) -> Session {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("session accepted")
        .expect("connector alive")
}

pub async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
    let mut rx = manager.state_changes();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == target))
        .await
        .expect("state reached")
        .unwrap();
}
