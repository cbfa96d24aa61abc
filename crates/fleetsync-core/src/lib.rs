//! Real-time synchronization client for remote-controlled fleets.
//!
//! Keeps one persistent channel to a remote control system alive and turns
//! its traffic into something applications can consume:
//!
//! - **[`ConnectionManager`]** — Owns the channel lifecycle
//!   (`idle → connecting → open → closed`), reconnects with exponential
//!   backoff up to a bounded number of attempts, queues outbound messages
//!   while the channel is down and flushes them in order on reconnect.
//!
//! - **[`EventBus`]** — Category-keyed publish/subscribe. Lifecycle events
//!   (`connected`, `disconnected`, `reconnecting`, `reconnect_failed`) and
//!   remote events (`telemetry`, `command_response`, `alert`, `status`) are
//!   delivered synchronously to subscribers in subscription order.
//!
//! - **[`TelemetryStore`]** — Bounded per-entity ring buffers fed from
//!   `telemetry` events.
//!
//! - **[`PendingRegistry`]** — Correlates commands with their responses by
//!   unique command id, with timeouts.
//!
//! - **[`EntityControl`]** — Typed control operations (`move_to`, `rotate`,
//!   `stop`, `set_mode`, `emergency_stop`, `status`) that fall back to REST
//!   while the channel is down.
//!
//! - **[`FleetClient`]** — Assembles all of the above from a [`SyncConfig`].

pub mod bus;
pub mod client;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod pending;
mod queue;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{Event, EventBus, Handler, Subscription};
pub use client::FleetClient;
pub use command::{Command, Direction, EntityControl};
pub use config::{ReconnectPolicy, SyncConfig, TlsVerification};
pub use connection::{ConnectionManager, ConnectionState, ReconnectState, backoff_delay};
pub use error::{CommandError, CoreError};
pub use pending::{PendingCommand, PendingRegistry};
pub use store::{TelemetryPoint, TelemetryStore};

// Wire types consumers need without depending on `fleetsync-api` directly.
pub use fleetsync_api::{EventCategory, OutboundMessage, Priority};
