// ── Local stores ──
//
// In-process state the connection manager feeds from inbound events.

mod telemetry;

pub use telemetry::{TelemetryPoint, TelemetryStore};
