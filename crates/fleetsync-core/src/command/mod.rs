// ── Command API ──
//
// Every control operation is a `Command` variant. `EntityControl` routes it
// over the persistent channel when open, or the REST fallback otherwise.

mod control;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use fleetsync_api::Priority;

pub use control::EntityControl;

/// Wire name of the status query; the REST fallback serves it with a GET.
pub const STATUS_COMMAND: &str = "get_status";

/// Heading for a [`Command::Move`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

/// All control operations an entity accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Move {
        direction: Direction,
        speed: f64,
        duration_ms: u64,
    },
    Rotate {
        angle: f64,
        speed: f64,
    },
    Stop,
    SetMode {
        mode: String,
    },
    /// Halt immediately. Sent with `critical` priority and the short
    /// emergency timeout.
    EmergencyStop,
    GetStatus,
    /// Anything the typed variants do not cover.
    Custom {
        command_type: String,
        params: Value,
        priority: Priority,
    },
}

impl Command {
    /// Value of the request's `command_type` field.
    pub fn command_type(&self) -> &str {
        match self {
            Self::Move { .. } => "move",
            Self::Rotate { .. } => "rotate",
            Self::Stop => "stop",
            Self::SetMode { .. } => "set_mode",
            Self::EmergencyStop => "emergency_stop",
            Self::GetStatus => STATUS_COMMAND,
            Self::Custom { command_type, .. } => command_type,
        }
    }

    pub fn params(&self) -> Value {
        match self {
            Self::Move {
                direction,
                speed,
                duration_ms,
            } => json!({
                "direction": direction,
                "speed": speed,
                "duration_ms": duration_ms,
            }),
            Self::Rotate { angle, speed } => json!({ "angle": angle, "speed": speed }),
            Self::SetMode { mode } => json!({ "mode": mode }),
            Self::Stop | Self::EmergencyStop | Self::GetStatus => json!({}),
            Self::Custom { params, .. } => params.clone(),
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Self::EmergencyStop => Priority::Critical,
            Self::Stop => Priority::High,
            Self::Custom { priority, .. } => *priority,
            Self::Move { .. } | Self::Rotate { .. } | Self::SetMode { .. } | Self::GetStatus => {
                Priority::Normal
            }
        }
    }

    pub fn is_safety_critical(&self) -> bool {
        matches!(self, Self::EmergencyStop)
    }
}
