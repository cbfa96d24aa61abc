//! Wire protocol for the persistent channel.
//!
//! Every frame in both directions is a JSON object of the shape
//! `{ "type": string, "data": object, "timestamp": ISO-8601 }`.
//! Inbound frames are parsed into [`InboundMessage`]s keyed by a closed set
//! of [`EventCategory`] values; outbound frames are built from
//! [`OutboundMessage`]s.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;

/// `type` used for command frames sent to the remote.
pub const COMMAND_MESSAGE_TYPE: &str = "command";

/// `type` used for keep-alive frames.
pub const PING_MESSAGE_TYPE: &str = "ping";

// ── EventCategory ────────────────────────────────────────────────────

/// Closed set of event categories carried on the Event Bus.
///
/// The first four are emitted locally by the connection manager to report
/// lifecycle transitions; the rest arrive from the remote.
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
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventCategory {
    Connected,
    Disconnected,
    Reconnecting,
    ReconnectFailed,
    Telemetry,
    CommandResponse,
    Alert,
    Status,
}

impl EventCategory {
    /// Lifecycle categories never come from the wire.
    pub fn is_lifecycle(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Disconnected | Self::Reconnecting | Self::ReconnectFailed
        )
    }

    /// Resolve a wire `type` string, accepting only remote categories.
    pub fn from_wire(kind: &str) -> Option<Self> {
        kind.parse::<Self>().ok().filter(|c| !c.is_lifecycle())
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: Option<String>,
}

/// A parsed frame received from the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub category: EventCategory,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Parse a text frame.
    ///
    /// Fails with [`Error::MalformedMessage`] when the frame is not a JSON
    /// object, has no `type`, or names a category outside the wire set.
    /// A missing or unparsable timestamp falls back to the receive time.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(|e| Error::MalformedMessage {
            reason: format!("invalid envelope: {e}"),
        })?;

        let kind = raw.kind.ok_or_else(|| Error::MalformedMessage {
            reason: "missing `type` field".into(),
        })?;

        let category = EventCategory::from_wire(&kind).ok_or_else(|| Error::MalformedMessage {
            reason: format!("unknown message type `{kind}`"),
        })?;

        let timestamp = raw
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        Ok(Self {
            category,
            data: raw.data,
            timestamp,
        })
    }
}

/// Accepts RFC 3339 and zone-less ISO-8601 (treated as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ── Outbound ─────────────────────────────────────────────────────────

/// A frame waiting to be written to the persistent channel.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub data: Value,
    #[serde(rename = "timestamp")]
    pub enqueued_at: DateTime<Utc>,
    /// Set when a caller is awaiting a response to this frame.
    #[serde(skip)]
    pub correlation: Option<Uuid>,
}

impl OutboundMessage {
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            enqueued_at: Utc::now(),
            correlation: None,
        }
    }

    /// Build a command frame carrying the request's correlation id.
    pub fn command(request: &CommandRequest) -> Result<Self, Error> {
        let data = serde_json::to_value(request)?;
        Ok(Self {
            correlation: Some(request.command_id),
            ..Self::new(COMMAND_MESSAGE_TYPE, data)
        })
    }

    pub fn ping() -> Self {
        Self::new(PING_MESSAGE_TYPE, Value::Null)
    }

    pub fn awaits_response(&self) -> bool {
        self.correlation.is_some()
    }

    /// Serialize into a text frame.
    pub fn to_frame(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Commands ─────────────────────────────────────────────────────────

/// Scheduling hint for the remote; `Critical` may preempt queued work.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Command payload shared by the WebSocket and REST transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command_id: Uuid,
    pub entity_id: String,
    pub command_type: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub priority: Priority,
    pub timeout_ms: u64,
}

/// Payload of a `command_response` event, or the body of a REST command
/// submission.
///
/// Every field is optional on the wire; `success` defaults to `true`.
/// Fields outside the envelope land in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub command_id: Option<String>,
    #[serde(default, alias = "robot_id")]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub command_type: Option<String>,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default, alias = "reason")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_success() -> bool {
    true
}

impl CommandResponse {
    pub fn from_value(data: &Value) -> Result<Self, Error> {
        Self::deserialize(data).map_err(|e| Error::MalformedMessage {
            reason: format!("invalid command response: {e}"),
        })
    }

    /// Correlation id, if the remote echoed a well-formed one.
    pub fn command_uuid(&self) -> Option<Uuid> {
        self.command_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    /// Collapse into the caller-facing result. On success this is the
    /// `result` payload; without one, the non-envelope fields as an object,
    /// or `null` when there are none. On failure, the rejection reason.
    ///
    /// Both transports go through here, so callers see one shape.
    pub fn into_outcome(self) -> Result<Value, String> {
        if self.success {
            Ok(match self.result {
                Value::Null if !self.extra.is_empty() => Value::Object(self.extra),
                result => result,
            })
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "command rejected by remote".into()))
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
