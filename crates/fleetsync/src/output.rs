//! Rendering of events and command results.

use serde::Serialize;
use serde_json::Value;

use fleetsync_core::Event;

use crate::cli::OutputFormat;

/// Render one event as a single record.
pub fn render_event(event: &Event, format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => format!(
            "{}  {:<16}  {}",
            event.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event.category.as_ref(),
            compact(&event.data)
        ),
        OutputFormat::Json => pretty(event),
        OutputFormat::JsonCompact => single_line(event),
    }
}

/// Render a command result or status object.
pub fn render_value(value: &Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => match value {
            Value::Null => "ok".into(),
            Value::String(s) => s.clone(),
            other => pretty(other),
        },
        OutputFormat::Json => pretty(value),
        OutputFormat::JsonCompact => single_line(value),
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => single_line(other),
    }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn single_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use fleetsync_core::EventCategory;

    use super::*;

    fn event() -> Event {
        Event {
            category: EventCategory::Telemetry,
            data: json!({ "robot_id": "r1", "battery": 80 }),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default(),
        }
    }

    #[test]
    fn plain_event_is_one_line() {
        let line = render_event(&event(), OutputFormat::Plain);
        assert_eq!(
            line,
            r#"2024-05-01T12:00:00.000Z  telemetry         {"battery":80,"robot_id":"r1"}"#
        );
    }

    #[test]
    fn compact_event_carries_category() {
        let line = render_event(&event(), OutputFormat::JsonCompact);
        assert!(!line.contains('\n'));
        assert!(line.contains(r#""category":"telemetry""#));
    }

    #[test]
    fn plain_null_result_reads_ok() {
        assert_eq!(render_value(&Value::Null, OutputFormat::Plain), "ok");
        assert_eq!(render_value(&json!("done"), OutputFormat::Plain), "done");
    }
}
