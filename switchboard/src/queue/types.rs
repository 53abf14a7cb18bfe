//! Wire types for the `logs_topic` exchange.
//!
//! Publishers send JSON-encoded [`LogEvent`] bodies with a dot-separated
//! routing key; consumers classify each event by its `name`.

use serde::{Deserialize, Serialize};

/// Name of the durable topic exchange shared by publishers and consumers.
pub const EXCHANGE_NAME: &str = "logs_topic";

/// Routing key used for log submissions coming through the dispatcher.
pub const LOG_INFO_ROUTING_KEY: &str = "log.INFO";

/// Event body carried on the exchange.
///
/// Missing fields decode as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: String,
}

impl LogEvent {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Classify the event by its name.
    pub fn kind(&self) -> EventKind {
        match self.name.as_str() {
            "log" | "event" => EventKind::Log,
            "auth" => EventKind::Auth,
            _ => EventKind::Unrecognized,
        }
    }
}

/// Classification tag of a [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `log` or `event`
    Log,
    /// Reserved, currently ignored by consumers
    Auth,
    /// Anything else; treated like a log
    Unrecognized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(LogEvent::new("log", "").kind(), EventKind::Log);
        assert_eq!(LogEvent::new("event", "").kind(), EventKind::Log);
        assert_eq!(LogEvent::new("auth", "").kind(), EventKind::Auth);
        assert_eq!(LogEvent::new("LOG", "").kind(), EventKind::Unrecognized);
        assert_eq!(LogEvent::default().kind(), EventKind::Unrecognized);
    }

    #[test]
    fn test_missing_fields_decode_empty() {
        let event: LogEvent = serde_json::from_str(r#"{"name":"event"}"#).unwrap();
        assert_eq!(event, LogEvent::new("event", ""));
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(LogEvent::new("event", "x")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "event", "data": "x"}));
    }
}
