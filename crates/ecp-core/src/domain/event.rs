//! Control events published to subscribers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which kind of key command was received.
///
/// Serialized as the lowercase ECP verb (`"keydown"`, `"keyup"`, `"keypress"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    KeyDown,
    KeyUp,
    KeyPress,
}

impl EventType {
    /// The ECP verb, which is also the URL path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::KeyDown => "keydown",
            EventType::KeyUp => "keyup",
            EventType::KeyPress => "keypress",
        }
    }

    /// Parses an ECP verb.  Matching is exact; ECP paths are case-sensitive.
    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "keydown" => Some(EventType::KeyDown),
            "keyup" => Some(EventType::KeyUp),
            "keypress" => Some(EventType::KeyPress),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded key command, tagged with the device that received it.
///
/// The JSON form has exactly three fields:
///
/// ```json
/// {"sourceIdentity": "1A2B3C4D5E6F", "eventType": "keypress", "key": "Home"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEvent {
    pub source_identity: String,
    pub event_type: EventType,
    pub key: String,
}

impl ControlEvent {
    pub fn new(
        source_identity: impl Into<String>,
        event_type: EventType,
        key: impl Into<String>,
    ) -> Self {
        Self {
            source_identity: source_identity.into(),
            event_type,
            key: key.into(),
        }
    }
}
