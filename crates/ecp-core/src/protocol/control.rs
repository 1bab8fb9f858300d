//! ECP control requests: the route table and key-command decoding.
//!
//! The control channel is plain HTTP/1.1 over TCP.  Remote apps send
//! body-less `POST`s for key commands and `GET`s for a few read-only queries:
//!
//! ```text
//! POST /keypress/Home            → KeyPress("Home")
//! POST /keydown/Lit_%20          → KeyDown("Lit_ ")
//! POST /keyup/Right              → KeyUp("Right")
//! GET  /                         → device description XML
//! GET  /query/device-info        → device-info XML
//! GET  /query/apps               → installed-apps XML
//! ```
//!
//! HTTP framing itself (request line, headers, keep-alive, pipelining) is the
//! HTTP server's job.  This module only decides what a `/{verb}/{key}` path
//! means once the server has split and percent-decoded it:
//!
//! - a key verb with a usable key is a [`ControlCommand`];
//! - any other verb is not a command at all (`Ok(None)`, answered `404`);
//! - a key verb with an unusable key is a [`ProtocolError`], answered `400`
//!   and the connection is closed.

use thiserror::Error;

use crate::domain::event::{ControlEvent, EventType};

/// Path of the device description document.
pub const DEVICE_DESCRIPTION_PATH: &str = "/";

/// Path of the device-info query.
pub const DEVICE_INFO_PATH: &str = "/query/device-info";

/// Path of the installed-apps query.
pub const APPS_PATH: &str = "/query/apps";

/// `Content-Type` of every XML body.
pub const CONTENT_TYPE_XML: &str = "text/xml; charset=utf-8";

/// Errors that make a key command undecodable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid key in request path: {0:?}")]
    InvalidKey(String),

    #[error("undecodable request path: {0}")]
    UndecodablePath(String),
}

/// A decoded key command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub event_type: EventType,
    pub key: String,
}

impl ControlCommand {
    /// Interprets a `/{verb}/{key}` request whose segments are already
    /// percent-decoded.
    ///
    /// Returns `Ok(None)` when `verb` is not `keypress`, `keydown` or `keyup`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidKey`] if the key is empty or contains control
    /// characters.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ecp_core::protocol::control::ControlCommand;
    /// use ecp_core::EventType;
    ///
    /// let cmd = ControlCommand::parse("keydown", "Lit_ ").unwrap().unwrap();
    /// assert_eq!(cmd.event_type, EventType::KeyDown);
    /// assert!(ControlCommand::parse("launch", "12").unwrap().is_none());
    /// ```
    pub fn parse(verb: &str, key: &str) -> Result<Option<Self>, ProtocolError> {
        let Some(event_type) = EventType::from_verb(verb) else {
            return Ok(None);
        };
        if key.is_empty() || key.chars().any(char::is_control) {
            return Err(ProtocolError::InvalidKey(key.to_string()));
        }
        Ok(Some(Self {
            event_type,
            key: key.to_string(),
        }))
    }

    /// The event this command produces for the device `source_identity`.
    pub fn into_event(self, source_identity: impl Into<String>) -> ControlEvent {
        ControlEvent::new(source_identity, self.event_type, self.key)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
