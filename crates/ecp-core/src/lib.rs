//! # ecp-core
//!
//! Runtime-free building blocks for emulating a streaming media player on the
//! LAN so that third-party remote-control apps can drive a host application.
//!
//! The emulator speaks two protocols on every configured port:
//!
//! - **Discovery** (UDP): SSDP `M-SEARCH` queries for `roku:ecp` are answered
//!   with a datagram pointing at the control server.
//! - **Control** (TCP): ECP, a small HTTP/1.1 API of `POST /keypress/{key}`,
//!   `/keydown/{key}` and `/keyup/{key}` commands plus a few read-only queries.
//!
//! This crate holds the parts that need no sockets:
//!
//! - **`domain`** – listener configuration ([`bind_listeners`]), the
//!   [`DeviceIdentity`] every listener advertises, and the [`ControlEvent`]
//!   records handed to subscribers.
//! - **`protocol`** – parsing and encoding of discovery datagrams, the control
//!   route table and key-command decoding, and the XML documents the control
//!   server returns.
//!
//! The `ecp-emulator` crate wires these into tokio network services.

pub mod domain;
pub mod protocol;

pub use domain::event::{ControlEvent, EventType};
pub use domain::identity::DeviceIdentity;
pub use domain::listener::{bind_listeners, ConfigError, ListenConfig, ListenerSpec, PortEntry, PortToken};
pub use protocol::control::{ControlCommand, ProtocolError};
