//! Network infrastructure: the sockets behind each listener.
//!
//! # Sub-modules
//!
//! - **`discovery`** – UDP responder that answers SSDP `M-SEARCH` queries with
//!   the listener's advertised control URL.
//!
//! - **`control_server`** – TCP accept loop plus the per-connection ECP
//!   request loop that turns key requests into dispatched events.
//!
//! - **`listener`** – Binds both sockets for one listener, owns their tasks,
//!   and implements the supervisor's `ListenerLauncher` seam.

pub mod control_server;
pub mod discovery;
pub mod listener;
