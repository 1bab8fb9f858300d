//! Domain types for the ECP emulator.
//!
//! Everything here is plain data plus pure functions: no sockets, no async
//! runtime, no file system.  The emulator crate builds its network services on
//! top of these types.

/// Listener configuration and the address/port binder.
pub mod listener;

/// The identity every listener advertises.
pub mod identity;

/// Key events handed to subscribers.
pub mod event;
