//! Infrastructure layer of the emulator.
//!
//! Contains the OS-facing adapters: UDP/TCP sockets, the configuration file,
//! and the sinks that publish events to the outside world.
//!
//! **Dependency rule**: this layer may depend on `application` and `ecp_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod sinks;
pub mod storage;
