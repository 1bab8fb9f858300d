//! Application layer of the emulator.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The application layer sits between the pure protocol/domain code in
//! `ecp-core` and the socket code in `infrastructure`.  It decides *what*
//! happens (start these listeners, deliver this event to those subscribers)
//! but depends only on traits for *how* it happens, so every use case can be
//! unit-tested without opening a socket.
//!
//! # Sub-modules
//!
//! - **`dispatch`**   – Fans decoded key events out to subscribers through
//!   bounded, drop-oldest queues and forwards them to an [`EventSink`].
//!
//! - **`supervisor`** – The lifecycle state machine.  Launches one listener
//!   per configured port on the host's "ready" signal and releases every
//!   socket on "shutdown".
//!
//! [`EventSink`]: dispatch::EventSink

pub mod dispatch;
pub mod supervisor;
