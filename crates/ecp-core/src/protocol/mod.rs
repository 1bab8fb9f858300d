//! Wire formats: SSDP discovery datagrams and the ECP control routes.

pub mod control;
pub mod device;
pub mod discovery;

pub use control::{ControlCommand, ProtocolError};
pub use discovery::{encode_search_response, SearchRequest};

/// `Server` header sent in discovery and control responses.
pub const SERVER_HEADER: &str = "Roku/9.0.0 UPnP/1.0 Roku/9.0.0";
