//! Listener configuration: turns raw host/port settings into validated
//! [`ListenerSpec`]s.
//!
//! Every configured port produces one listener, and each listener owns a UDP
//! discovery socket plus a TCP control socket on the same port number.  A port
//! entry can ask for a different port to be *advertised* to remote apps, which
//! is useful behind NAT or a port-forwarding container runtime:
//!
//! ```text
//! listen_ports = [8060, "8061:9061"]
//!                  │        │    └── advertised to discovering apps
//!                  │        └─────── bound locally
//!                  └──────────────── bound and advertised
//! ```
//!
//! # Port tokens
//!
//! Config files may contain bare integers or strings.  Both are resolved once
//! into a [`PortToken`] and never re-inspected downstream.  Tokens are strict
//! decimal: signs, leading zeros and empty halves are rejected so that a typo
//! like `"08060"` or `"-1"` fails loudly instead of binding a surprising port.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default address for both binding and advertising.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default control/discovery port used by real devices.
pub const DEFAULT_LISTEN_PORT: u16 = 8060;

/// Error type for listener configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The bind or advertise address is not an IP literal.
    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    /// A port entry is neither `N` nor `N:M`.
    #[error("invalid port token '{0}': expected \"port\" or \"port:advertise_port\"")]
    InvalidPortToken(String),

    /// A port value is outside `1..=65535`.
    #[error("port {0} is out of range (1-65535)")]
    PortOutOfRange(i64),

    /// No ports were configured.
    #[error("at least one listen port must be configured")]
    NoListeners,

    /// Two entries bind the same local port.
    #[error("port {0} is configured more than once")]
    DuplicatePort(u16),
}

/// A single `listen_ports` entry as it appears in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortEntry {
    Number(i64),
    Text(String),
}

impl From<u16> for PortEntry {
    fn from(port: u16) -> Self {
        PortEntry::Number(i64::from(port))
    }
}

impl From<&str> for PortEntry {
    fn from(token: &str) -> Self {
        PortEntry::Text(token.to_string())
    }
}

impl fmt::Display for PortEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortEntry::Number(n) => write!(f, "{n}"),
            PortEntry::Text(s) => f.write_str(s),
        }
    }
}

/// A resolved port entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortToken {
    /// Bind and advertise the same port.
    Bare(u16),
    /// Bind the first port, advertise the second.
    Pair(u16, u16),
}

impl PortToken {
    /// Resolves a config entry into a token.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidPortToken`] for malformed strings and
    /// [`ConfigError::PortOutOfRange`] for values outside `1..=65535`.
    pub fn parse(entry: &PortEntry) -> Result<Self, ConfigError> {
        match entry {
            PortEntry::Number(n) => Ok(PortToken::Bare(port_in_range(*n)?)),
            PortEntry::Text(raw) => {
                let token = raw.trim();
                let mut parts = token.split(':');
                let first = parts.next().unwrap_or_default();
                let second = parts.next();
                if parts.next().is_some() {
                    return Err(ConfigError::InvalidPortToken(raw.clone()));
                }

                let port = parse_decimal_port(first, raw)?;
                match second {
                    None => Ok(PortToken::Bare(port)),
                    Some(adv) => Ok(PortToken::Pair(port, parse_decimal_port(adv, raw)?)),
                }
            }
        }
    }

    /// The locally bound port.
    pub fn control_port(self) -> u16 {
        match self {
            PortToken::Bare(p) | PortToken::Pair(p, _) => p,
        }
    }

    /// The port remote apps are told to connect to.
    pub fn advertise_port(self) -> u16 {
        match self {
            PortToken::Bare(p) | PortToken::Pair(_, p) => p,
        }
    }
}

fn parse_decimal_port(digits: &str, raw: &str) -> Result<u16, ConfigError> {
    let well_formed = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && !(digits.len() > 1 && digits.starts_with('0'));
    if !well_formed {
        return Err(ConfigError::InvalidPortToken(raw.to_string()));
    }
    // More than 10 digits cannot fit the range anyway; report it as such.
    let value: i64 = digits.parse().unwrap_or(i64::MAX);
    port_in_range(value)
}

fn port_in_range(value: i64) -> Result<u16, ConfigError> {
    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::PortOutOfRange(value)),
    }
}

/// Raw listener settings, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    pub bind_address: String,
    pub listen_ports: Vec<PortEntry>,
    pub advertise_address: Option<String>,
    pub bind_multicast: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            listen_ports: vec![PortEntry::from(DEFAULT_LISTEN_PORT)],
            advertise_address: None,
            bind_multicast: true,
        }
    }
}

/// A validated listener: where to bind and what to advertise.
///
/// Immutable once built by [`bind_listeners`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerSpec {
    pub bind_address: IpAddr,
    pub control_port: u16,
    pub advertise_address: IpAddr,
    pub advertise_port: u16,
    /// Whether the discovery responder joins the SSDP multicast group.
    pub bind_multicast: bool,
}

impl fmt::Display for ListenerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (advertised as {}:{})",
            self.bind_address, self.control_port, self.advertise_address, self.advertise_port
        )
    }
}

/// Validates `config` and produces one [`ListenerSpec`] per port entry, in
/// configuration order.
///
/// Pure: no sockets are touched.
///
/// # Errors
///
/// Returns the first [`ConfigError`] encountered.
///
/// # Examples
///
/// ```rust
/// use ecp_core::domain::listener::{bind_listeners, ListenConfig, PortEntry};
///
/// let config = ListenConfig {
///     listen_ports: vec![PortEntry::from(8060u16), PortEntry::from("8061:9061")],
///     ..ListenConfig::default()
/// };
/// let specs = bind_listeners(&config).unwrap();
/// assert_eq!(specs[1].control_port, 8061);
/// assert_eq!(specs[1].advertise_port, 9061);
/// ```
pub fn bind_listeners(config: &ListenConfig) -> Result<Vec<ListenerSpec>, ConfigError> {
    let bind_address = parse_ip("bind", &config.bind_address)?;
    let advertise_address = match config.advertise_address.as_deref() {
        Some(addr) if !addr.trim().is_empty() => parse_ip("advertise", addr)?,
        _ => bind_address,
    };

    if config.listen_ports.is_empty() {
        return Err(ConfigError::NoListeners);
    }

    let mut seen = HashSet::new();
    config
        .listen_ports
        .iter()
        .map(|entry| {
            let token = PortToken::parse(entry)?;
            if !seen.insert(token.control_port()) {
                return Err(ConfigError::DuplicatePort(token.control_port()));
            }
            Ok(ListenerSpec {
                bind_address,
                control_port: token.control_port(),
                advertise_address,
                advertise_port: token.advertise_port(),
                bind_multicast: config.bind_multicast,
            })
        })
        .collect()
}

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
