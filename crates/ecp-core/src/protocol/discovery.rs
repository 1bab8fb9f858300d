//! SSDP search handling for the discovery responder.
//!
//! Remote apps find devices by sending an `M-SEARCH` datagram:
//!
//! ```text
//! M-SEARCH * HTTP/1.1
//! Host: 239.255.255.250:1900
//! Man: "ssdp:discover"
//! ST: roku:ecp
//! MX: 3
//! ```
//!
//! A matching device replies with a unicast `200 OK` datagram whose `Location`
//! header points at its control server.  Anything that is not a well-formed
//! search for `roku:ecp` (or `ssdp:all`) is ignored; [`SearchRequest::parse`]
//! returns `None` and the responder drops the datagram.

use std::net::{Ipv4Addr, SocketAddr};

use super::SERVER_HEADER;
use crate::domain::identity::DeviceIdentity;
use crate::domain::listener::ListenerSpec;

/// SSDP multicast group joined when multicast binding is enabled.
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Search target identifying ECP devices.
pub const SEARCH_TARGET_ECP: &str = "roku:ecp";

/// Wildcard search target.
pub const SEARCH_TARGET_ALL: &str = "ssdp:all";

/// `Cache-Control: max-age` advertised in responses, in seconds.
pub const MAX_AGE_SECS: u32 = 300;

/// Largest datagram the responder reads; real searches are a few hundred bytes.
pub const MAX_DATAGRAM_LEN: usize = 2048;

/// A parsed `M-SEARCH` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// The `ST` header value.
    pub search_target: String,
    /// The `MX` header value, if present and numeric.
    pub max_wait_secs: Option<u32>,
}

impl SearchRequest {
    /// Parses a datagram as an SSDP discovery search.
    ///
    /// Returns `None` for anything other than `M-SEARCH * HTTP/1.1` carrying
    /// `MAN: "ssdp:discover"` and a non-empty `ST` header.
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(datagram).ok()?;
        let mut lines = text.split("\r\n").flat_map(|l| l.split('\n'));

        let request_line = lines.next()?.trim();
        let mut parts = request_line.split_whitespace();
        if parts.next()? != "M-SEARCH" || parts.next()? != "*" {
            return None;
        }
        if !parts.next()?.eq_ignore_ascii_case("HTTP/1.1") || parts.next().is_some() {
            return None;
        }

        let mut search_target = None;
        let mut max_wait_secs = None;
        let mut is_discover = false;

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "st" if !value.is_empty() => search_target = Some(value.to_string()),
                "man" => is_discover = value.trim_matches('"') == "ssdp:discover",
                "mx" => max_wait_secs = value.parse().ok(),
                _ => {}
            }
        }

        if !is_discover {
            return None;
        }
        Some(Self {
            search_target: search_target?,
            max_wait_secs,
        })
    }

    /// Whether this search should be answered by an ECP device.
    pub fn targets_ecp(&self) -> bool {
        self.search_target == SEARCH_TARGET_ECP || self.search_target == SEARCH_TARGET_ALL
    }
}

/// The control-server URL advertised for `spec`.
pub fn location_url(spec: &ListenerSpec) -> String {
    let addr = SocketAddr::new(spec.advertise_address, spec.advertise_port);
    format!("http://{addr}/")
}

/// Builds the unicast search response datagram for one listener.
pub fn encode_search_response(identity: &DeviceIdentity, spec: &ListenerSpec) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Cache-Control: max-age={MAX_AGE_SECS}\r\n\
         ST: {SEARCH_TARGET_ECP}\r\n\
         Location: {location}\r\n\
         USN: {usn}\r\n\
         Ext: \r\n\
         Server: {SERVER_HEADER}\r\n\
         \r\n",
        location = location_url(spec),
        usn = identity.udn(),
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
                          Host: 239.255.255.250:1900\r\n\
                          Man: \"ssdp:discover\"\r\n\
                          ST: roku:ecp\r\n\
                          MX: 3\r\n\r\n";

    fn spec(port: u16, advertise_port: u16) -> ListenerSpec {
        ListenerSpec {
            bind_address: "0.0.0.0".parse().unwrap(),
            control_port: port,
            advertise_address: "192.168.1.20".parse().unwrap(),
            advertise_port,
            bind_multicast: false,
        }
    }

    #[test]
    fn test_parse_accepts_ecp_search() {
        let req = SearchRequest::parse(SEARCH.as_bytes()).unwrap();
        assert_eq!(req.search_target, "roku:ecp");
        assert_eq!(req.max_wait_secs, Some(3));
        assert!(req.targets_ecp());
    }

    #[test]
    fn test_parse_header_names_are_case_insensitive() {
        let msg = "M-SEARCH * HTTP/1.1\r\nMAN: ssdp:discover\r\nst: ssdp:all\r\n\r\n";
        let req = SearchRequest::parse(msg.as_bytes()).unwrap();
        assert!(req.targets_ecp());
        assert_eq!(req.max_wait_secs, None);
    }

    #[test]
    fn test_parse_accepts_bare_newlines() {
        let msg = "M-SEARCH * HTTP/1.1\nMan: \"ssdp:discover\"\nST: roku:ecp\n\n";
        assert!(SearchRequest::parse(msg.as_bytes()).is_some());
    }

    #[test]
    fn test_other_search_targets_are_not_ecp() {
        let msg = SEARCH.replace("roku:ecp", "urn:dial-multiscreen-org:service:dial:1");
        let req = SearchRequest::parse(msg.as_bytes()).unwrap();
        assert!(!req.targets_ecp());
    }

    #[test]
    fn test_parse_rejects_irrelevant_datagrams() {
        let notify = "NOTIFY * HTTP/1.1\r\nNT: roku:ecp\r\nNTS: ssdp:alive\r\n\r\n";
        let no_man = "M-SEARCH * HTTP/1.1\r\nST: roku:ecp\r\n\r\n";
        let no_st = "M-SEARCH * HTTP/1.1\r\nMan: \"ssdp:discover\"\r\n\r\n";
        let wrong_target = "M-SEARCH / HTTP/1.1\r\nMan: \"ssdp:discover\"\r\nST: roku:ecp\r\n\r\n";

        for msg in [notify, no_man, no_st, wrong_target, "", "garbage"] {
            assert_eq!(SearchRequest::parse(msg.as_bytes()), None, "{msg:?}");
        }
        assert_eq!(SearchRequest::parse(&[0xff, 0xfe, 0x00]), None);
    }

    #[test]
    fn test_response_advertises_listener_endpoint_and_usn() {
        // Arrange
        let identity = DeviceIdentity::with_serial("ABCDEF123456", "Den");

        // Act
        let bytes = encode_search_response(&identity, &spec(8061, 9061));
        let text = String::from_utf8(bytes).unwrap();

        // Assert
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Location: http://192.168.1.20:9061/\r\n"));
        assert!(text.contains("USN: uuid:roku:ecp:ABCDEF123456\r\n"));
        assert!(text.contains("ST: roku:ecp\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_location_url_brackets_ipv6() {
        let mut s = spec(8060, 8060);
        s.advertise_address = "fe80::1".parse().unwrap();
        assert_eq!(location_url(&s), "http://[fe80::1]:8060/");
    }
}
