//! DiscoveryResponder: answers SSDP searches for the emulated device.
//!
//! Each listener binds a UDP socket on its control port.  Remote apps find
//! the device by sending an `M-SEARCH` either to the SSDP multicast group
//! `239.255.255.250` or straight to the device; the responder replies with a
//! unicast `200 OK` whose `Location` header points at the listener's
//! *advertised* address and port.
//!
//! # How SSDP search works (for beginners)
//!
//! 1. An app multicasts `M-SEARCH * HTTP/1.1` with `ST: roku:ecp` (or
//!    `ssdp:all`).  Every device that joined the multicast group receives it.
//! 2. A matching device answers the sender directly with its `Location` URL
//!    and unique service name (`USN`).
//! 3. The app opens the `Location` URL over TCP; that is the control server.
//!
//! Datagrams that are not searches for this device are ignored silently
//! (logged at `trace`).  Nothing the network sends can stop the responder;
//! only cancellation does.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use ecp_core::{
    protocol::discovery::{
        encode_search_response, SearchRequest, MAX_DATAGRAM_LEN, SSDP_MULTICAST_ADDR,
    },
    DeviceIdentity, ListenerSpec,
};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::application::supervisor::{BindError, Transport};

/// Binds the discovery socket for `spec`.
///
/// The socket uses `SO_REUSEADDR` so that several processes (or a restarted
/// emulator) can share the SSDP group.  When `spec.bind_multicast` is set and
/// the bind address is IPv4, the socket joins `239.255.255.250`; a failed join is
/// logged and the socket still answers unicast searches.
///
/// # Errors
///
/// Returns [`BindError`] if the socket cannot be created or bound.
pub fn bind_discovery_socket(spec: &ListenerSpec) -> Result<UdpSocket, BindError> {
    let addr = SocketAddr::new(spec.bind_address, spec.control_port);
    let bind_err = |source: io::Error| BindError {
        transport: Transport::Udp,
        addr,
        source,
    };

    let socket =
        Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    if spec.bind_multicast {
        join_ssdp_group(&socket, spec.bind_address);
    }

    UdpSocket::from_std(socket.into()).map_err(bind_err)
}

fn join_ssdp_group(socket: &Socket, bind_address: IpAddr) {
    let IpAddr::V4(interface) = bind_address else {
        debug!("multicast discovery is IPv4-only; skipping join on {bind_address}");
        return;
    };
    match socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &interface) {
        Ok(()) => debug!("joined SSDP group {SSDP_MULTICAST_ADDR} on {interface}"),
        Err(e) => warn!("failed to join SSDP group {SSDP_MULTICAST_ADDR} on {interface}: {e}"),
    }
}

/// Serves discovery searches on `socket` until `cancel` fires.
pub async fn run_discovery_responder(
    socket: UdpSocket,
    spec: ListenerSpec,
    identity: Arc<DeviceIdentity>,
    cancel: CancellationToken,
) {
    // The reply never changes for a listener, so encode it once.
    let response = encode_search_response(&identity, &spec);
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

    info!(
        "discovery responder listening on UDP {}:{}",
        spec.bind_address, spec.control_port
    );

    loop {
        let (len, src) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                Err(e) => {
                    // ICMP port-unreachable from an earlier reply surfaces
                    // here on some platforms; it is not fatal.
                    debug!("discovery recv error on port {}: {e}", spec.control_port);
                    continue;
                }
            },
        };

        match SearchRequest::parse(&buf[..len]) {
            Some(search) if search.targets_ecp() => {
                debug!(
                    "search from {src} (ST {}, MX {:?})",
                    search.search_target, search.max_wait_secs
                );
                if let Err(e) = socket.send_to(&response, src).await {
                    warn!("failed to answer search from {src}: {e}");
                }
            }
            Some(search) => trace!("ignoring search for {} from {src}", search.search_target),
            None => trace!("ignoring {len}-byte non-search datagram from {src}"),
        }
    }

    info!("discovery responder on UDP port {} stopped", spec.control_port);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const SEARCH: &[u8] = b"M-SEARCH * HTTP/1.1\r\n\
                            HOST: 239.255.255.250:1900\r\n\
                            MAN: \"ssdp:discover\"\r\n\
                            ST: roku:ecp\r\n\
                            MX: 1\r\n\r\n";

    const DIAL_SEARCH: &[u8] = b"M-SEARCH * HTTP/1.1\r\n\
                                 HOST: 239.255.255.250:1900\r\n\
                                 MAN: \"ssdp:discover\"\r\n\
                                 ST: urn:dial-multiscreen-org:service:dial:1\r\n\r\n";

    fn loopback_spec(port: u16, advertise_port: u16) -> ListenerSpec {
        let lo = IpAddr::V4(Ipv4Addr::LOCALHOST);
        ListenerSpec {
            bind_address: lo,
            control_port: port,
            advertise_address: lo,
            advertise_port,
            bind_multicast: false,
        }
    }

    /// Binds on an ephemeral port and returns the socket with its real spec.
    fn bind_ephemeral(advertise_port: Option<u16>) -> (UdpSocket, ListenerSpec) {
        let socket = bind_discovery_socket(&loopback_spec(0, 0)).unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, loopback_spec(port, advertise_port.unwrap_or(port)))
    }

    async fn search(target: SocketAddr, datagram: &[u8]) -> Option<String> {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(datagram, target).await.unwrap();
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        match tokio::time::timeout(Duration::from_millis(500), client.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(String::from_utf8_lossy(&buf[..len]).into_owned()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_responder_answers_search_with_advertised_location() {
        // Arrange
        let (socket, spec) = bind_ephemeral(Some(9061));
        let target = socket.local_addr().unwrap();
        let identity = Arc::new(DeviceIdentity::with_serial("A1B2C3D4E5F6", "Den"));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_discovery_responder(socket, spec, identity, cancel.clone()));

        // Act
        let reply = search(target, SEARCH).await.expect("responder must reply");

        // Assert
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.contains("Location: http://127.0.0.1:9061/\r\n"), "{reply}");
        assert!(reply.contains("USN: uuid:roku:ecp:A1B2C3D4E5F6\r\n"));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_responder_ignores_foreign_datagrams_and_keeps_serving() {
        // Arrange
        let (socket, spec) = bind_ephemeral(None);
        let target = socket.local_addr().unwrap();
        let identity = Arc::new(DeviceIdentity::generate("Den"));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_discovery_responder(socket, spec, identity, cancel.clone()));

        // Act / Assert
        assert!(search(target, b"garbage").await.is_none());
        assert!(search(target, DIAL_SEARCH).await.is_none());
        assert!(search(target, SEARCH).await.is_some());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_multicast_spec_still_answers_unicast_search() {
        // Arrange: the join may fail on a loopback interface; that only warns.
        let spec = ListenerSpec {
            bind_multicast: true,
            ..loopback_spec(0, 0)
        };
        let socket = bind_discovery_socket(&spec).expect("multicast join must not fail the bind");
        let target = socket.local_addr().unwrap();
        let spec = ListenerSpec {
            control_port: target.port(),
            advertise_port: target.port(),
            ..spec
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_discovery_responder(
            socket,
            spec,
            Arc::new(DeviceIdentity::generate("Den")),
            cancel.clone(),
        ));

        // Act
        let reply = search(target, SEARCH).await;

        // Assert
        assert!(reply.is_some_and(|r| r.starts_with("HTTP/1.1 200 OK\r\n")));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_responder_stops_promptly_on_cancel() {
        let (socket, spec) = bind_ephemeral(None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_discovery_responder(
            socket,
            spec,
            Arc::new(DeviceIdentity::generate("Den")),
            cancel.clone(),
        ));

        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("responder must stop within a second")
            .unwrap();
    }

    #[test]
    fn test_bind_reports_udp_bind_error_for_unassignable_address() {
        // 192.0.2.0/24 is reserved for documentation and never local.
        let doc = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let spec = ListenerSpec {
            bind_address: doc,
            control_port: 8060,
            advertise_address: doc,
            advertise_port: 8060,
            bind_multicast: false,
        };

        let err = bind_discovery_socket(&spec).unwrap_err();

        assert_eq!(err.transport, Transport::Udp);
        assert_eq!(err.addr, SocketAddr::new(doc, 8060));
    }
}
