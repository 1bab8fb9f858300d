//! Integration tests for ecp-core through its public API.
//!
//! These tests follow a request the way the emulator handles it: resolve the
//! listener configuration, answer a discovery search for each listener, then
//! interpret control paths aimed at the advertised endpoint.

use ecp_core::{
    bind_listeners,
    protocol::{
        control::{ControlCommand, ProtocolError},
        device,
        discovery::{encode_search_response, SearchRequest},
    },
    ConfigError, ControlEvent, DeviceIdentity, EventType, ListenConfig, PortEntry,
};

const SEARCH: &[u8] = b"M-SEARCH * HTTP/1.1\r\n\
                        Host: 239.255.255.250:1900\r\n\
                        Man: \"ssdp:discover\"\r\n\
                        ST: roku:ecp\r\n\
                        MX: 3\r\n\r\n";

fn location_port(response: &[u8]) -> u16 {
    let text = std::str::from_utf8(response).unwrap();
    let location = text
        .lines()
        .find_map(|l| l.strip_prefix("Location: "))
        .expect("response must carry a Location header");
    let authority = location.trim_start_matches("http://").trim_end_matches('/');
    authority.rsplit(':').next().unwrap().parse().unwrap()
}

#[test]
fn test_two_port_config_advertises_each_listener_port() {
    // Arrange
    let config = ListenConfig {
        bind_address: "0.0.0.0".to_string(),
        listen_ports: vec![PortEntry::from("8060"), PortEntry::from("8061:9061")],
        ..ListenConfig::default()
    };
    let identity = DeviceIdentity::generate("Living Room");

    // Act
    let specs = bind_listeners(&config).expect("config must be valid");
    let search = SearchRequest::parse(SEARCH).expect("search must parse");

    // Assert
    assert_eq!(specs.len(), 2);
    assert!(search.targets_ecp());
    assert_eq!(location_port(&encode_search_response(&identity, &specs[0])), 8060);
    assert_eq!(location_port(&encode_search_response(&identity, &specs[1])), 9061);
}

#[test]
fn test_every_valid_port_token_resolves_consistently() {
    // Sweep a spread of valid ports, including both ends of the range.
    for port in [1u16, 80, 1024, 8060, 49152, 65535] {
        for advertise in [None, Some(1u16), Some(9061), Some(65535)] {
            let token = match advertise {
                None => port.to_string(),
                Some(a) => format!("{port}:{a}"),
            };
            let config = ListenConfig {
                listen_ports: vec![PortEntry::Text(token.clone())],
                ..ListenConfig::default()
            };

            let spec = bind_listeners(&config).unwrap()[0];

            assert_eq!(spec.control_port, port, "{token}");
            assert_eq!(spec.advertise_port, advertise.unwrap_or(port), "{token}");
        }
    }
}

#[test]
fn test_invalid_port_tokens_surface_config_errors() {
    for bad in ["0", "65536", "-8060", "08060", "80 60", "8060:", "port", "1:2:3"] {
        let config = ListenConfig {
            listen_ports: vec![PortEntry::from(bad)],
            ..ListenConfig::default()
        };
        let err = bind_listeners(&config).expect_err(bad);
        assert!(
            matches!(err, ConfigError::InvalidPortToken(_) | ConfigError::PortOutOfRange(_)),
            "{bad:?} produced {err:?}"
        );
    }
}

#[test]
fn test_keypress_path_becomes_control_event() {
    // Arrange
    let identity = DeviceIdentity::with_serial("A1B2C3D4E5F6", "Den");

    // Act
    let event = ControlCommand::parse("keypress", "VolumeUp")
        .unwrap()
        .expect("keypress is a command")
        .into_event(identity.unique_service_name.clone());

    // Assert
    assert_eq!(event.event_type, EventType::KeyPress);
    assert_eq!(event.key, "VolumeUp");
    assert_eq!(event.source_identity, "A1B2C3D4E5F6");
    assert_eq!(event, ControlEvent::new("A1B2C3D4E5F6", EventType::KeyPress, "VolumeUp"));
}

#[test]
fn test_non_key_paths_and_bad_keys_produce_no_event() {
    assert_eq!(ControlCommand::parse("launch", "12"), Ok(None));
    assert!(matches!(
        ControlCommand::parse("keydown", "a\u{0}b"),
        Err(ProtocolError::InvalidKey(_))
    ));
}

#[test]
fn test_device_description_names_the_device() {
    let identity = DeviceIdentity::with_serial("A1B2C3D4E5F6", "Den");

    let xml = device::device_description(&identity);

    assert!(xml.contains("<friendlyName>Den</friendlyName>"));
    assert!(xml.contains("<serialNumber>A1B2C3D4E5F6</serialNumber>"));
}
