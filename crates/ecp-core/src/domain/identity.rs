//! Device identity advertised by every listener.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Friendly name shown by remote apps when none is configured.
pub const DEFAULT_FRIENDLY_NAME: &str = "Emulated Roku";

/// Length of the generated serial / unique service name.
const SERIAL_LEN: usize = 12;

/// Identity of the emulated device.
///
/// Generated once at startup and shared read-only (behind an `Arc`) by every
/// listener.  The unique service name doubles as the device serial number and
/// as the `sourceIdentity` of each published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub unique_service_name: String,
    pub friendly_name: String,
}

impl DeviceIdentity {
    /// Creates an identity with a freshly generated serial.
    pub fn generate(friendly_name: impl Into<String>) -> Self {
        let serial: String = Uuid::new_v4()
            .simple()
            .to_string()
            .to_ascii_uppercase()
            .chars()
            .take(SERIAL_LEN)
            .collect();
        Self::with_serial(serial, friendly_name)
    }

    /// Creates an identity with a fixed serial.  Mostly useful in tests.
    pub fn with_serial(serial: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            unique_service_name: serial.into(),
            friendly_name: friendly_name.into(),
        }
    }

    /// The UPnP unique device name, e.g. `uuid:roku:ecp:1A2B3C4D5E6F`.
    pub fn udn(&self) -> String {
        format!("uuid:roku:ecp:{}", self.unique_service_name)
    }
}
