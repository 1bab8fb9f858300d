//! XML documents served by the control server's read-only endpoints.
//!
//! Remote apps fetch the device description (the `Location` URL from the
//! discovery response) to learn the device name, then may query device-info
//! and the app list before sending key commands.

use quick_xml::escape::escape;

use crate::domain::identity::DeviceIdentity;

const MODEL_NAME: &str = "Roku Express";
const MODEL_NUMBER: &str = "3900X";
const MANUFACTURER: &str = "Roku";

/// UPnP root device description for `GET /`.
pub fn device_description(identity: &DeviceIdentity) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n\
         <root xmlns=\"urn:schemas-upnp-org:device-1-0\">\n\
         <specVersion><major>1</major><minor>0</minor></specVersion>\n\
         <device>\n\
         <deviceType>urn:roku-com:device:player:1-0</deviceType>\n\
         <friendlyName>{name}</friendlyName>\n\
         <manufacturer>{MANUFACTURER}</manufacturer>\n\
         <manufacturerURL>http://www.roku.com/</manufacturerURL>\n\
         <modelDescription>Roku Streaming Player Network Media</modelDescription>\n\
         <modelName>{MODEL_NAME}</modelName>\n\
         <modelNumber>{MODEL_NUMBER}</modelNumber>\n\
         <serialNumber>{serial}</serialNumber>\n\
         <UDN>{udn}</UDN>\n\
         <serviceList>\n\
         <service>\n\
         <serviceType>urn:roku-com:service:ecp:1</serviceType>\n\
         <serviceId>urn:roku-com:serviceId:ecp1-0</serviceId>\n\
         <controlURL/>\n\
         <eventSubURL/>\n\
         <SCPDURL>ecp_SCPD.xml</SCPDURL>\n\
         </service>\n\
         </serviceList>\n\
         </device>\n\
         </root>\n",
        name = escape(identity.friendly_name.as_str()),
        serial = escape(identity.unique_service_name.as_str()),
        udn = escape(identity.udn().as_str()),
    )
}

/// Device summary for `GET /query/device-info`.
pub fn device_info(identity: &DeviceIdentity) -> String {
    let name = escape(identity.friendly_name.as_str());
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n\
         <device-info>\n\
         <udn>{udn}</udn>\n\
         <serial-number>{serial}</serial-number>\n\
         <vendor-name>{MANUFACTURER}</vendor-name>\n\
         <model-name>{MODEL_NAME}</model-name>\n\
         <model-number>{MODEL_NUMBER}</model-number>\n\
         <friendly-device-name>{name}</friendly-device-name>\n\
         <user-device-name>{name}</user-device-name>\n\
         <is-tv>false</is-tv>\n\
         <is-stick>false</is-stick>\n\
         <supports-find-remote>false</supports-find-remote>\n\
         <power-mode>PowerOn</power-mode>\n\
         </device-info>\n",
        udn = escape(identity.udn().as_str()),
        serial = escape(identity.unique_service_name.as_str()),
    )
}

/// Installed-apps list for `GET /query/apps`.  The emulator has none.
pub fn apps() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<apps/>\n".to_string()
}
