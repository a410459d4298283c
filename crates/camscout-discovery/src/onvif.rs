//! ONVIF WS-Discovery probing
//!
//! A single SOAP `Probe` goes to the WS-Discovery multicast group and every
//! unicast `ProbeMatch` that comes back is treated as a camera. Vendor, name
//! and hardware model are picked out of the reply when present.

use camscout_core::{DeviceType, DiscoveredDevice};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tracing::{debug, trace};

use crate::cancel::CancelSignal;
use crate::error::ProbeError;
use crate::multicast::{infer_manufacturer, MulticastProbe};
use crate::registry::DeviceRegistry;

/// WS-Discovery multicast group
pub const ONVIF_MULTICAST: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 3702));

/// Port recorded for every ONVIF responder
pub const ONVIF_DEVICE_PORT: u16 = 80;

/// WS-Discovery probe for ONVIF devices
pub const ONVIF_PROBE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"
    xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
    xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery">
    <soap:Header>
        <wsa:Action xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing">
            http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe
        </wsa:Action>
        <wsa:MessageID xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing">
            uuid:NetworkScanner
        </wsa:MessageID>
        <wsa:To xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing">
            urn:schemas-xmlsoap-org:ws:2005:04:discovery
        </wsa:To>
    </soap:Header>
    <soap:Body>
        <d:Probe><d:Types>tds:Device</d:Types></d:Probe>
    </soap:Body>
</soap:Envelope>"#;

const SCOPE_NAME: &str = "onvif://www.onvif.org/name/";
const SCOPE_HARDWARE: &str = "onvif://www.onvif.org/hardware/";
const SCOPE_MANUFACTURER: &str = "onvif://www.onvif.org/mfr/";

/// Values carried in a ProbeMatch `Scopes` element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnvifScopes {
    pub name: Option<String>,
    pub hardware: Option<String>,
    pub manufacturer: Option<String>,
}

/// Send a WS-Discovery probe and merge every responder into `registry`.
///
/// Returns the number of replies seen. Failures end the listen early and are
/// only logged.
pub async fn discover(
    registry: &DeviceRegistry,
    listen_timeout: Duration,
    cancel: CancelSignal,
) -> usize {
    discover_at(ONVIF_MULTICAST, registry, listen_timeout, cancel).await
}

/// [`discover`] against an explicit destination
pub async fn discover_at(
    group: SocketAddr,
    registry: &DeviceRegistry,
    listen_timeout: Duration,
    cancel: CancelSignal,
) -> usize {
    let mut probe =
        match MulticastProbe::send(ONVIF_PROBE.as_bytes(), group, listen_timeout, cancel).await {
            Ok(probe) => probe,
            Err(e) => {
                debug!(error = %e, "ONVIF probe not sent");
                return 0;
            }
        };

    let mut replies = 0;
    loop {
        match probe.next_reply().await {
            Ok((from, payload)) => {
                let device = device_from_reply(from.ip(), &payload);
                debug!(
                    ip = %device.ip,
                    manufacturer = %device.manufacturer,
                    "ONVIF device responded"
                );
                registry.add_or_merge(device).await;
                replies += 1;
            }
            Err(ProbeError::NoReply(_)) => break,
            Err(e) => {
                debug!(error = %e, "ONVIF listen ended");
                break;
            }
        }
    }

    debug!(replies = replies, "ONVIF discovery finished");
    replies
}

/// Build a device record from a ProbeMatch reply
pub fn device_from_reply(ip: IpAddr, payload: &[u8]) -> DiscoveredDevice {
    let text = String::from_utf8_lossy(payload);
    let mut device =
        DiscoveredDevice::new(ip.to_string(), ONVIF_DEVICE_PORT, "onvif", DeviceType::Camera);

    if let Some(vendor) = infer_manufacturer(&text) {
        device.manufacturer = vendor.to_string();
    }

    if let Some(scopes) = parse_scopes(&text) {
        if device.manufacturer.is_empty() {
            device.manufacturer = scopes.manufacturer.unwrap_or_default();
        }
        device.name = scopes.name.unwrap_or_default();
        device.model = scopes.hardware.unwrap_or_default();
    }

    device
}

/// Pull name, hardware and manufacturer scopes out of a ProbeMatch.
///
/// Returns `None` if the XML doesn't parse.
pub fn parse_scopes(xml: &str) -> Option<OnvifScopes> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_scopes = false;
    let mut raw = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"Scopes" => in_scopes = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Scopes" => in_scopes = false,
            Ok(Event::Text(text)) if in_scopes => {
                let text = text.unescape().ok()?;
                raw.push(' ');
                raw.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                trace!(error = %e, "ONVIF reply is not well-formed XML");
                return None;
            }
            _ => {}
        }
    }

    let mut scopes = OnvifScopes::default();
    for scope in raw.split_whitespace() {
        if let Some(value) = scope_value(scope, SCOPE_NAME) {
            scopes.name.get_or_insert(value);
        } else if let Some(value) = scope_value(scope, SCOPE_HARDWARE) {
            scopes.hardware.get_or_insert(value);
        } else if let Some(value) = scope_value(scope, SCOPE_MANUFACTURER) {
            scopes.manufacturer.get_or_insert(value);
        }
    }
    Some(scopes)
}

fn scope_value(scope: &str, prefix: &str) -> Option<String> {
    let value = percent_decode(scope.strip_prefix(prefix)?);
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Decode `%XX` escapes; malformed escapes are kept as-is
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
