//! UPnP/SSDP discovery
//!
//! SSDP answers come from every kind of device on a LAN, so replies are kept
//! only when the payload mentions something camera-like.

use camscout_core::{DeviceType, DiscoveredDevice};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tracing::{debug, trace};

use crate::cancel::CancelSignal;
use crate::error::ProbeError;
use crate::multicast::{infer_manufacturer, MulticastProbe};
use crate::registry::DeviceRegistry;

/// SSDP multicast group
pub const SSDP_MULTICAST: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900));

/// Port recorded for every accepted SSDP responder
pub const SSDP_DEVICE_PORT: u16 = 80;

/// Search for all SSDP services
pub const SSDP_SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
                               HOST: 239.255.255.250:1900\r\n\
                               MAN: \"ssdp:discover\"\r\n\
                               MX: 2\r\n\
                               ST: ssdp:all\r\n\
                               \r\n";

/// A reply must contain one of these (lowercase) to count as a camera
const CAMERA_KEYWORDS: &[&str] = &[
    "camera",
    "nvr",
    "ipcam",
    "video",
    "rtsp",
    "hikvision",
    "dahua",
    "axis",
    "onvif",
];

/// Send an M-SEARCH and merge every camera-like responder into `registry`.
///
/// Returns the number of replies accepted.
pub async fn discover(
    registry: &DeviceRegistry,
    listen_timeout: Duration,
    cancel: CancelSignal,
) -> usize {
    discover_at(SSDP_MULTICAST, registry, listen_timeout, cancel).await
}

/// [`discover`] against an explicit destination
pub async fn discover_at(
    group: SocketAddr,
    registry: &DeviceRegistry,
    listen_timeout: Duration,
    cancel: CancelSignal,
) -> usize {
    let mut probe =
        match MulticastProbe::send(SSDP_SEARCH.as_bytes(), group, listen_timeout, cancel).await {
            Ok(probe) => probe,
            Err(e) => {
                debug!(error = %e, "SSDP search not sent");
                return 0;
            }
        };

    let mut accepted = 0;
    loop {
        match probe.next_reply().await {
            Ok((from, payload)) => match device_from_reply(from.ip(), &payload) {
                Some(device) => {
                    debug!(ip = %device.ip, server = %device.name, "SSDP camera responded");
                    registry.add_or_merge(device).await;
                    accepted += 1;
                }
                None => trace!(from = %from, "Ignoring non-camera SSDP reply"),
            },
            Err(ProbeError::NoReply(_)) => break,
            Err(e) => {
                debug!(error = %e, "SSDP listen ended");
                break;
            }
        }
    }

    debug!(accepted = accepted, "SSDP discovery finished");
    accepted
}

/// True when the payload mentions a camera keyword
pub fn is_camera_reply(payload: &str) -> bool {
    let lower = payload.to_lowercase();
    CAMERA_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Build a device from an SSDP reply, or `None` if it isn't camera-like
pub fn device_from_reply(ip: IpAddr, payload: &[u8]) -> Option<DiscoveredDevice> {
    let text = String::from_utf8_lossy(payload);
    if !is_camera_reply(&text) {
        return None;
    }

    let mut device =
        DiscoveredDevice::new(ip.to_string(), SSDP_DEVICE_PORT, "http", DeviceType::Camera);

    if let Some(vendor) = infer_manufacturer(&text) {
        device.manufacturer = vendor.to_string();
    }
    if let Some(server) = parse_headers(&text).remove("server") {
        device.name = server;
    }

    Some(device)
}

/// Header map of an SSDP message, names lowercased
pub fn parse_headers(text: &str) -> HashMap<String, String> {
    text.lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_string()))
        .filter(|(name, value)| !name.is_empty() && !value.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camscout_core::DeviceKey;
    use tokio::net::UdpSocket;

    const CAMERA_REPLY: &str = "HTTP/1.1 200 OK\r\n\
        CACHE-CONTROL: max-age=1800\r\n\
        LOCATION: http://10.0.0.7:49152/description.xml\r\n\
        Server: Linux/3.10 UPnP/1.0 IPCam/1.0\r\n\
        ST: urn:schemas-upnp-org:device:Basic:1\r\n\
        USN: uuid:abc::urn:schemas-upnp-org:device:Basic:1\r\n\r\n";

    const ROUTER_REPLY: &str = "HTTP/1.1 200 OK\r\n\
        LOCATION: http://10.0.0.1:1900/igd.xml\r\n\
        SERVER: Linux UPnP/1.0 MiniUPnPd/2.1\r\n\
        ST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\n\r\n";

    #[test]
    fn test_search_payload() {
        assert!(SSDP_SEARCH.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(SSDP_SEARCH.contains("ST: ssdp:all\r\n"));
        assert!(SSDP_SEARCH.contains("MX: 2\r\n"));
        assert!(SSDP_SEARCH.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(SSDP_SEARCH.ends_with("\r\n\r\n"));
        assert_eq!(SSDP_MULTICAST.to_string(), "239.255.255.250:1900");
    }

    #[test]
    fn test_keyword_filter() {
        assert!(is_camera_reply(CAMERA_REPLY));
        assert!(is_camera_reply("SERVER: DAHUA"));
        assert!(is_camera_reply("ST: urn:schemas-onvif-org"));
        assert!(!is_camera_reply(ROUTER_REPLY));
    }

    #[test]
    fn test_camera_reply_becomes_device() {
        let device = device_from_reply("10.0.0.7".parse().unwrap(), CAMERA_REPLY.as_bytes())
            .expect("camera reply accepted");
        assert_eq!(device.key(), DeviceKey::new("10.0.0.7", 80));
        assert_eq!(device.protocol, "http");
        assert_eq!(device.device_type, DeviceType::Camera);
        assert_eq!(device.url, "http://10.0.0.7:80/");
        assert_eq!(device.name, "Linux/3.10 UPnP/1.0 IPCam/1.0");
        assert_eq!(device.manufacturer, "");
    }

    #[test]
    fn test_router_reply_dropped() {
        assert!(device_from_reply("10.0.0.1".parse().unwrap(), ROUTER_REPLY.as_bytes()).is_none());
    }

    #[test]
    fn test_vendor_from_ssdp() {
        let reply = "HTTP/1.1 200 OK\r\nSERVER: Hikvision-Webs\r\n\r\n";
        let device = device_from_reply("10.0.0.3".parse().unwrap(), reply.as_bytes()).unwrap();
        assert_eq!(device.manufacturer, "Hikvision");
        assert_eq!(device.name, "Hikvision-Webs");
    }

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(CAMERA_REPLY);
        assert_eq!(
            headers.get("location").map(String::as_str),
            Some("http://10.0.0.7:49152/description.xml")
        );
        assert_eq!(headers.get("cache-control").map(String::as_str), Some("max-age=1800"));
        assert!(!headers.contains_key("http/1.1 200 ok"));
    }

    #[tokio::test]
    async fn test_discover_filters_replies() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = responder.local_addr().unwrap();

        let fake = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let (len, from) = responder.recv_from(&mut buf).await.unwrap();
            responder.send_to(ROUTER_REPLY.as_bytes(), from).await.unwrap();
            responder.send_to(CAMERA_REPLY.as_bytes(), from).await.unwrap();
            String::from_utf8_lossy(&buf[..len]).to_string()
        });

        let registry = DeviceRegistry::new();
        let accepted = discover_at(
            target,
            &registry,
            Duration::from_millis(300),
            CancelSignal::never(),
        )
        .await;

        let search = fake.await.unwrap();
        assert!(search.starts_with("M-SEARCH"));
        assert_eq!(accepted, 1);
        assert_eq!(registry.len().await, 1);
    }
}
