//! Device types for tracking discovered cameras and recorders

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::net::Ipv4Addr;

/// Classification of a discovered device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// IP camera
    Camera,
    /// Network video recorder
    Nvr,
    /// Something answered, but nothing more is known
    Unknown,
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Nvr => "nvr",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a device within one scan: `(ip, port)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceKey {
    pub ip: String,
    pub port: u16,
}

impl DeviceKey {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// A discovered camera, recorder or candidate endpoint
///
/// `url` is derived once from `protocol`, `ip` and `port` when the device is
/// built and is not recomputed if those fields change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Dotted-quad address the device answered from
    pub ip: String,
    /// Port the device was found on
    pub port: u16,
    /// Camera / NVR / unknown
    pub device_type: DeviceType,
    /// Transport hint: rtsp, http, https, onvif or empty
    pub protocol: String,
    /// Friendly name reported by the device
    #[serde(default)]
    pub name: String,
    /// Vendor, when it could be inferred
    #[serde(default)]
    pub manufacturer: String,
    /// Hardware model, when reported
    #[serde(default)]
    pub model: String,
    /// MAC address from the neighbour table
    #[serde(default)]
    pub mac: String,
    /// Stream or management URL
    pub url: String,
}

impl DiscoveredDevice {
    /// Create a device, deriving its URL from protocol, ip and port
    pub fn new(
        ip: impl Into<String>,
        port: u16,
        protocol: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        let ip = ip.into();
        let protocol = protocol.into();
        let url = build_url(&protocol, &ip, port);
        Self {
            ip,
            port,
            device_type,
            protocol,
            name: String::new(),
            manufacturer: String::new(),
            model: String::new(),
            mac: String::new(),
            url,
        }
    }

    /// Replace the derived URL with an explicit one (ignored when empty)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.is_empty() {
            self.url = url;
        }
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.ip.clone(), self.port)
    }

    /// Fill empty enrichment fields from `other`.
    ///
    /// Only `manufacturer`, `model`, `name` and `mac` are touched, and only
    /// when currently empty. Returns true if anything changed.
    pub fn merge_from(&mut self, other: &DiscoveredDevice) -> bool {
        let mut changed = false;
        changed |= fill_empty(&mut self.manufacturer, &other.manufacturer);
        changed |= fill_empty(&mut self.model, &other.model);
        changed |= fill_empty(&mut self.name, &other.name);
        changed |= fill_empty(&mut self.mac, &other.mac);
        changed
    }

    /// Human-readable label: "manufacturer model (name)", or "type@ip"
    pub fn display_name(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.manufacturer.is_empty() {
            parts.push(self.manufacturer.clone());
        }
        if !self.model.is_empty() {
            parts.push(self.model.clone());
        }
        if !self.name.is_empty() {
            parts.push(format!("({})", self.name));
        }
        if parts.is_empty() {
            format!("{}@{}", self.device_type, self.ip)
        } else {
            parts.join(" ")
        }
    }
}

fn fill_empty(field: &mut String, value: &str) -> bool {
    if field.is_empty() && !value.is_empty() {
        *field = value.to_string();
        true
    } else {
        false
    }
}

/// Derive the URL for a device from its protocol
pub fn build_url(protocol: &str, ip: &str, port: u16) -> String {
    match protocol {
        "rtsp" => format!("rtsp://{}:{}/stream", ip, port),
        "http" | "onvif" => format!("http://{}:{}/", ip, port),
        _ => format!("{}:{}", ip, port),
    }
}

/// Sort devices by numeric IPv4 address, then port.
///
/// Addresses that don't parse sort after valid ones, by string.
pub fn sort_by_ip(devices: &mut [DiscoveredDevice]) {
    devices.sort_by(|a, b| compare_ip(&a.ip, &b.ip).then(a.port.cmp(&b.port)));
}

fn compare_ip(a: &str, b: &str) -> Ordering {
    match (a.parse::<Ipv4Addr>(), b.parse::<Ipv4Addr>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
