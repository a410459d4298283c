//! Rendering scan results for the terminal

use camscout_core::{DeviceType, DiscoveredDevice};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use serde::Serialize;

/// JSON shape of one device
#[derive(Debug, Serialize)]
struct JsonDevice<'a> {
    ip: &'a str,
    port: u16,
    protocol: &'a str,
    #[serde(rename = "type")]
    device_type: DeviceType,
    manufacturer: &'a str,
    model: &'a str,
    url: &'a str,
}

impl<'a> From<&'a DiscoveredDevice> for JsonDevice<'a> {
    fn from(d: &'a DiscoveredDevice) -> Self {
        Self {
            ip: &d.ip,
            port: d.port,
            protocol: &d.protocol,
            device_type: d.device_type,
            manufacturer: &d.manufacturer,
            model: &d.model,
            url: &d.url,
        }
    }
}

/// Pretty-printed JSON array of devices
pub fn render_json(devices: &[DiscoveredDevice]) -> serde_json::Result<String> {
    let rows: Vec<JsonDevice<'_>> = devices.iter().map(JsonDevice::from).collect();
    serde_json::to_string_pretty(&rows)
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

/// Result table with a "Found N device(s)" title
pub fn render_table(devices: &[DiscoveredDevice]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Type",
        "IP Address",
        "Port",
        "Protocol",
        "Manufacturer",
        "MAC",
        "URL",
    ]);

    for d in devices {
        table.add_row(vec![
            Cell::new(d.device_type),
            Cell::new(&d.ip),
            Cell::new(d.port),
            Cell::new(d.protocol.to_uppercase()),
            Cell::new(or_dash(&d.manufacturer)),
            Cell::new(or_dash(&d.mac)),
            Cell::new(&d.url),
        ]);
    }

    format!("Found {} device(s)\n{}", devices.len(), table)
}

/// Suggested follow-up for the first usable device
///
/// Prefers an RTSP stream; otherwise points at the usual snapshot path of the
/// first HTTP device.
pub fn next_steps(devices: &[DiscoveredDevice]) -> Option<String> {
    if let Some(d) = devices.iter().find(|d| d.protocol == "rtsp") {
        return Some(format!(
            "Next steps:\n  Open a stream with any RTSP client:\n\n  ffplay \"{}\"",
            d.url
        ));
    }

    devices.iter().find(|d| d.protocol == "http").map(|d| {
        format!(
            "Next steps:\n  Try fetching a snapshot:\n\n  curl -o snapshot.jpg \"http://{}/snapshot.jpg\"",
            d.ip
        )
    })
}

/// Shown when a scan finds nothing
pub const EMPTY_TIPS: &str = "No devices found.\n\n\
Tips:\n  \
  - Make sure cameras are powered on and connected\n  \
  - Try a different subnet with -s <subnet>\n  \
  - Increase timeout with -t 2.0";
