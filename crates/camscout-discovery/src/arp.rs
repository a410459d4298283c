//! MAC enrichment from the kernel neighbour (ARP) table

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tokio::process::Command;
use tracing::debug;

use crate::registry::DeviceRegistry;

/// Neighbour table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: String,
    pub state: ArpState,
}

/// Neighbour entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
    Incomplete,
    Permanent,
    Unknown,
}

impl ArpState {
    /// Whether the MAC in this entry can be trusted
    pub fn has_address(&self) -> bool {
        !matches!(self, Self::Failed | Self::Incomplete)
    }
}

/// Read the neighbour table via `ip neigh show`
pub async fn get_arp_table() -> std::io::Result<Vec<ArpEntry>> {
    let output = Command::new("ip").args(["neigh", "show"]).output().await?;

    if !output.status.success() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!(
                "ip neigh failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let entries: Vec<ArpEntry> = stdout.lines().filter_map(parse_ip_neigh_line).collect();
    debug!("Found {} ARP entries", entries.len());
    Ok(entries)
}

/// IP → MAC for entries that carry a usable address
pub fn mac_map(entries: &[ArpEntry]) -> HashMap<String, String> {
    entries
        .iter()
        .filter(|e| e.state.has_address() && !e.mac.is_empty())
        .map(|e| (e.ip.to_string(), e.mac.to_lowercase()))
        .collect()
}

/// Fill empty `mac` fields in `registry` from the neighbour table.
///
/// Returns the number of entries updated; a missing `ip` tool counts as zero.
pub async fn enrich_macs(registry: &DeviceRegistry) -> usize {
    let entries = match get_arp_table().await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(error = %e, "Neighbour table unavailable, skipping MAC lookup");
            return 0;
        }
    };

    let macs = mac_map(&entries);
    let mut updated = 0;
    for ip in registry.ips().await {
        if let Some(mac) = macs.get(&ip) {
            updated += registry.fill_mac(&ip, mac).await;
        }
    }

    debug!(updated = updated, "MAC enrichment finished");
    updated
}

/// Parse a line from `ip neigh show` output
fn parse_ip_neigh_line(line: &str) -> Option<ArpEntry> {
    // Format: "192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE"
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() < 4 {
        return None;
    }

    let ip = Ipv4Addr::from_str(parts[0]).ok()?;

    // INCOMPLETE and FAILED entries carry no lladdr
    let mac = parts
        .iter()
        .position(|&p| p == "lladdr")
        .and_then(|idx| parts.get(idx + 1))
        .map(|s| s.to_string())
        .unwrap_or_default();

    let state = parts
        .last()
        .map(|s| parse_arp_state(s))
        .unwrap_or(ArpState::Unknown);

    Some(ArpEntry { ip, mac, state })
}

fn parse_arp_state(s: &str) -> ArpState {
    match s.to_uppercase().as_str() {
        "REACHABLE" => ArpState::Reachable,
        "STALE" => ArpState::Stale,
        "DELAY" => ArpState::Delay,
        "PROBE" => ArpState::Probe,
        "FAILED" => ArpState::Failed,
        "INCOMPLETE" => ArpState::Incomplete,
        "PERMANENT" => ArpState::Permanent,
        _ => ArpState::Unknown,
    }
}
