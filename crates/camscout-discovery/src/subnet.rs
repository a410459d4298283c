//! Local /24 detection

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use tracing::debug;

/// Subnet used when the local route can't be determined
pub const FALLBACK_SUBNET: &str = "192.168.1";

/// Public address used only to pick a route; nothing is sent to it
const RENDEZVOUS_ADDR: &str = "8.8.8.8:80";

/// Detect the first three octets of the local IPv4 address.
///
/// Falls back to [`FALLBACK_SUBNET`] when there is no route or the local
/// address isn't IPv4.
pub fn detect_subnet() -> String {
    detect_subnet_with(local_route_addr)
}

/// Same as [`detect_subnet`], with the local-address lookup supplied
pub fn detect_subnet_with<F>(lookup: F) -> String
where
    F: FnOnce() -> io::Result<SocketAddr>,
{
    match lookup() {
        Ok(addr) => match subnet_of(addr.ip()) {
            Some(subnet) => {
                debug!(local = %addr.ip(), subnet = %subnet, "Detected local subnet");
                subnet
            }
            None => {
                debug!(local = %addr.ip(), "Local address not usable, using fallback subnet");
                FALLBACK_SUBNET.to_string()
            }
        },
        Err(e) => {
            debug!(error = %e, "Subnet detection failed, using fallback subnet");
            FALLBACK_SUBNET.to_string()
        }
    }
}

/// Connecting a UDP socket only binds a route, no packet leaves the host
fn local_route_addr() -> io::Result<SocketAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(RENDEZVOUS_ADDR)?;
    socket.local_addr()
}

/// First three octets of an IPv4 address, e.g. "192.168.1"
pub fn subnet_of(ip: IpAddr) -> Option<String> {
    match ip {
        IpAddr::V4(v4) if !v4.is_unspecified() => {
            let [a, b, c, _] = v4.octets();
            Some(format!("{}.{}.{}", a, b, c))
        }
        _ => None,
    }
}

/// Normalize user input into a /24 prefix.
///
/// Accepts "10.0.0", "10.0.0.0", "10.0.0.17" and "10.0.0.0/24".
pub fn parse_subnet(input: &str) -> Option<String> {
    let input = input.trim();
    let (addr, prefix) = match input.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (input, None),
    };

    if let Some(prefix) = prefix {
        if prefix.trim() != "24" {
            return None;
        }
    }

    let octets: Vec<&str> = addr.split('.').collect();
    let full = match octets.len() {
        3 => format!("{}.0", addr),
        4 => addr.to_string(),
        _ => return None,
    };

    let ip: Ipv4Addr = full.parse().ok()?;
    subnet_of(IpAddr::V4(ip))
}
