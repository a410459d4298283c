//! TCP port probing for camera and NVR services

use camscout_core::{DeviceType, DiscoveredDevice};
use futures_util::future;
use futures_util::stream::{self, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::cancel::CancelSignal;
use crate::error::ProbeError;
use crate::registry::DeviceRegistry;

/// Default connect timeout per probe
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of probes in flight
pub const DEFAULT_CONCURRENCY: usize = 50;

/// Well-known camera/NVR ports: (port, protocol, device type)
pub const CAMERA_PORTS: &[(u16, &str, DeviceType)] = &[
    (554, "rtsp", DeviceType::Camera),   // RTSP
    (8554, "rtsp", DeviceType::Camera),  // RTSP alt
    (80, "http", DeviceType::Unknown),   // HTTP
    (8080, "http", DeviceType::Unknown), // HTTP alt
    (443, "https", DeviceType::Unknown), // HTTPS
    (37777, "http", DeviceType::Nvr),    // Dahua
    (34567, "http", DeviceType::Nvr),    // XMEye
    (9000, "http", DeviceType::Nvr),     // Hikvision
];

/// Progress callback: (completed, total)
pub type ProgressFn<'a> = dyn Fn(usize, usize) + Send + Sync + 'a;

/// One row of a port table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub port: u16,
    pub protocol: &'static str,
    pub device_type: DeviceType,
}

/// The set of ports a sweep probes, and how each is classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortTable {
    entries: Vec<PortEntry>,
}

impl Default for PortTable {
    fn default() -> Self {
        Self::camera_defaults()
    }
}

impl PortTable {
    pub fn new(entries: Vec<PortEntry>) -> Self {
        Self { entries }
    }

    /// The built-in camera/NVR table
    pub fn camera_defaults() -> Self {
        Self::new(
            CAMERA_PORTS
                .iter()
                .map(|&(port, protocol, device_type)| PortEntry {
                    port,
                    protocol,
                    device_type,
                })
                .collect(),
        )
    }

    pub fn classify(&self, port: u16) -> Option<(&'static str, DeviceType)> {
        self.entries
            .iter()
            .find(|e| e.port == port)
            .map(|e| (e.protocol, e.device_type))
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().map(|e| e.port)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every `(ip, port)` pair for hosts .1 through .254 of a /24
    pub fn sweep_targets(&self, subnet: &str) -> Vec<(String, u16)> {
        (1..=254u8)
            .flat_map(|host| {
                self.ports()
                    .map(move |port| (format!("{}.{}", subnet, host), port))
            })
            .collect()
    }

    /// Probe one port. Ports missing from the table are never connected to.
    pub async fn probe(
        &self,
        ip: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Option<DiscoveredDevice> {
        match self.try_probe(ip, port, connect_timeout).await {
            Ok(device) => {
                debug!(ip = %ip, port = port, protocol = %device.protocol, "Port open");
                Some(device)
            }
            Err(e) => {
                trace!(ip = %ip, port = port, error = %e, "Probe found nothing");
                None
            }
        }
    }

    async fn try_probe(
        &self,
        ip: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<DiscoveredDevice, ProbeError> {
        let (protocol, device_type) = self
            .classify(port)
            .ok_or(ProbeError::UnmappedPort(port))?;
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| ProbeError::InvalidAddress(ip.to_string()))?;

        match timeout(connect_timeout, TcpStream::connect(SocketAddr::new(addr, port))).await {
            Ok(Ok(_stream)) => Ok(DiscoveredDevice::new(ip, port, protocol, device_type)),
            Ok(Err(e)) => Err(ProbeError::from_connect(e, connect_timeout)),
            Err(_) => Err(ProbeError::Timeout(connect_timeout)),
        }
    }

    /// Probe `targets` with at most `concurrency` connects in flight,
    /// merging every open port into `registry`.
    ///
    /// `on_progress` runs on this task after each completed probe, so
    /// `completed` counts up from 1 without gaps. Once `cancel` fires no new
    /// probes start. Returns the number of open ports found.
    pub async fn sweep(
        &self,
        targets: &[(String, u16)],
        connect_timeout: Duration,
        concurrency: usize,
        registry: &DeviceRegistry,
        on_progress: Option<&ProgressFn<'_>>,
        cancel: CancelSignal,
    ) -> usize {
        let total = targets.len();
        let mut completed = 0;
        let mut found = 0;

        debug!(
            targets = total,
            concurrency = concurrency,
            "Starting TCP port sweep"
        );

        let mut probes = stream::iter(targets.iter().cloned())
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(|(ip, port)| async move { self.probe(&ip, port, connect_timeout).await })
            .buffer_unordered(concurrency.max(1));

        while let Some(result) = probes.next().await {
            completed += 1;
            if let Some(report) = on_progress {
                report(completed, total);
            }
            if let Some(device) = result {
                registry.add_or_merge(device).await;
                found += 1;
            }
        }

        if completed < total {
            debug!(completed = completed, total = total, "Port sweep stopped early");
        }
        debug!(found = found, "Port sweep finished");
        found
    }
}

/// Probe a port against the built-in table
pub async fn probe(ip: &str, port: u16, connect_timeout: Duration) -> Option<DiscoveredDevice> {
    PortTable::camera_defaults()
        .probe(ip, port, connect_timeout)
        .await
}
