//! Discovery scanner that runs all discovery methods together

use camscout_core::DiscoveredDevice;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::arp::enrich_macs;
use crate::cancel::CancelSignal;
use crate::multicast::DEFAULT_LISTEN_TIMEOUT;
use crate::onvif::ONVIF_MULTICAST;
use crate::probe::{PortTable, ProgressFn, DEFAULT_CONCURRENCY, DEFAULT_CONNECT_TIMEOUT};
use crate::registry::DeviceRegistry;
use crate::subnet::detect_subnet;
use crate::upnp::SSDP_MULTICAST;
use crate::{onvif, upnp};

/// How long a scan waits for the multicast listeners after the sweep
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// /24 prefix to sweep, e.g. "192.168.1". Detected when `None`.
    pub subnet: Option<String>,
    /// Connect timeout for each TCP probe
    pub connect_timeout: Duration,
    /// Maximum TCP probes in flight
    pub concurrency: usize,
    /// Silence that ends a multicast listen
    pub listen_timeout: Duration,
    /// Bounded wait for the multicast tasks once the sweep is done
    pub join_timeout: Duration,
    /// Fill MACs from the neighbour table after the scan
    pub use_arp: bool,
    /// Ports the sweep probes
    pub ports: PortTable,
    /// Where the WS-Discovery probe is sent
    pub onvif_group: SocketAddr,
    /// Where the SSDP M-SEARCH is sent
    pub ssdp_group: SocketAddr,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            subnet: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            listen_timeout: DEFAULT_LISTEN_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            use_arp: true,
            ports: PortTable::camera_defaults(),
            onvif_group: ONVIF_MULTICAST,
            ssdp_group: SSDP_MULTICAST,
        }
    }
}

/// Which discovery methods a scan runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSources {
    #[serde(default = "default_true")]
    pub port_scan: bool,
    #[serde(default = "default_true")]
    pub onvif: bool,
    #[serde(default = "default_true")]
    pub upnp: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScanSources {
    fn default() -> Self {
        Self::all()
    }
}

impl ScanSources {
    pub fn all() -> Self {
        Self {
            port_scan: true,
            onvif: true,
            upnp: true,
        }
    }

    pub fn none() -> Self {
        Self {
            port_scan: false,
            onvif: false,
            upnp: false,
        }
    }

    /// Labels of the enabled methods
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods = Vec::new();
        if self.port_scan {
            methods.push("Port scan");
        }
        if self.onvif {
            methods.push("ONVIF");
        }
        if self.upnp {
            methods.push("UPnP");
        }
        methods
    }
}

/// Discovery event for real-time updates
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// Scan started
    ScanStarted,
    /// A new `(ip, port)` was found
    DeviceDiscovered(DiscoveredDevice),
    /// A known device gained details
    DeviceUpdated(DiscoveredDevice),
    /// Scan completed
    ScanCompleted { found: usize },
}

/// Discovery scanner service
pub struct DiscoveryScanner {
    config: ScannerConfig,
    subnet: watch::Sender<String>,
    registry: Arc<DeviceRegistry>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
    cancel_tx: watch::Sender<bool>,
}

impl DiscoveryScanner {
    /// Create a scanner, detecting the subnet if the config has none
    pub fn new(config: ScannerConfig) -> Self {
        let (subnet, _) = watch::channel(resolve_subnet(&config));
        let (event_tx, _) = broadcast::channel(256);
        let (cancel_tx, _) = watch::channel(false);

        Self {
            registry: Arc::new(DeviceRegistry::with_events(event_tx.clone())),
            config,
            subnet,
            event_tx,
            cancel_tx,
        }
    }

    /// The /24 prefix the last (or next) scan sweeps
    pub fn subnet(&self) -> String {
        self.subnet.borrow().clone()
    }

    /// Subscribe to discovery events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// Stop the scan in progress. It returns what was found so far.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
        debug!("Scan cancellation requested");
    }

    fn cancel_signal(&self) -> CancelSignal {
        CancelSignal::new(self.cancel_tx.subscribe())
    }

    /// Run one scan with the given methods.
    ///
    /// ONVIF and SSDP run as background tasks while the TCP sweep runs on the
    /// calling task. Every failure is absorbed, so the result is just the
    /// devices found, possibly none. Order is unspecified.
    pub async fn scan(
        &self,
        sources: ScanSources,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Vec<DiscoveredDevice> {
        self.cancel_tx.send_replace(false);
        self.registry.clear().await;
        let _ = self.event_tx.send(DiscoveryEvent::ScanStarted);

        // Re-detected every scan so a reused scanner follows network changes
        let subnet = resolve_subnet(&self.config);
        self.subnet.send_replace(subnet.clone());

        info!(
            subnet = %subnet,
            methods = ?sources.methods(),
            "Starting discovery scan"
        );

        let mut listeners: Vec<(&'static str, JoinHandle<usize>)> = Vec::new();

        if sources.onvif {
            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel_signal();
            let listen_timeout = self.config.listen_timeout;
            let group = self.config.onvif_group;
            listeners.push((
                "onvif",
                tokio::spawn(async move {
                    onvif::discover_at(group, &registry, listen_timeout, cancel).await
                }),
            ));
        }

        if sources.upnp {
            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel_signal();
            let listen_timeout = self.config.listen_timeout;
            let group = self.config.ssdp_group;
            listeners.push((
                "upnp",
                tokio::spawn(async move {
                    upnp::discover_at(group, &registry, listen_timeout, cancel).await
                }),
            ));
        }

        if sources.port_scan && self.config.ports.is_empty() {
            debug!("Port table is empty, skipping TCP sweep");
        } else if sources.port_scan {
            let targets = self.config.ports.sweep_targets(&subnet);
            self.config
                .ports
                .sweep(
                    &targets,
                    self.config.connect_timeout,
                    self.config.concurrency,
                    &self.registry,
                    on_progress,
                    self.cancel_signal(),
                )
                .await;
        }

        for (method, mut handle) in listeners {
            match timeout(self.config.join_timeout, &mut handle).await {
                Ok(Ok(found)) => debug!(method = method, found = found, "Listener finished"),
                Ok(Err(e)) => debug!(method = method, error = %e, "Listener task failed"),
                Err(_) => {
                    handle.abort();
                    debug!(method = method, "Listener still running after join wait, aborted");
                }
            }
        }

        let cancelled = *self.cancel_tx.borrow();
        if self.config.use_arp && !cancelled {
            enrich_macs(&self.registry).await;
        }

        let devices = self.registry.snapshot().await;
        let _ = self.event_tx.send(DiscoveryEvent::ScanCompleted {
            found: devices.len(),
        });

        info!("Scan complete: {} devices found", devices.len());
        devices
    }
}

fn resolve_subnet(config: &ScannerConfig) -> String {
    config.subnet.clone().unwrap_or_else(detect_subnet)
}
