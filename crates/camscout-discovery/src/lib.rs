//! camscout Discovery - Network discovery for IP cameras and NVRs
//!
//! This crate provides three discovery methods that run concurrently:
//! - TCP port sweep of well-known camera and NVR ports across a /24
//! - ONVIF WS-Discovery multicast probing
//! - UPnP/SSDP multicast search
//!
//! Results are merged into one set keyed by `(ip, port)`. No discovery
//! failure is reported as an error; a failing method just finds nothing.

pub mod arp;
pub mod cancel;
pub mod error;
pub mod multicast;
pub mod onvif;
pub mod probe;
pub mod registry;
pub mod scanner;
pub mod subnet;
pub mod upnp;

pub use cancel::CancelSignal;
pub use error::ProbeError;
pub use probe::{probe, PortEntry, PortTable, ProgressFn, CAMERA_PORTS};
pub use registry::{DeviceRegistry, MergeOutcome};
pub use scanner::{DiscoveryEvent, DiscoveryScanner, ScanSources, ScannerConfig};
pub use subnet::{detect_subnet, parse_subnet, FALLBACK_SUBNET};
