//! camscout Core - Device model for camera and NVR discovery
//!
//! This crate provides the value types shared by the discovery engine and
//! its consumers:
//! - Device classification (camera, NVR, unknown)
//! - Discovered device records with derived stream URLs
//! - The `(ip, port)` identity key used to deduplicate results

pub mod device;

pub use device::{build_url, sort_by_ip, DeviceKey, DeviceType, DiscoveredDevice};
