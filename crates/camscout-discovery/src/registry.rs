//! Deduplicated result set shared by all discovery sources

use camscout_core::{DeviceKey, DiscoveredDevice};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

use crate::scanner::DiscoveryEvent;

/// What `add_or_merge` did with a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No entry existed for the key
    Inserted,
    /// An existing entry gained at least one field
    Updated,
    /// The existing entry already had everything the new one offered
    Unchanged,
}

/// Devices found during one scan, keyed by `(ip, port)`
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceKey, DiscoveredDevice>>,
    event_tx: Option<broadcast::Sender<DiscoveryEvent>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            event_tx: None,
        }
    }

    /// Registry that reports inserts and merges on `event_tx`
    pub fn with_events(event_tx: broadcast::Sender<DiscoveryEvent>) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            event_tx: Some(event_tx),
        }
    }

    /// Insert a device, or fill in empty fields of the entry with the same key.
    ///
    /// The lookup and the update happen under one write guard, so two sources
    /// reporting the same key can't both insert.
    pub async fn add_or_merge(&self, device: DiscoveredDevice) -> MergeOutcome {
        let mut devices = self.devices.write().await;
        let key = device.key();

        let (outcome, snapshot) = match devices.get_mut(&key) {
            None => {
                trace!(key = %key, protocol = %device.protocol, "New device");
                devices.insert(key, device.clone());
                (MergeOutcome::Inserted, device)
            }
            Some(existing) => {
                if existing.merge_from(&device) {
                    debug!(key = %key, "Merged device details");
                    (MergeOutcome::Updated, existing.clone())
                } else {
                    (MergeOutcome::Unchanged, existing.clone())
                }
            }
        };
        drop(devices);

        self.notify(outcome, snapshot);
        outcome
    }

    /// Set the MAC on every entry for `ip` that has none. Returns entries changed.
    pub async fn fill_mac(&self, ip: &str, mac: &str) -> usize {
        if mac.is_empty() {
            return 0;
        }

        let mut updated = Vec::new();
        {
            let mut devices = self.devices.write().await;
            for device in devices.values_mut().filter(|d| d.ip == ip && d.mac.is_empty()) {
                device.mac = mac.to_string();
                updated.push(device.clone());
            }
        }

        let count = updated.len();
        for device in updated {
            self.notify(MergeOutcome::Updated, device);
        }
        count
    }

    pub async fn get(&self, key: &DeviceKey) -> Option<DiscoveredDevice> {
        self.devices.read().await.get(key).cloned()
    }

    /// Distinct IPs currently in the registry
    pub async fn ips(&self) -> Vec<String> {
        let devices = self.devices.read().await;
        let mut ips: Vec<String> = devices.keys().map(|k| k.ip.clone()).collect();
        ips.sort();
        ips.dedup();
        ips
    }

    /// Owned copy of every entry; order is unspecified
    pub async fn snapshot(&self) -> Vec<DiscoveredDevice> {
        self.devices.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.devices.write().await.clear();
    }

    fn notify(&self, outcome: MergeOutcome, device: DiscoveredDevice) {
        let Some(tx) = &self.event_tx else {
            return;
        };
        let event = match outcome {
            MergeOutcome::Inserted => DiscoveryEvent::DeviceDiscovered(device),
            MergeOutcome::Updated => DiscoveryEvent::DeviceUpdated(device),
            MergeOutcome::Unchanged => return,
        };
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camscout_core::DeviceType;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_then_merge() {
        let registry = DeviceRegistry::new();
        let first = DiscoveredDevice::new("10.0.0.7", 80, "onvif", DeviceType::Camera)
            .with_manufacturer("Hikvision");
        let second = DiscoveredDevice::new("10.0.0.7", 80, "http", DeviceType::Camera)
            .with_manufacturer("Dahua")
            .with_name("HikServer/1.0");

        assert_eq!(registry.add_or_merge(first).await, MergeOutcome::Inserted);
        assert_eq!(registry.add_or_merge(second).await, MergeOutcome::Updated);

        let stored = registry.get(&DeviceKey::new("10.0.0.7", 80)).await.unwrap();
        assert_eq!(stored.manufacturer, "Hikvision");
        assert_eq!(stored.name, "HikServer/1.0");
        assert_eq!(stored.protocol, "onvif");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_fields_never_overwrite() {
        let registry = DeviceRegistry::new();
        let first = DiscoveredDevice::new("10.0.0.7", 80, "onvif", DeviceType::Camera)
            .with_manufacturer("Axis");
        let empty = DiscoveredDevice::new("10.0.0.7", 80, "onvif", DeviceType::Camera);

        registry.add_or_merge(first).await;
        assert_eq!(registry.add_or_merge(empty.clone()).await, MergeOutcome::Unchanged);
        assert_eq!(registry.add_or_merge(empty).await, MergeOutcome::Unchanged);

        let stored = registry.get(&DeviceKey::new("10.0.0.7", 80)).await.unwrap();
        assert_eq!(stored.manufacturer, "Axis");
    }

    #[tokio::test]
    async fn test_type_and_protocol_never_downgraded() {
        let registry = DeviceRegistry::new();
        registry
            .add_or_merge(DiscoveredDevice::new("10.0.0.8", 37777, "http", DeviceType::Nvr))
            .await;
        registry
            .add_or_merge(DiscoveredDevice::new("10.0.0.8", 37777, "", DeviceType::Unknown))
            .await;

        let stored = registry.get(&DeviceKey::new("10.0.0.8", 37777)).await.unwrap();
        assert_eq!(stored.device_type, DeviceType::Nvr);
        assert_eq!(stored.protocol, "http");
        assert_eq!(stored.url, "http://10.0.0.8:37777/");
    }

    #[tokio::test]
    async fn test_same_ip_different_ports_stay_separate() {
        let registry = DeviceRegistry::new();
        registry
            .add_or_merge(DiscoveredDevice::new("10.0.0.7", 554, "rtsp", DeviceType::Camera))
            .await;
        registry
            .add_or_merge(
                DiscoveredDevice::new("10.0.0.7", 80, "onvif", DeviceType::Camera)
                    .with_manufacturer("Dahua"),
            )
            .await;

        assert_eq!(registry.len().await, 2);
        let rtsp = registry.get(&DeviceKey::new("10.0.0.7", 554)).await.unwrap();
        assert_eq!(rtsp.manufacturer, "");
        assert_eq!(registry.ips().await, vec!["10.0.0.7".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_merges_keep_one_entry() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut handles = Vec::new();

        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let device = DiscoveredDevice::new("10.0.0.9", 80, "http", DeviceType::Camera)
                    .with_name(format!("source-{}", i));
                registry.add_or_merge(device).await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() == MergeOutcome::Inserted {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(registry.len().await, 1);
        let stored = registry.get(&DeviceKey::new("10.0.0.9", 80)).await.unwrap();
        assert!(stored.name.starts_with("source-"));
    }

    #[tokio::test]
    async fn test_fill_mac_only_when_empty() {
        let registry = DeviceRegistry::new();
        registry
            .add_or_merge(DiscoveredDevice::new("10.0.0.7", 554, "rtsp", DeviceType::Camera))
            .await;
        registry
            .add_or_merge(DiscoveredDevice::new("10.0.0.7", 80, "onvif", DeviceType::Camera))
            .await;

        assert_eq!(registry.fill_mac("10.0.0.7", "aa:bb:cc:dd:ee:ff").await, 2);
        assert_eq!(registry.fill_mac("10.0.0.7", "11:22:33:44:55:66").await, 0);
        assert_eq!(registry.fill_mac("10.0.0.8", "11:22:33:44:55:66").await, 0);

        let stored = registry.get(&DeviceKey::new("10.0.0.7", 80)).await.unwrap();
        assert_eq!(stored.mac, "aa:bb:cc:dd:ee:ff");
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let (tx, mut rx) = broadcast::channel(16);
        let registry = DeviceRegistry::with_events(tx);

        let device = DiscoveredDevice::new("10.0.0.7", 80, "onvif", DeviceType::Camera);
        registry.add_or_merge(device.clone()).await;
        registry.add_or_merge(device.clone()).await;
        registry
            .add_or_merge(device.with_manufacturer("Axis"))
            .await;

        assert!(matches!(rx.recv().await.unwrap(), DiscoveryEvent::DeviceDiscovered(_)));
        match rx.recv().await.unwrap() {
            DiscoveryEvent::DeviceUpdated(d) => assert_eq!(d.manufacturer, "Axis"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear() {
        let registry = DeviceRegistry::new();
        registry
            .add_or_merge(DiscoveredDevice::new("10.0.0.7", 80, "http", DeviceType::Unknown))
            .await;
        registry.clear().await;
        assert!(registry.is_empty().await);
    }
}
