//! Configuration loading and validation

use anyhow::{bail, Context, Result};
use camscout_discovery::{parse_subnet, ScanSources, ScannerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub multicast: MulticastConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// /24 prefix to sweep, e.g. "192.168.1" (auto-detected when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    /// TCP connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
    /// Maximum TCP probes in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Enabled discovery methods
    #[serde(flatten)]
    pub sources: ScanSources,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            subnet: None,
            timeout_secs: default_timeout(),
            concurrency: default_concurrency(),
            sources: ScanSources::all(),
        }
    }
}

fn default_timeout() -> f64 {
    1.0
}

fn default_concurrency() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticastConfig {
    /// Silence in seconds that ends an ONVIF/SSDP listen
    #[serde(default = "default_listen_timeout")]
    pub listen_timeout_secs: f64,
    /// How long to wait for the listeners once the sweep is done
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: f64,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            listen_timeout_secs: default_listen_timeout(),
            join_timeout_secs: default_join_timeout(),
        }
    }
}

fn default_listen_timeout() -> f64 {
    3.0
}

fn default_join_timeout() -> f64 {
    5.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Fill MAC addresses from the kernel neighbour table
    #[serde(default = "default_true")]
    pub arp: bool,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self { arp: true }
    }
}

fn default_true() -> bool {
    true
}

/// Load configuration from file, falling back to defaults when it is missing
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Write the default configuration to `path`
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

impl Config {
    /// Convert to scanner configuration, validating subnet and durations
    pub fn to_scanner_config(&self) -> Result<ScannerConfig> {
        let subnet = match &self.scan.subnet {
            Some(raw) => match parse_subnet(raw) {
                Some(subnet) => Some(subnet),
                None => bail!("invalid subnet {raw:?}, expected e.g. 192.168.1"),
            },
            None => None,
        };

        if self.scan.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        Ok(ScannerConfig {
            subnet,
            connect_timeout: seconds("scan.timeout_secs", self.scan.timeout_secs)?,
            concurrency: self.scan.concurrency,
            listen_timeout: seconds(
                "multicast.listen_timeout_secs",
                self.multicast.listen_timeout_secs,
            )?,
            join_timeout: seconds(
                "multicast.join_timeout_secs",
                self.multicast.join_timeout_secs,
            )?,
            use_arp: self.enrich.arp,
            ..ScannerConfig::default()
        })
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => bail!("{name} must be a positive number of seconds, got {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();

        assert!(config.scan.subnet.is_none());
        assert_eq!(config.scan.concurrency, 50);
        assert_eq!(config.scan.sources, ScanSources::all());
        assert!(config.enrich.arp);
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scan]\nsubnet = \"10.0.0\"\nonvif = false\n\n[multicast]\nlisten_timeout_secs = 0.5"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.scan.subnet.as_deref(), Some("10.0.0"));
        assert!(config.scan.sources.port_scan);
        assert!(!config.scan.sources.onvif);
        assert!(config.scan.sources.upnp);
        assert_eq!(config.scan.timeout_secs, 1.0);

        let scanner = config.to_scanner_config().unwrap();
        assert_eq!(scanner.listen_timeout, Duration::from_millis(500));
        assert_eq!(scanner.join_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scan\nsubnet = ").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camscout.toml");
        save_default_config(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[multicast]"));
        assert!(!written.contains("subnet"));

        let config = load_config(&path).unwrap();
        assert_eq!(config.scan.sources, ScanSources::all());
        assert_eq!(config.multicast.join_timeout_secs, 5.0);
    }

    #[test]
    fn test_scanner_config_normalizes_subnet() {
        let mut config = Config::default();
        config.scan.subnet = Some("192.168.7.0/24".into());
        let scanner = config.to_scanner_config().unwrap();
        assert_eq!(scanner.subnet.as_deref(), Some("192.168.7"));
        assert_eq!(scanner.connect_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_scanner_config_rejects_bad_values() {
        let mut config = Config::default();
        config.scan.subnet = Some("not-a-subnet".into());
        assert!(config.to_scanner_config().is_err());

        let mut config = Config::default();
        config.scan.timeout_secs = -1.0;
        assert!(config.to_scanner_config().is_err());

        let mut config = Config::default();
        config.scan.concurrency = 0;
        assert!(config.to_scanner_config().is_err());
    }
}
