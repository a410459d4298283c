//! camscout - find IP cameras and NVRs on the local network
//!
//! Runs a TCP port sweep, ONVIF WS-Discovery and UPnP/SSDP together and
//! prints the merged results as a table or JSON.

mod config;
mod output;

use anyhow::Result;
use camscout_core::sort_by_ip;
use camscout_discovery::{DiscoveryScanner, ProgressFn, ScanSources};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "camscout")]
#[command(about = "Scan the network for IP cameras and NVRs")]
#[command(version)]
struct Args {
    /// Subnet to scan (e.g. 192.168.1). Auto-detected if not provided.
    #[arg(short, long)]
    subnet: Option<String>,

    /// TCP connect timeout in seconds
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Maximum TCP probes in flight
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Disable TCP port scanning
    #[arg(long)]
    no_ports: bool,

    /// Disable ONVIF WS-Discovery
    #[arg(long)]
    no_onvif: bool,

    /// Disable UPnP/SSDP discovery
    #[arg(long)]
    no_upnp: bool,

    /// Skip MAC lookup in the neighbour table
    #[arg(long)]
    no_arp: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "camscout.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Write a default configuration file to --config and exit
    #[arg(long)]
    init_config: bool,
}

impl Args {
    /// Apply command line overrides on top of the loaded config
    fn apply(&self, config: &mut config::Config) {
        if let Some(subnet) = &self.subnet {
            config.scan.subnet = Some(subnet.clone());
        }
        if let Some(timeout) = self.timeout {
            config.scan.timeout_secs = timeout;
        }
        if let Some(concurrency) = self.concurrency {
            config.scan.concurrency = concurrency;
        }
        let sources = &mut config.scan.sources;
        sources.port_scan &= !self.no_ports;
        sources.onvif &= !self.no_onvif;
        sources.upnp &= !self.no_upnp;
        config.enrich.arp &= !self.no_arp;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if args.init_config {
        config::save_default_config(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    let mut config = config::load_config(&args.config)?;
    args.apply(&mut config);
    let sources: ScanSources = config.scan.sources;

    let scanner = Arc::new(DiscoveryScanner::new(config.to_scanner_config()?));

    info!(
        subnet = %scanner.subnet(),
        timeout = config.scan.timeout_secs,
        concurrency = config.scan.concurrency,
        "Configuration loaded"
    );

    // Ctrl-C stops the scan and still prints what was found
    let interrupt = {
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, cancelling scan");
                scanner.cancel();
            }
        })
    };

    let mut devices = if args.json {
        scanner.scan(sources, None).await
    } else {
        println!("\nScanning network: {}.0/24", scanner.subnet());
        println!("This may take a minute...\n");
        println!("Methods: {}\n", sources.methods().join(", "));

        let last_percent = AtomicUsize::new(usize::MAX);
        let on_progress: &ProgressFn<'_> = &move |current, total| {
            let percent = if total == 0 { 100 } else { current * 100 / total };
            if last_percent.swap(percent, Ordering::Relaxed) != percent {
                eprint!("\rScanning... {percent:>3}%");
                let _ = std::io::stderr().flush();
            }
        };

        let devices = scanner
            .scan(sources, sources.port_scan.then_some(on_progress))
            .await;
        if sources.port_scan {
            eprintln!();
        }
        devices
    };
    interrupt.abort();

    sort_by_ip(&mut devices);

    if args.json {
        println!("{}", output::render_json(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("{}", output::EMPTY_TIPS);
        return Ok(());
    }

    println!("{}", output::render_table(&devices));
    if let Some(hint) = output::next_steps(&devices) {
        println!("{hint}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_overrides() {
        let args = Args::parse_from([
            "camscout", "-s", "10.1.2", "-t", "2.5", "-j", "8", "--no-onvif", "--no-arp",
        ]);
        let mut config = config::Config::default();
        args.apply(&mut config);

        assert_eq!(config.scan.subnet.as_deref(), Some("10.1.2"));
        assert_eq!(config.scan.timeout_secs, 2.5);
        assert_eq!(config.scan.concurrency, 8);
        assert!(config.scan.sources.port_scan);
        assert!(!config.scan.sources.onvif);
        assert!(config.scan.sources.upnp);
        assert!(!config.enrich.arp);
    }

    #[test]
    fn test_flags_cannot_reenable_config() {
        let args = Args::parse_from(["camscout"]);
        let mut config = config::Config::default();
        config.scan.sources.upnp = false;
        args.apply(&mut config);

        assert!(!config.scan.sources.upnp);
        assert_eq!(args.log_level, "warn");
        assert_eq!(args.config, PathBuf::from("camscout.toml"));
    }

    #[test]
    fn test_invalid_subnet_flag_rejected() {
        let args = Args::parse_from(["camscout", "--subnet", "300.1.1"]);
        let mut config = config::Config::default();
        args.apply(&mut config);
        assert!(config.to_scanner_config().is_err());
    }
}
