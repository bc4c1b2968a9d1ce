//! Configuration for mapping runs
//!
//! Each probing phase carries its own concurrency cap and timeout so a
//! single run cannot exhaust local sockets or flood the target network.

use crate::ports::PortSelection;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard ceiling on how many addresses one target spec may expand to.
pub const DEFAULT_ADDRESS_CAP: usize = 65_536;

/// Options governing a single mapping run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Maximum number of addresses a range/CIDR may expand to; larger
    /// inputs are truncated, not rejected
    pub address_cap: usize,

    /// ICMP echo timeout per address
    pub ping_timeout: Duration,

    /// Reverse-DNS timeout, deliberately shorter than the ping timeout
    pub resolve_timeout: Duration,

    /// TCP connect timeout per port
    pub connect_timeout: Duration,

    /// UDP reply wait per port
    pub udp_timeout: Duration,

    /// Banner read timeout per open port
    pub banner_timeout: Duration,

    /// Max in-flight ICMP probes during the discovery sweep
    pub ping_concurrency: usize,

    /// Max in-flight port probes per scan phase (TCP and UDP each)
    pub port_concurrency: usize,

    /// Max hosts scanned/fingerprinted at once by the mapper
    pub host_concurrency: usize,

    /// Max in-flight banner grabs per host
    pub service_concurrency: usize,

    /// Extra attempts for the ambiguous UDP open|filtered state.
    /// Zero preserves the single-attempt baseline behavior.
    pub udp_retries: u32,

    /// Ports probed per host
    pub ports: PortSelection,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            address_cap: DEFAULT_ADDRESS_CAP,
            ping_timeout: Duration::from_secs(2),
            resolve_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(2),
            udp_timeout: Duration::from_secs(2),
            banner_timeout: Duration::from_secs(2),
            ping_concurrency: 100,
            port_concurrency: 50,
            host_concurrency: 16,
            service_concurrency: 10,
            udp_retries: 0,
            ports: PortSelection::default(),
        }
    }
}

impl ScanOptions {
    /// Set the port selection
    pub fn with_ports(mut self, ports: PortSelection) -> Self {
        self.ports = ports;
        self
    }

    /// Set the ICMP echo timeout
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Set the TCP connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the UDP reply timeout
    pub fn with_udp_timeout(mut self, timeout: Duration) -> Self {
        self.udp_timeout = timeout;
        self
    }

    /// Set the discovery sweep concurrency cap
    pub fn with_ping_concurrency(mut self, n: usize) -> Self {
        self.ping_concurrency = n;
        self
    }

    /// Set the port probe concurrency cap
    pub fn with_port_concurrency(mut self, n: usize) -> Self {
        self.port_concurrency = n;
        self
    }

    /// Set the per-host mapper concurrency cap
    pub fn with_host_concurrency(mut self, n: usize) -> Self {
        self.host_concurrency = n;
        self
    }

    /// Validate the options before any network activity
    pub fn validate(&self) -> crate::Result<()> {
        if self.address_cap == 0 {
            return Err(crate::ScanError::InvalidTarget(
                "address cap must be greater than 0".to_string(),
            ));
        }
        if self.ping_concurrency == 0 || self.port_concurrency == 0 || self.host_concurrency == 0 {
            return Err(crate::ScanError::InvalidTarget(
                "concurrency caps must be greater than 0".to_string(),
            ));
        }
        if self.ports.is_empty() {
            return Err(crate::ScanError::PortSpec("no ports selected".to_string()));
        }
        Ok(())
    }
}
