//! Host discovery: ICMP sweep plus hostname and vendor resolution
//!
//! Each address in the target set gets one echo probe under a bounded
//! worker pool. Responders are enriched with a reverse-DNS name, the
//! neighbor-cache MAC address and its registered vendor; non-responders
//! produce no record at all.

use crate::config::ScanOptions;
use crate::fingerprint::OsFingerprint;
use crate::probe::PlatformProber;
use crate::scanner::PortProbeResult;
use crate::targets::TargetSet;
use crate::vendor::OuiDb;
use crate::ScanError;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Hostname recorded when reverse resolution fails or times out
pub const UNRESOLVED: &str = "unresolved";

/// A host that answered the discovery probe.
///
/// Port results and the OS fingerprint are filled in by the mapper's
/// later phases; discovery leaves them empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub addr: IpAddr,
    pub hostname: String,
    pub alive: bool,
    pub rtt: Duration,
    pub ttl: Option<u8>,
    pub mac: Option<String>,
    pub vendor: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortProbeResult>,
    pub fingerprint: Option<OsFingerprint>,
    /// Set when a later mapping phase failed for this host only
    pub error: Option<String>,
}

impl HostRecord {
    pub fn new(addr: IpAddr, rtt: Duration, ttl: Option<u8>) -> Self {
        Self {
            addr,
            hostname: UNRESOLVED.to_string(),
            alive: true,
            rtt,
            ttl,
            mac: None,
            vendor: None,
            ports: Vec::new(),
            fingerprint: None,
            error: None,
        }
    }

    /// Ports currently classified as open, ascending
    pub fn open_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .ports
            .iter()
            .filter(|p| p.state.is_open())
            .map(|p| p.port)
            .collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }
}

/// ICMP sweep engine
pub struct HostDiscoverer {
    options: ScanOptions,
    prober: Arc<dyn PlatformProber>,
    vendors: Arc<OuiDb>,
}

impl HostDiscoverer {
    pub fn new(options: ScanOptions, prober: Arc<dyn PlatformProber>, vendors: Arc<OuiDb>) -> Self {
        Self {
            options,
            prober,
            vendors,
        }
    }

    /// Probe every address in the set. Only responders are returned,
    /// sorted ascending by address. Cancellation is honored per worker;
    /// records collected before the cancel remain valid.
    pub async fn discover(&self, targets: &TargetSet, cancel: &CancellationToken) -> Vec<HostRecord> {
        let semaphore = Arc::new(Semaphore::new(self.options.ping_concurrency));
        log::info!(
            "discovering {} addresses ({} in flight)",
            targets.len(),
            self.options.ping_concurrency
        );

        let tasks = targets.iter().copied().map(|addr| {
            let semaphore = semaphore.clone();
            let prober = self.prober.clone();
            let vendors = self.vendors.clone();
            let cancel = cancel.clone();
            let ping_timeout = self.options.ping_timeout;
            let resolve_timeout = self.options.resolve_timeout;

            tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                probe_host(addr, prober, vendors, ping_timeout, resolve_timeout).await
            })
        });

        let mut hosts: Vec<HostRecord> = join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok().flatten())
            .collect();

        hosts.sort_by_key(|h| h.addr);
        log::info!("{} hosts responded", hosts.len());
        hosts
    }
}

async fn probe_host(
    addr: IpAddr,
    prober: Arc<dyn PlatformProber>,
    vendors: Arc<OuiDb>,
    ping_timeout: Duration,
    resolve_timeout: Duration,
) -> Option<HostRecord> {
    let reply = match prober.ping(addr, ping_timeout).await {
        Ok(reply) => reply,
        Err(ScanError::Permission(msg)) => {
            warn_once(&msg);
            return None;
        }
        Err(e) => {
            log::debug!("{} did not respond: {}", addr, e);
            return None;
        }
    };

    let mut record = HostRecord::new(addr, reply.rtt, reply.ttl);
    record.hostname = resolve_hostname(addr, resolve_timeout)
        .await
        .unwrap_or_else(|| UNRESOLVED.to_string());

    // The MAC is only obtainable for on-link neighbors; the echo exchange
    // just populated the cache for those.
    if let Some(mac) = prober.neighbor_mac(addr) {
        record.vendor = Some(
            vendors
                .lookup(&mac)
                .unwrap_or("unknown")
                .to_string(),
        );
        record.mac = Some(mac.to_string());
    }

    Some(record)
}

/// Reverse-DNS with its own shorter timeout. The blocking resolver call
/// runs on the blocking pool so a slow nameserver cannot stall a worker.
async fn resolve_hostname(addr: IpAddr, timeout: Duration) -> Option<String> {
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr).ok());

    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(Some(name))) if name != addr.to_string() => Some(name),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            log::debug!("resolver worker failed for {}: {}", addr, e);
            None
        }
        Err(_) => {
            log::debug!("reverse lookup for {} timed out", addr);
            None
        }
    }
}

fn warn_once(msg: &str) {
    static ONCE: std::sync::Once = std::sync::Once::new();
    let msg = msg.to_string();
    ONCE.call_once(|| {
        log::warn!("{}; discovery degraded, hosts will appear down", msg);
    });
}
