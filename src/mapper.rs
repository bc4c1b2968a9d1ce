//! Network mapping orchestration
//!
//! Chains parsing, discovery, port scanning, service detection and OS
//! fingerprinting into one aggregated map. Each phase runs across the
//! host set under its own concurrency bound, failures stay isolated to
//! the host they occurred on, and cancellation yields the partial map
//! collected so far instead of discarding it.

use crate::config::ScanOptions;
use crate::discovery::{HostDiscoverer, HostRecord};
use crate::fingerprint::OsFingerprinter;
use crate::probe::{IcmpProber, PlatformProber};
use crate::scanner::{PortProbeResult, PortScanner};
use crate::services::ServiceDetector;
use crate::targets::TargetSet;
use crate::vendor::OuiDb;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// The aggregated result of one mapping run. Immutable once assembled;
/// every record below the mapper is owned here after the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkMap {
    pub target_spec: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Whether the target expansion hit the address cap
    pub truncated: bool,
    pub total_addresses: usize,
    pub alive_hosts: usize,
    pub total_open_ports: usize,
    /// Live hosts, ascending by address, carrying their port results and
    /// OS fingerprint
    pub hosts: Vec<HostRecord>,
    /// Service name → occurrences across all open ports
    pub service_counts: BTreeMap<String, usize>,
    /// OS family → host count
    pub os_counts: BTreeMap<String, usize>,
}

/// Orchestrator for full mapping runs
pub struct NetworkMapper {
    options: ScanOptions,
    prober: Arc<dyn PlatformProber>,
    vendors: Arc<OuiDb>,
    cancel: CancellationToken,
}

impl NetworkMapper {
    /// Build a mapper with the production ICMP prober and the bundled
    /// vendor registry.
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            prober: Arc::new(IcmpProber::new()),
            vendors: Arc::new(OuiDb::load_bundled()),
            cancel: CancellationToken::new(),
        }
    }

    /// Substitute the probing backend (used by tests and embedders)
    pub fn with_prober(mut self, prober: Arc<dyn PlatformProber>) -> Self {
        self.prober = prober;
        self
    }

    /// Thread an external cancellation signal through every phase
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Map the given target spec: discover, scan, detect, fingerprint,
    /// aggregate.
    pub async fn create_map(&self, target_spec: &str) -> crate::Result<NetworkMap> {
        self.options.validate()?;
        let targets = TargetSet::parse(target_spec, self.options.address_cap)?;

        let started_at = Utc::now();
        let start = Instant::now();

        // Phase 1: discovery sweep
        let discoverer = HostDiscoverer::new(
            self.options.clone(),
            self.prober.clone(),
            self.vendors.clone(),
        );
        let mut hosts = discoverer.discover(&targets, &self.cancel).await;

        // Phase 2: port scan + service detection per live host
        if !hosts.is_empty() && !self.cancel.is_cancelled() {
            self.scan_hosts(&mut hosts).await;
        }

        // Phase 3: OS fingerprint per live host
        if !hosts.is_empty() && !self.cancel.is_cancelled() {
            self.fingerprint_hosts(&mut hosts).await;
        }

        Ok(assemble(
            &targets,
            started_at,
            start.elapsed(),
            hosts,
        ))
    }

    /// Scan the configured port set on every live host concurrently and
    /// classify services on the ports found open. A failure or panic in
    /// one host's task is recorded on that host only.
    async fn scan_hosts(&self, hosts: &mut [HostRecord]) {
        let ports = self.options.ports.resolve();
        log::info!(
            "scanning {} ports on {} hosts ({} hosts in flight)",
            ports.len(),
            hosts.len(),
            self.options.host_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.options.host_concurrency));
        let tasks = hosts.iter().map(|host| {
            let addr = host.addr;
            let ports = ports.clone();
            let options = self.options.clone();
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();

            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| e.to_string())?;
                if cancel.is_cancelled() {
                    return Ok::<_, String>((addr, Vec::new()));
                }

                let scanner = PortScanner::new(options.clone());
                let mut results = scanner.scan(addr, &ports, &cancel).await;

                let detector = ServiceDetector::new(options);
                detector.detect_services(&mut results, &cancel).await;

                Ok((addr, results))
            })
        });

        let mut outcomes: BTreeMap<IpAddr, Result<Vec<PortProbeResult>, String>> = BTreeMap::new();
        for (host_idx, joined) in join_all(tasks).await.into_iter().enumerate() {
            match joined {
                Ok(Ok((addr, results))) => {
                    outcomes.insert(addr, Ok(results));
                }
                Ok(Err(msg)) => {
                    if let Some(host) = hosts.get(host_idx) {
                        outcomes.insert(host.addr, Err(msg));
                    }
                }
                Err(join_err) => {
                    // A panicked task must not take the run down with it.
                    if let Some(host) = hosts.get(host_idx) {
                        log::error!("port scan for {} failed: {}", host.addr, join_err);
                        outcomes.insert(host.addr, Err(join_err.to_string()));
                    }
                }
            }
        }

        for host in hosts.iter_mut() {
            match outcomes.remove(&host.addr) {
                Some(Ok(results)) => host.ports = results,
                Some(Err(msg)) => host.error = Some(msg),
                None => {}
            }
        }
    }

    /// Fingerprint every live host concurrently from its collected
    /// evidence.
    async fn fingerprint_hosts(&self, hosts: &mut [HostRecord]) {
        log::info!("fingerprinting {} hosts", hosts.len());
        let semaphore = Arc::new(Semaphore::new(self.options.host_concurrency));

        let tasks = hosts.iter().map(|host| {
            let addr = host.addr;
            let ttl_hint = host.ttl;
            let results = host.ports.clone();
            let options = self.options.clone();
            let prober = self.prober.clone();
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();

            tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                let fingerprinter = OsFingerprinter::new(options, prober);
                Some((addr, fingerprinter.fingerprint(addr, &results, ttl_hint).await))
            })
        });

        let mut fingerprints: BTreeMap<IpAddr, _> = BTreeMap::new();
        for (host_idx, joined) in join_all(tasks).await.into_iter().enumerate() {
            match joined {
                Ok(Some((addr, fingerprint))) => {
                    fingerprints.insert(addr, fingerprint);
                }
                Ok(None) => {}
                Err(join_err) => {
                    if let Some(host) = hosts.get(host_idx) {
                        log::error!("fingerprinting {} failed: {}", host.addr, join_err);
                    }
                }
            }
        }

        for host in hosts.iter_mut() {
            host.fingerprint = fingerprints.remove(&host.addr);
        }
    }
}

/// Compute the derived aggregates once all phases are complete.
fn assemble(
    targets: &TargetSet,
    started_at: DateTime<Utc>,
    duration: Duration,
    mut hosts: Vec<HostRecord>,
) -> NetworkMap {
    hosts.sort_by_key(|h| h.addr);

    let mut service_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut os_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_open_ports = 0;

    for host in &hosts {
        for port in host.ports.iter().filter(|p| p.state.is_open()) {
            total_open_ports += 1;
            if let Some(service) = &port.service {
                *service_counts.entry(service.clone()).or_default() += 1;
            }
        }
        if let Some(fingerprint) = &host.fingerprint {
            *os_counts.entry(fingerprint.family.to_string()).or_default() += 1;
        }
    }

    NetworkMap {
        target_spec: targets.spec().to_string(),
        started_at,
        duration,
        truncated: targets.truncated(),
        total_addresses: targets.len(),
        alive_hosts: hosts.len(),
        total_open_ports,
        hosts,
        service_counts,
        os_counts,
    }
}
