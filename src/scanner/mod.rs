//! Concurrent TCP/UDP port scanning with state classification
//!
//! Scanning runs in two independent phases per target, TCP then UDP,
//! each under its own bounded worker pool. Probe failures map into port
//! states; they never abort sibling probes.

pub mod tcp;
pub mod udp;

use crate::config::ScanOptions;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Port state classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortState {
    Open,
    Closed,
    /// TCP connect scanning cannot separate refused-closed from
    /// silently-filtered; both land here. A known precision limit.
    Filtered,
    /// The standard UDP ambiguity: no reply could mean open-but-silent
    /// or dropped by a firewall
    OpenFiltered,
    /// Unexpected socket-level failure; logged, never fatal
    Errored,
}

impl PortState {
    pub fn is_open(&self) -> bool {
        matches!(self, PortState::Open)
    }
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Filtered => write!(f, "filtered"),
            PortState::OpenFiltered => write!(f, "open|filtered"),
            PortState::Errored => write!(f, "errored"),
        }
    }
}

/// Transport protocol of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// Outcome of probing one (address, port, protocol) triple.
///
/// The scan guarantees at most one result per triple: the port list is
/// deduplicated and exactly one worker probes each entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortProbeResult {
    pub addr: IpAddr,
    pub port: u16,
    pub protocol: Protocol,
    pub state: PortState,
    pub latency: Option<Duration>,
    pub banner: Option<String>,
    pub service: Option<String>,
    pub version: Option<String>,
}

impl PortProbeResult {
    pub fn new(addr: IpAddr, port: u16, protocol: Protocol, state: PortState) -> Self {
        Self {
            addr,
            port,
            protocol,
            state,
            latency: None,
            banner: None,
            service: None,
            version: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// Two-phase port scanner
pub struct PortScanner {
    options: ScanOptions,
}

impl PortScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Scan the given ports on one target: TCP first, then UDP. Results
    /// arrive in completion order internally and are sorted by
    /// (protocol, port) before returning.
    pub async fn scan(
        &self,
        addr: IpAddr,
        ports: &[u16],
        cancel: &CancellationToken,
    ) -> Vec<PortProbeResult> {
        let mut ports = ports.to_vec();
        ports.sort_unstable();
        ports.dedup();

        let mut results = self.scan_tcp(addr, &ports, cancel).await;
        if !cancel.is_cancelled() {
            results.extend(self.scan_udp(addr, &ports, cancel).await);
        }

        results.sort_by_key(|r| (r.protocol, r.port));
        results
    }

    /// TCP connect phase
    pub async fn scan_tcp(
        &self,
        addr: IpAddr,
        ports: &[u16],
        cancel: &CancellationToken,
    ) -> Vec<PortProbeResult> {
        let timeout = self.options.connect_timeout;
        self.run_phase(addr, ports, cancel, move |addr, port| {
            tcp::probe(addr, port, timeout)
        })
        .await
    }

    /// UDP datagram phase
    pub async fn scan_udp(
        &self,
        addr: IpAddr,
        ports: &[u16],
        cancel: &CancellationToken,
    ) -> Vec<PortProbeResult> {
        let timeout = self.options.udp_timeout;
        let retries = self.options.udp_retries;
        self.run_phase(addr, ports, cancel, move |addr, port| {
            udp::probe(addr, port, timeout, retries)
        })
        .await
    }

    /// Fan a probe function out over the port list under this phase's
    /// worker pool.
    async fn run_phase<F, Fut>(
        &self,
        addr: IpAddr,
        ports: &[u16],
        cancel: &CancellationToken,
        probe_fn: F,
    ) -> Vec<PortProbeResult>
    where
        F: Fn(IpAddr, u16) -> Fut + Clone + Send + 'static,
        Fut: std::future::Future<Output = PortProbeResult> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.options.port_concurrency));

        let tasks = ports.iter().copied().map(|port| {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let probe_fn = probe_fn.clone();

            tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                Some(probe_fn(addr, port).await)
            })
        });

        join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok().flatten())
            .collect()
    }
}
