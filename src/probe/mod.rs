//! Platform probing capabilities: ICMP echo and neighbor-cache lookup
//!
//! Host discovery and OS fingerprinting consume these through the
//! [`PlatformProber`] trait so tests can substitute a scripted
//! implementation without touching the network.

pub mod icmp;
pub mod neighbor;

use crate::ScanError;
use pnet::util::MacAddr;
use std::net::IpAddr;
use std::time::Duration;

pub use icmp::IcmpProber;

/// A successful ICMP echo exchange
#[derive(Debug, Clone, Copy)]
pub struct EchoReply {
    /// Round-trip time of the exchange
    pub rtt: Duration,
    /// TTL observed on the reply's IP header, when the platform exposes it
    pub ttl: Option<u8>,
}

/// Host-level probing primitives with per-platform implementations
#[async_trait::async_trait]
pub trait PlatformProber: Send + Sync {
    /// Send one ICMP echo request and await the matching reply.
    async fn ping(&self, addr: IpAddr, timeout: Duration) -> Result<EchoReply, ScanError>;

    /// Look up the link-layer address for `addr` in the platform's
    /// neighbor cache. Best-effort: routed and remote addresses
    /// legitimately have no entry.
    fn neighbor_mac(&self, addr: IpAddr) -> Option<MacAddr>;
}
