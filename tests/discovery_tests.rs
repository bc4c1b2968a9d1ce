//! Discovery sweep behavior against a scripted prober

use async_trait::async_trait;
use netmapper::probe::{EchoReply, PlatformProber};
use netmapper::{HostDiscoverer, OuiDb, ScanError, ScanOptions, TargetSet};
use pnet::util::MacAddr;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scripted prober: a fixed set of addresses answer, everything else
/// times out. Tracks the in-flight high-water mark so tests can verify
/// the worker-pool bound.
struct FakeProber {
    alive: HashSet<IpAddr>,
    ttl: u8,
    delay: Duration,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

impl FakeProber {
    fn new(alive: impl IntoIterator<Item = IpAddr>, ttl: u8, delay: Duration) -> Self {
        Self {
            alive: alive.into_iter().collect(),
            ttl,
            delay,
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformProber for FakeProber {
    async fn ping(&self, addr: IpAddr, _timeout: Duration) -> Result<EchoReply, ScanError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.alive.contains(&addr) {
            Ok(EchoReply {
                rtt: Duration::from_millis(1),
                ttl: Some(self.ttl),
            })
        } else {
            Err(ScanError::Timeout)
        }
    }

    fn neighbor_mac(&self, addr: IpAddr) -> Option<MacAddr> {
        if self.alive.contains(&addr) {
            Some(MacAddr::new(0x52, 0x54, 0x00, 0x11, 0x22, 0x33))
        } else {
            None
        }
    }
}

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_only_responders_produce_records() {
    let targets = TargetSet::parse("10.1.0.0/28", 1024).unwrap();
    let alive = [addr("10.1.0.3"), addr("10.1.0.9")];
    let prober = Arc::new(FakeProber::new(alive, 64, Duration::from_millis(1)));
    let discoverer = HostDiscoverer::new(
        ScanOptions::default(),
        prober,
        Arc::new(OuiDb::builtin()),
    );

    let hosts = discoverer.discover(&targets, &CancellationToken::new()).await;

    assert_eq!(hosts.len(), 2);
    // Sorted ascending by address.
    assert_eq!(hosts[0].addr, addr("10.1.0.3"));
    assert_eq!(hosts[1].addr, addr("10.1.0.9"));
    for host in &hosts {
        assert!(host.alive);
        assert_eq!(host.ttl, Some(64));
    }
}

#[tokio::test]
async fn test_vendor_resolved_from_neighbor_mac() {
    let targets = TargetSet::parse("10.1.0.1", 1024).unwrap();
    let prober = Arc::new(FakeProber::new(
        [addr("10.1.0.1")],
        64,
        Duration::from_millis(1),
    ));
    let discoverer = HostDiscoverer::new(
        ScanOptions::default(),
        prober,
        Arc::new(OuiDb::builtin()),
    );

    let hosts = discoverer.discover(&targets, &CancellationToken::new()).await;
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].mac.as_deref(), Some("52:54:00:11:22:33"));
    assert!(hosts[0].vendor.as_deref().unwrap().contains("QEMU"));
}

#[tokio::test]
async fn test_sweep_honors_concurrency_bound() {
    let targets = TargetSet::parse("10.2.0.0/26", 1024).unwrap(); // 64 addrs
    let prober = Arc::new(FakeProber::new([], 64, Duration::from_millis(10)));
    let options = ScanOptions::default().with_ping_concurrency(5);
    let discoverer = HostDiscoverer::new(options, prober.clone(), Arc::new(OuiDb::builtin()));

    let hosts = discoverer.discover(&targets, &CancellationToken::new()).await;

    assert!(hosts.is_empty());
    assert!(
        prober.high_water() <= 5,
        "observed {} probes in flight, cap is 5",
        prober.high_water()
    );
    assert!(prober.high_water() > 0);
}

#[tokio::test]
async fn test_cancelled_sweep_returns_partial_results() {
    let targets = TargetSet::parse("10.3.0.0/24", 1024).unwrap();
    let prober = Arc::new(FakeProber::new([], 64, Duration::from_millis(5)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let discoverer = HostDiscoverer::new(
        ScanOptions::default(),
        prober.clone(),
        Arc::new(OuiDb::builtin()),
    );
    let hosts = discoverer.discover(&targets, &cancel).await;

    // Cancelled before any probe went out.
    assert!(hosts.is_empty());
    assert_eq!(prober.high_water(), 0);
}
