//! Heuristic OS fingerprinting
//!
//! Three independent evidence signals — reply TTL, service banners and
//! open-port patterns — each add a fixed weight to one or more family
//! scores. The scoring tables are plain data so the weights stay easy to
//! audit and tune. Scoring itself is a pure function of its inputs; only
//! the TTL probe touches the network.

use crate::config::ScanOptions;
use crate::probe::PlatformProber;
use crate::scanner::PortProbeResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Operating-system family buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OsFamily {
    Windows,
    LinuxUnix,
    NetworkDevice,
    MacOs,
    Unknown,
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Windows => write!(f, "Windows"),
            OsFamily::LinuxUnix => write!(f, "Linux/Unix"),
            OsFamily::NetworkDevice => write!(f, "Network Device"),
            OsFamily::MacOs => write!(f, "macOS"),
            OsFamily::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Confidence tiers, thresholds on the winning score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    VeryLow,
    Low,
    Medium,
    High,
}

/// Result of fingerprinting one host. Computed exactly once per host,
/// after all port and service data is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsFingerprint {
    pub addr: IpAddr,
    pub family: OsFamily,
    pub version: Option<String>,
    pub confidence: Confidence,
    /// Matched evidence in evaluation order: TTL, banners, port patterns
    pub evidence: Vec<String>,
    pub ttl: Option<u8>,
    pub open_ports: Vec<u16>,
}

// Heuristic constants. Preserved as-is for baseline comparability; any
// change here is a behavior change, not a bug fix.

/// Common default TTLs per family, ascending. An observed TTL is matched
/// to the nearest default not below it, accounting for hop decrement
/// (observed 116 started at 128).
const TTL_DEFAULTS: [(u8, OsFamily); 4] = [
    (60, OsFamily::MacOs),
    (64, OsFamily::LinuxUnix),
    (128, OsFamily::Windows),
    (255, OsFamily::NetworkDevice),
];

const TTL_WEIGHT: u32 = 2;
const BANNER_WEIGHT: u32 = 2;
const SMB_WEIGHT: u32 = 2;
const TELNET_DEVICE_WEIGHT: u32 = 2;

/// A bare telnet service next to at most this many other open ports reads
/// as network equipment.
const TELNET_DEVICE_MAX_OTHER_PORTS: usize = 2;

const HIGH_THRESHOLD: u32 = 4;
const MEDIUM_THRESHOLD: u32 = 2;

/// OS-identifying banner substrings (matched case-insensitively)
const BANNER_RULES: &[(&str, OsFamily)] = &[
    ("ubuntu", OsFamily::LinuxUnix),
    ("debian", OsFamily::LinuxUnix),
    ("centos", OsFamily::LinuxUnix),
    ("red hat", OsFamily::LinuxUnix),
    ("fedora", OsFamily::LinuxUnix),
    ("suse", OsFamily::LinuxUnix),
    ("alpine", OsFamily::LinuxUnix),
    ("openssh", OsFamily::LinuxUnix),
    ("apache", OsFamily::LinuxUnix),
    ("nginx", OsFamily::LinuxUnix),
    ("postfix", OsFamily::LinuxUnix),
    ("exim", OsFamily::LinuxUnix),
    ("dovecot", OsFamily::LinuxUnix),
    ("microsoft", OsFamily::Windows),
    ("iis", OsFamily::Windows),
    ("exchange", OsFamily::Windows),
    ("windows", OsFamily::Windows),
    ("cisco", OsFamily::NetworkDevice),
    ("routeros", OsFamily::NetworkDevice),
    ("mikrotik", OsFamily::NetworkDevice),
    ("junos", OsFamily::NetworkDevice),
    ("fortigate", OsFamily::NetworkDevice),
    ("darwin", OsFamily::MacOs),
    ("macos", OsFamily::MacOs),
];

/// Single-port implications, weight 1 each
const PORT_RULES: &[(u16, OsFamily, &str)] = &[
    (3389, OsFamily::Windows, "RDP"),
    (1433, OsFamily::Windows, "MSSQL"),
    (22, OsFamily::LinuxUnix, "SSH"),
    (111, OsFamily::LinuxUnix, "RPC portmapper"),
    (161, OsFamily::NetworkDevice, "SNMP"),
    (162, OsFamily::NetworkDevice, "SNMP trap"),
];

/// Version strings recoverable from banner evidence, per family
static VERSION_RULES: Lazy<Vec<(OsFamily, &'static str, Regex)>> = Lazy::new(|| {
    [
        (OsFamily::LinuxUnix, "Ubuntu", r"(?i)\bubuntu[ /_-]+(\d+\.\d+(?:\.\d+)?)"),
        (OsFamily::LinuxUnix, "Debian", r"(?i)\bdebian[ /-]?(\d+)"),
        (OsFamily::LinuxUnix, "CentOS", r"(?i)\bcentos(?: linux)?[ /-]?(\d[\d.]*)"),
        (OsFamily::LinuxUnix, "Red Hat", r"(?i)red hat[^\d]*(\d[\d.]*)"),
        (OsFamily::LinuxUnix, "Fedora", r"(?i)fedora[ /-]?(\d+)"),
        (OsFamily::LinuxUnix, "Alpine", r"(?i)alpine[ /-]?(\d[\d.]*)"),
        (OsFamily::Windows, "Windows Server", r"(?i)windows server (\d{4})"),
        (OsFamily::Windows, "Windows", r"(?i)windows (\d+(?:\.\d+)?)"),
        (OsFamily::MacOs, "macOS", r"(?i)mac ?os x? (\d[\d.]*)"),
        (OsFamily::NetworkDevice, "RouterOS", r"(?i)routeros[ /-]?(\d[\d.]*)"),
        (OsFamily::NetworkDevice, "Cisco IOS", r"(?i)cisco ios[^\d]*(\d[\d.]*)"),
    ]
    .into_iter()
    .map(|(family, product, pattern)| {
        (family, product, Regex::new(pattern).expect("invalid version rule"))
    })
    .collect()
});

/// Bucket an observed TTL to the nearest family default not below it.
fn ttl_family(observed: u8) -> Option<(u8, OsFamily)> {
    TTL_DEFAULTS
        .iter()
        .find(|(default, _)| *default >= observed)
        .copied()
}

/// Pure scoring function: identical evidence always yields the identical
/// family, confidence and evidence list.
pub fn score_evidence(addr: IpAddr, ttl: Option<u8>, results: &[PortProbeResult]) -> OsFingerprint {
    let mut scores: BTreeMap<OsFamily, u32> = BTreeMap::new();
    let mut evidence = Vec::new();

    // Signal 1: TTL bucket
    if let Some(observed) = ttl {
        if let Some((default, family)) = ttl_family(observed) {
            *scores.entry(family).or_default() += TTL_WEIGHT;
            evidence.push(format!(
                "ttl {} matches {} default {}",
                observed, family, default
            ));
        }
    }

    // Signal 2: banner substrings
    let banners: Vec<&str> = results.iter().filter_map(|r| r.banner.as_deref()).collect();
    for banner in &banners {
        let lower = banner.to_lowercase();
        for (needle, family) in BANNER_RULES {
            if lower.contains(needle) {
                *scores.entry(*family).or_default() += BANNER_WEIGHT;
                evidence.push(format!("banner contains '{}' ({})", needle, family));
            }
        }
    }

    // Signal 3: open-port patterns
    let mut open_ports: Vec<u16> = results
        .iter()
        .filter(|r| r.state.is_open())
        .map(|r| r.port)
        .collect();
    open_ports.sort_unstable();
    open_ports.dedup();

    let has = |port: u16| open_ports.binary_search(&port).is_ok();

    if has(445) || (has(135) && has(139)) {
        *scores.entry(OsFamily::Windows).or_default() += SMB_WEIGHT;
        evidence.push("SMB/RPC service ports (Windows)".to_string());
    }
    for (port, family, label) in PORT_RULES {
        if has(*port) {
            *scores.entry(*family).or_default() += 1;
            evidence.push(format!("open port {} ({}) suggests {}", port, label, family));
        }
    }
    if has(23) && open_ports.len() <= TELNET_DEVICE_MAX_OTHER_PORTS + 1 {
        *scores.entry(OsFamily::NetworkDevice).or_default() += TELNET_DEVICE_WEIGHT;
        evidence.push("telnet with few other services (network equipment)".to_string());
    }

    // Winner must hold a strictly maximum score; ties mean we know nothing.
    let best = scores.iter().max_by_key(|(_, score)| **score);
    let (family, confidence) = match best {
        Some((family, score)) if *score > 0 => {
            let tied = scores.values().filter(|s| **s == *score).count() > 1;
            if tied {
                (OsFamily::Unknown, Confidence::VeryLow)
            } else {
                let confidence = if *score >= HIGH_THRESHOLD {
                    Confidence::High
                } else if *score >= MEDIUM_THRESHOLD {
                    Confidence::Medium
                } else {
                    Confidence::Low
                };
                (*family, confidence)
            }
        }
        _ => (OsFamily::Unknown, Confidence::VeryLow),
    };

    let version = if family == OsFamily::Unknown {
        None
    } else {
        extract_version(family, &banners)
    };

    OsFingerprint {
        addr,
        family,
        version,
        confidence,
        evidence,
        ttl,
        open_ports,
    }
}

/// Secondary pass: pull a concrete version string out of the banner
/// evidence for the winning family.
fn extract_version(family: OsFamily, banners: &[&str]) -> Option<String> {
    for (rule_family, product, pattern) in VERSION_RULES.iter() {
        if *rule_family != family {
            continue;
        }
        for banner in banners {
            if let Some(captures) = pattern.captures(banner) {
                if let Some(version) = captures.get(1) {
                    return Some(format!("{} {}", product, version.as_str()));
                }
            }
        }
    }
    None
}

/// Network-facing fingerprinter: probes once for the reply TTL, then
/// delegates to the pure scorer.
pub struct OsFingerprinter {
    options: ScanOptions,
    prober: Arc<dyn PlatformProber>,
}

impl OsFingerprinter {
    pub fn new(options: ScanOptions, prober: Arc<dyn PlatformProber>) -> Self {
        Self { options, prober }
    }

    /// Fingerprint a host from its collected port/service evidence.
    /// `ttl_hint` (from the discovery probe) stands in when the
    /// fingerprint-time ping fails, so transient loss does not erase the
    /// TTL signal.
    pub async fn fingerprint(
        &self,
        addr: IpAddr,
        results: &[PortProbeResult],
        ttl_hint: Option<u8>,
    ) -> OsFingerprint {
        let ttl = match self.prober.ping(addr, self.options.ping_timeout).await {
            Ok(reply) => reply.ttl.or(ttl_hint),
            Err(e) => {
                log::debug!("fingerprint ping for {} failed: {}", addr, e);
                ttl_hint
            }
        };
        score_evidence(addr, ttl, results)
    }
}
