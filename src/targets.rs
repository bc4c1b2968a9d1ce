//! Target parsing: CIDR blocks, address ranges and single addresses
//!
//! Accepted grammars:
//! - CIDR `a.b.c.d/n` (IPv4 only)
//! - range `a.b.c.d-e.f.g.h`, or short form `a.b.c.d-N` where N replaces
//!   the final octet
//! - a single IPv4 or IPv6 address
//!
//! CIDR expansion includes the network and broadcast addresses, so
//! `192.168.1.0/30` yields exactly four addresses. Expansions beyond the
//! address cap are truncated with a warning, never rejected.

use crate::ScanError;
use ipnetwork::Ipv4Network;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// An ordered, deduplicated set of target addresses derived from one
/// input spec. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct TargetSet {
    spec: String,
    addrs: Vec<IpAddr>,
    truncated: bool,
}

impl TargetSet {
    /// Parse a target spec, bounding expansion at `cap` addresses.
    pub fn parse(spec: &str, cap: usize) -> Result<Self, ScanError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ScanError::InvalidTarget("empty target".to_string()));
        }
        if cap == 0 {
            return Err(ScanError::InvalidTarget(
                "address cap must be greater than 0".to_string(),
            ));
        }

        let (mut addrs, truncated) = if spec.contains('/') {
            Self::expand_cidr(spec, cap)?
        } else if let Some((start, end)) = split_range(spec) {
            Self::expand_range(start, end, cap)?
        } else {
            let addr = IpAddr::from_str(spec)
                .map_err(|_| ScanError::InvalidTarget(format!("unparsable address '{}'", spec)))?;
            (vec![addr], false)
        };

        addrs.sort_unstable();
        addrs.dedup();

        if truncated {
            log::warn!(
                "target '{}' exceeds the {}-address cap; truncating",
                spec,
                cap
            );
        }

        Ok(Self {
            spec: spec.to_string(),
            addrs,
            truncated,
        })
    }

    fn expand_cidr(spec: &str, cap: usize) -> Result<(Vec<IpAddr>, bool), ScanError> {
        // IPv6 CIDR blocks are rejected up front rather than mis-parsed.
        if spec.matches(':').count() > 0 {
            return Err(ScanError::InvalidTarget(
                "only IPv4 CIDR expansion is supported".to_string(),
            ));
        }

        let network = Ipv4Network::from_str(spec)
            .map_err(|e| ScanError::InvalidTarget(format!("bad CIDR '{}': {}", spec, e)))?;

        let mut addrs: Vec<IpAddr> = Vec::new();
        let mut truncated = false;
        for addr in network.iter() {
            if addrs.len() == cap {
                truncated = true;
                break;
            }
            addrs.push(IpAddr::V4(addr));
        }
        Ok((addrs, truncated))
    }

    fn expand_range(start: &str, end: &str, cap: usize) -> Result<(Vec<IpAddr>, bool), ScanError> {
        if start.contains(':') || end.contains(':') {
            return Err(ScanError::InvalidTarget(
                "IPv6 ranges are not supported; address families must both be IPv4".to_string(),
            ));
        }

        let lo = Ipv4Addr::from_str(start)
            .map_err(|_| ScanError::InvalidTarget(format!("bad range start '{}'", start)))?;

        let hi = if let Ok(addr) = Ipv4Addr::from_str(end) {
            addr
        } else {
            // Short form: the right-hand side replaces the last octet.
            let last: u8 = end
                .parse()
                .map_err(|_| ScanError::InvalidTarget(format!("bad range end '{}'", end)))?;
            let o = lo.octets();
            Ipv4Addr::new(o[0], o[1], o[2], last)
        };

        let lo_u32 = u32::from(lo);
        let hi_u32 = u32::from(hi);
        if hi_u32 < lo_u32 {
            return Err(ScanError::InvalidTarget(format!(
                "range end {} precedes start {}",
                hi, lo
            )));
        }

        let total = (hi_u32 - lo_u32) as usize + 1;
        let truncated = total > cap;
        let take = total.min(cap);
        let addrs = (lo_u32..=hi_u32)
            .take(take)
            .map(|n| IpAddr::V4(Ipv4Addr::from(n)))
            .collect();
        Ok((addrs, truncated))
    }

    /// The original input spec
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Whether expansion hit the address cap
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn addrs(&self) -> &[IpAddr] {
        &self.addrs
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IpAddr> {
        self.addrs.iter()
    }
}

/// Split `a.b.c.d-X` range syntax. A leading `-` or a spec without `-`
/// is not a range.
fn split_range(spec: &str) -> Option<(&str, &str)> {
    let idx = spec.find('-')?;
    if idx == 0 || idx == spec.len() - 1 {
        return None;
    }
    Some((&spec[..idx], &spec[idx + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> IpAddr {
        IpAddr::V4(Ipv4Addr::from_str(s).unwrap())
    }

    #[test]
    fn test_single_ipv4() {
        let set = TargetSet::parse("192.168.1.1", 1024).unwrap();
        assert_eq!(set.addrs(), &[v4("192.168.1.1")]);
        assert!(!set.truncated());
    }

    #[test]
    fn test_single_ipv6_degenerate() {
        let set = TargetSet::parse("2001:db8::1", 1024).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.addrs()[0].is_ipv6());
    }

    // Locks the expansion convention: network and broadcast addresses
    // are included.
    #[test]
    fn test_cidr_slash30_exact_expansion() {
        let set = TargetSet::parse("192.168.1.0/30", 1024).unwrap();
        assert_eq!(
            set.addrs(),
            &[
                v4("192.168.1.0"),
                v4("192.168.1.1"),
                v4("192.168.1.2"),
                v4("192.168.1.3"),
            ]
        );
    }

    #[test]
    fn test_cidr_truncated_to_exact_cap() {
        let set = TargetSet::parse("10.0.0.0/16", 100).unwrap();
        assert_eq!(set.len(), 100);
        assert!(set.truncated());
        assert_eq!(set.addrs()[0], v4("10.0.0.0"));
        assert_eq!(set.addrs()[99], v4("10.0.0.99"));
    }

    #[test]
    fn test_full_range() {
        let set = TargetSet::parse("10.0.0.254-10.0.1.2", 1024).unwrap();
        assert_eq!(
            set.addrs(),
            &[
                v4("10.0.0.254"),
                v4("10.0.0.255"),
                v4("10.0.1.0"),
                v4("10.0.1.1"),
                v4("10.0.1.2"),
            ]
        );
    }

    #[test]
    fn test_short_range_replaces_last_octet() {
        let set = TargetSet::parse("192.168.1.10-12", 1024).unwrap();
        assert_eq!(
            set.addrs(),
            &[v4("192.168.1.10"), v4("192.168.1.11"), v4("192.168.1.12")]
        );
    }

    #[test]
    fn test_range_truncated_to_exact_cap() {
        let set = TargetSet::parse("10.0.0.0-10.0.255.255", 50).unwrap();
        assert_eq!(set.len(), 50);
        assert!(set.truncated());
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(TargetSet::parse("10.0.0.9-10.0.0.1", 1024).is_err());
    }

    #[test]
    fn test_mixed_families_rejected() {
        assert!(TargetSet::parse("10.0.0.1-::2", 1024).is_err());
        assert!(TargetSet::parse("2001:db8::/64", 1024).is_err());
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        for bad in ["", "10.0.0/99", "10.0.0.256", "garbage", "10.0.0.1/33"] {
            assert!(TargetSet::parse(bad, 1024).is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn test_output_sorted_and_deduplicated() {
        // /31 is a two-address block; parsing twice the same spec must not
        // duplicate entries.
        let set = TargetSet::parse("172.16.0.0/31", 1024).unwrap();
        assert_eq!(set.addrs(), &[v4("172.16.0.0"), v4("172.16.0.1")]);
    }
}
