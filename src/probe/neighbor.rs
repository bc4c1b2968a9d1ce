//! Neighbor (ARP) cache lookup
//!
//! Reads the platform's neighbor table directly instead of spawning
//! `arp`/`ip neigh` and parsing their output. Only addresses the kernel
//! has recently exchanged traffic with appear here, so a successful ping
//! immediately beforehand is what makes this lookup useful.

use pnet::util::MacAddr;
use std::net::IpAddr;

/// Look up the MAC address for `addr` in the neighbor cache.
#[cfg(target_os = "linux")]
pub fn lookup(addr: IpAddr) -> Option<MacAddr> {
    let table = std::fs::read_to_string("/proc/net/arp").ok()?;
    lookup_in_table(&table, addr)
}

#[cfg(not(target_os = "linux"))]
pub fn lookup(_addr: IpAddr) -> Option<MacAddr> {
    None
}

/// Parse `/proc/net/arp` format:
/// `IP address  HW type  Flags  HW address  Mask  Device`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn lookup_in_table(table: &str, addr: IpAddr) -> Option<MacAddr> {
    let needle = addr.to_string();

    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != needle {
            continue;
        }

        // Flags 0x0 marks an incomplete entry.
        let flags = u32::from_str_radix(fields[2].trim_start_matches("0x"), 16).unwrap_or(0);
        if flags == 0 {
            return None;
        }

        let mac: MacAddr = fields[3].parse().ok()?;
        if mac == MacAddr::zero() {
            return None;
        }
        return Some(mac);
    }

    None
}
