//! OUI vendor registry
//!
//! Maps the first three bytes of a MAC address to the registering vendor.
//! The table is built once before any scan begins and is immutable
//! afterwards, so lookups need no synchronization.

use pnet::util::MacAddr;
use std::collections::HashMap;

/// Bundled registry in vendor-registry text format (one entry per line:
/// hex or dash-separated prefix, whitespace, vendor name).
const BUNDLED_REGISTRY: &str = include_str!("../data/oui.txt");

/// Immutable OUI prefix → vendor lookup table
#[derive(Debug, Clone)]
pub struct OuiDb {
    entries: HashMap<[u8; 3], String>,
}

impl OuiDb {
    /// Load the bundled registry, falling back to the built-in table if
    /// the resource yields no entries. Never fails: discovery must not
    /// depend on the registry being present.
    pub fn load_bundled() -> Self {
        let db = Self::from_registry_text(BUNDLED_REGISTRY);
        if db.is_empty() {
            log::warn!("bundled OUI registry is empty; using built-in fallback table");
            return Self::builtin();
        }
        log::debug!("loaded {} OUI prefixes", db.len());
        db
    }

    /// Parse vendor-registry text. Unparsable lines are skipped; `#`
    /// comments and the upstream `(hex)` / `(base 16)` column markers are
    /// tolerated.
    pub fn from_registry_text(text: &str) -> Self {
        let mut entries = HashMap::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(prefix_str) = fields.next() else {
                continue;
            };
            let Some(prefix) = parse_prefix(prefix_str) else {
                continue;
            };

            let vendor: String = fields
                .filter(|f| !matches!(*f, "(hex)" | "(base" | "16)"))
                .collect::<Vec<_>>()
                .join(" ");
            if vendor.is_empty() {
                continue;
            }

            entries.insert(prefix, vendor);
        }

        Self { entries }
    }

    /// Minimal fallback table covering common virtualization and hardware
    /// vendors, used when the bundled registry cannot be read.
    pub fn builtin() -> Self {
        let table: [(&[u8; 3], &str); 10] = [
            (&[0x00, 0x0C, 0x29], "VMware, Inc."),
            (&[0x00, 0x50, 0x56], "VMware, Inc."),
            (&[0x08, 0x00, 0x27], "Oracle VirtualBox virtual NIC"),
            (&[0x52, 0x54, 0x00], "QEMU/KVM virtual NIC"),
            (&[0x00, 0x15, 0x5D], "Microsoft Corporation (Hyper-V)"),
            (&[0x00, 0x1C, 0x42], "Parallels, Inc."),
            (&[0xB8, 0x27, 0xEB], "Raspberry Pi Foundation"),
            (&[0x00, 0x1B, 0x21], "Intel Corporate"),
            (&[0x00, 0x14, 0x22], "Dell Inc."),
            (&[0x00, 0x00, 0x0C], "Cisco Systems, Inc"),
        ];

        let entries = table
            .iter()
            .map(|(prefix, vendor)| (**prefix, vendor.to_string()))
            .collect();
        Self { entries }
    }

    /// Resolve a MAC address to its registered vendor
    pub fn lookup(&self, mac: &MacAddr) -> Option<&str> {
        self.entries
            .get(&[mac.0, mac.1, mac.2])
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse `AABBCC` or `AA-BB-CC` (case-insensitive) into prefix bytes.
fn parse_prefix(s: &str) -> Option<[u8; 3]> {
    let hex: String = s.chars().filter(|c| *c != '-' && *c != ':').collect();
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mut prefix = [0u8; 3];
    for (i, byte) in prefix.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_dash_separated_prefixes() {
        let db = OuiDb::from_registry_text("00-0C-29   (hex)\t\tVMware, Inc.\n");
        let mac = MacAddr::new(0x00, 0x0C, 0x29, 0xAA, 0xBB, 0xCC);
        assert_eq!(db.lookup(&mac), Some("VMware, Inc."));
    }

    #[test]
    fn test_parses_bare_hex_prefixes() {
        let db = OuiDb::from_registry_text("525400 QEMU/KVM virtual NIC\n");
        let mac = MacAddr::new(0x52, 0x54, 0x00, 0x01, 0x02, 0x03);
        assert_eq!(db.lookup(&mac), Some("QEMU/KVM virtual NIC"));
    }

    #[test]
    fn test_comments_and_junk_lines_skipped() {
        let text = "# header\n\nnot-a-prefix Vendor Name\nZZ-00-11 Bogus\n00-1C-42 Parallels, Inc.\n";
        let db = OuiDb::from_registry_text(text);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_bundled_registry_loads() {
        let db = OuiDb::load_bundled();
        assert!(db.len() >= 10);
        let vmware = MacAddr::new(0x00, 0x50, 0x56, 0x00, 0x00, 0x01);
        assert!(db.lookup(&vmware).unwrap().contains("VMware"));
    }

    #[test]
    fn test_empty_registry_falls_back_to_builtin() {
        let db = OuiDb::from_registry_text("# nothing here\n");
        assert!(db.is_empty());

        let fallback = OuiDb::builtin();
        let qemu = MacAddr::new(0x52, 0x54, 0x00, 0xDE, 0xAD, 0x01);
        assert!(fallback.lookup(&qemu).unwrap().contains("QEMU"));
    }

    #[test]
    fn test_unknown_prefix_misses() {
        let db = OuiDb::builtin();
        let mac = MacAddr::new(0xFE, 0xED, 0xFA, 0xCE, 0x00, 0x01);
        assert!(db.lookup(&mac).is_none());
    }
}
