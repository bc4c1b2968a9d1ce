//! Port lists and port-specification parsing

use crate::ScanError;
use serde::{Deserialize, Serialize};

/// The ~20 most commonly probed TCP/UDP ports, in ascending order.
pub const TOP_PORTS: [u16; 20] = [
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5900,
    8080,
];

/// Named presets for callers that do not supply an explicit list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortPreset {
    /// Top ~20 commonly probed ports
    Top,
    /// The well-known range 1-1023
    WellKnown,
}

impl PortPreset {
    pub fn ports(&self) -> Vec<u16> {
        match self {
            PortPreset::Top => TOP_PORTS.to_vec(),
            PortPreset::WellKnown => (1..=1023).collect(),
        }
    }
}

/// Either a named preset or an explicit caller-supplied list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortSelection {
    Preset(PortPreset),
    List(Vec<u16>),
}

impl Default for PortSelection {
    fn default() -> Self {
        PortSelection::Preset(PortPreset::Top)
    }
}

impl PortSelection {
    /// Resolve to a deduplicated, ascending port list
    pub fn resolve(&self) -> Vec<u16> {
        let mut ports = match self {
            PortSelection::Preset(preset) => preset.ports(),
            PortSelection::List(list) => list.clone(),
        };
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PortSelection::Preset(_) => false,
            PortSelection::List(list) => list.is_empty(),
        }
    }
}

/// Parse a port specification like `22,80,8000-8100` into a sorted,
/// deduplicated list. Port 0 and inverted ranges are rejected.
pub fn parse_port_spec(spec: &str) -> Result<Vec<u16>, ScanError> {
    let mut ports = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u16 = lo
                .trim()
                .parse()
                .map_err(|_| ScanError::PortSpec(format!("bad range start in '{}'", part)))?;
            let hi: u16 = hi
                .trim()
                .parse()
                .map_err(|_| ScanError::PortSpec(format!("bad range end in '{}'", part)))?;
            if lo == 0 || hi < lo {
                return Err(ScanError::PortSpec(format!("invalid range '{}'", part)));
            }
            ports.extend(lo..=hi);
        } else {
            let port: u16 = part
                .parse()
                .map_err(|_| ScanError::PortSpec(format!("bad port '{}'", part)))?;
            if port == 0 {
                return Err(ScanError::PortSpec("port 0 is not scannable".to_string()));
            }
            ports.push(port);
        }
    }

    if ports.is_empty() {
        return Err(ScanError::PortSpec("empty port specification".to_string()));
    }

    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}
