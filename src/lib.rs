//! netmapper - network discovery and fingerprinting engine
//!
//! Parses a target spec into an address set, discovers live hosts over
//! ICMP, classifies TCP/UDP port states concurrently, names services
//! from their banners, infers the probable OS from TTL, banner and
//! port-pattern evidence, and assembles it all into a network map.

pub mod config;
pub mod discovery;
pub mod error;
pub mod fingerprint;
pub mod mapper;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod services;
pub mod targets;
pub mod vendor;

// Re-export commonly used types
pub use config::ScanOptions;
pub use discovery::{HostDiscoverer, HostRecord};
pub use error::{ScanError, ScanResult};
pub use fingerprint::{Confidence, OsFamily, OsFingerprint, OsFingerprinter};
pub use mapper::{NetworkMap, NetworkMapper};
pub use ports::{PortPreset, PortSelection};
pub use probe::{EchoReply, IcmpProber, PlatformProber};
pub use scanner::{PortProbeResult, PortScanner, PortState, Protocol};
pub use services::ServiceDetector;
pub use targets::TargetSet;
pub use vendor::OuiDb;

pub type Result<T> = std::result::Result<T, ScanError>;
