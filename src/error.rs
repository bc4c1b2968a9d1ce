//! Error handling for the netmapper engine
//!
//! Probe-level failures are classified into port states rather than
//! propagated; only input validation and environmental problems surface
//! to the caller as errors.

use thiserror::Error;

/// Main error type for mapping operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid port specification: {0}")]
    PortSpec(String),

    #[error("Name resolution failed: {0}")]
    Resolution(String),

    #[error("Network error: {0}")]
    Connectivity(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Vendor registry error: {0}")]
    VendorData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout error")]
    Timeout,
}

/// Result type alias for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    /// Errors that must abort before any network activity starts.
    pub fn is_input_error(&self) -> bool {
        matches!(self, ScanError::InvalidTarget(_) | ScanError::PortSpec(_))
    }

    /// Errors tolerated per probe: recorded against the affected field or
    /// port state, never aborting sibling probes.
    pub fn is_tolerable(&self) -> bool {
        matches!(
            self,
            ScanError::Resolution(_)
                | ScanError::Connectivity(_)
                | ScanError::Timeout
                | ScanError::VendorData(_)
        )
    }
}

impl From<std::net::AddrParseError> for ScanError {
    fn from(e: std::net::AddrParseError) -> Self {
        ScanError::InvalidTarget(e.to_string())
    }
}

impl From<std::num::ParseIntError> for ScanError {
    fn from(e: std::num::ParseIntError) -> Self {
        ScanError::InvalidTarget(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ScanError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ScanError::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_classification() {
        assert!(ScanError::InvalidTarget("10.0.0/99".into()).is_input_error());
        assert!(ScanError::PortSpec("0-70000".into()).is_input_error());
        assert!(!ScanError::Timeout.is_input_error());
    }

    #[test]
    fn test_tolerable_classification() {
        assert!(ScanError::Resolution("no PTR record".into()).is_tolerable());
        assert!(ScanError::Timeout.is_tolerable());
        assert!(!ScanError::InvalidTarget("x".into()).is_tolerable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: ScanError = io.into();
        assert!(matches!(err, ScanError::Io(_)));
    }
}
