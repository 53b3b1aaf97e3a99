//! Error types for conntracker

use conntracker_types::{AddressFamily, L4Protocol, ParseError, ProtocolKey};
use std::net::IpAddr;
use thiserror::Error;

/// Errors that can occur while recording or reporting flows
#[derive(Debug, Error)]
pub enum ConntrackerError {
    /// Footprint arrived for a flow that was never recorded. Non-fatal: the
    /// footprint is counted and dropped.
    #[error("Orphan footprint: no {protocol} {family} flow matches")]
    OrphanFootprint {
        family: AddressFamily,
        protocol: L4Protocol,
    },

    /// An address does not belong to the declared family
    #[error("Address family mismatch: expected {expected}, got src={src} dst={dst}")]
    FamilyMismatch {
        expected: AddressFamily,
        src: IpAddr,
        dst: IpAddr,
    },

    /// Port pair given for ICMP, or type/code given for TCP/UDP
    #[error("Key mismatch: {key} is not a valid {protocol} key")]
    KeyMismatch { protocol: L4Protocol, key: ProtocolKey },

    /// Footprint event with neither a trace prefix nor a structured footprint
    #[error("Footprint event carries no footprint")]
    MissingFootprint,

    /// Malformed event feed line
    #[error("Invalid event on line {line}: {reason}")]
    Event { line: usize, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Textual parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConntrackerError {
    /// Returns true for per-event conditions the caller may log and skip.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConntrackerError::OrphanFootprint { .. }
                | ConntrackerError::FamilyMismatch { .. }
                | ConntrackerError::KeyMismatch { .. }
                | ConntrackerError::MissingFootprint
                | ConntrackerError::Event { .. }
                | ConntrackerError::Parse(_)
        )
    }
}

/// Result type alias for conntracker operations
pub type Result<T> = std::result::Result<T, ConntrackerError>;
