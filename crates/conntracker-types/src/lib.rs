//! Common conntracker types shared by the flow engine and event producers.
//!
//! This crate provides type-safe representations of the values that flow
//! and firewall-trace events carry:
//!
//! - [`AddressFamily`] and [`L4Protocol`]: which of the six flow tables an
//!   event belongs to
//! - [`ProtocolKey`]: port pair (TCP/UDP) or ICMP type/code
//! - [`FootprintEntry`]: one firewall rule match (table, kind, chain, position)

mod family;
mod footprint;
mod key;

pub use family::{AddressFamily, L4Protocol};
pub use footprint::{CHAIN_NAME_MAX, FootprintEntry, FootprintKind, FootprintTable};
pub use key::{IcmpTypeCode, PortPair, ProtocolKey};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid address family: {0}")]
    InvalidAddressFamily(String),

    #[error("invalid L4 protocol: {0}")]
    InvalidProtocol(String),

    #[error("invalid footprint table: {0}")]
    InvalidFootprintTable(String),

    #[error("invalid footprint kind: {0}")]
    InvalidFootprintKind(String),

    #[error("invalid trace prefix: {0}")]
    InvalidTrace(String),
}
