//! Protocol-specific flow keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source and destination transport ports of a TCP or UDP flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortPair {
    #[serde(rename = "src")]
    pub src_port: u16,
    #[serde(rename = "dst")]
    pub dst_port: u16,
}

impl PortPair {
    pub const fn new(src_port: u16, dst_port: u16) -> Self {
        PortPair { src_port, dst_port }
    }
}

impl fmt::Display for PortPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ports {}->{}", self.src_port, self.dst_port)
    }
}

/// ICMP (or ICMPv6) message type and code of an ICMP flow.
///
/// Values are opaque: impossible type/code combinations are carried as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IcmpTypeCode {
    #[serde(rename = "type")]
    pub icmp_type: u8,
    pub code: u8,
}

impl IcmpTypeCode {
    pub const fn new(icmp_type: u8, code: u8) -> Self {
        IcmpTypeCode { icmp_type, code }
    }
}

impl fmt::Display for IcmpTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type {} code {}", self.icmp_type, self.code)
    }
}

/// The protocol half of a flow identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKey {
    Ports(PortPair),
    Icmp(IcmpTypeCode),
}

impl ProtocolKey {
    pub const fn ports(src_port: u16, dst_port: u16) -> Self {
        ProtocolKey::Ports(PortPair::new(src_port, dst_port))
    }

    pub const fn icmp(icmp_type: u8, code: u8) -> Self {
        ProtocolKey::Icmp(IcmpTypeCode::new(icmp_type, code))
    }

    pub const fn as_ports(&self) -> Option<&PortPair> {
        match self {
            ProtocolKey::Ports(ports) => Some(ports),
            ProtocolKey::Icmp(_) => None,
        }
    }

    pub const fn as_icmp(&self) -> Option<&IcmpTypeCode> {
        match self {
            ProtocolKey::Ports(_) => None,
            ProtocolKey::Icmp(icmp) => Some(icmp),
        }
    }
}

impl fmt::Display for ProtocolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKey::Ports(ports) => ports.fmt(f),
            ProtocolKey::Icmp(icmp) => icmp.fmt(f),
        }
    }
}
