//! Protocol comparators
//!
//! Every comparator is a pure total order consistent with equality. Flow
//! tables sort by [`compare_flow_key`]: address pair, then protocol key, then
//! the confirmation flag (unconfirmed first).

use crate::codec::AddressCodec;
use crate::flow::{AddressPair, FlowIdentity};
use conntracker_types::{IcmpTypeCode, PortPair, ProtocolKey};
use std::cmp::Ordering;
use std::fmt;

/// Per-protocol key handling used by the generic flow table
pub trait KeyCodec: Copy + Eq + fmt::Debug {
    /// Total order over keys of this protocol
    fn compare(&self, other: &Self) -> Ordering;

    /// Narrows a `ProtocolKey`, returning `None` for the other key shape
    fn from_key(key: ProtocolKey) -> Option<Self>;
}

impl KeyCodec for PortPair {
    fn compare(&self, other: &Self) -> Ordering {
        compare_port_pair(self, other)
    }

    fn from_key(key: ProtocolKey) -> Option<Self> {
        key.as_ports().copied()
    }
}

impl KeyCodec for IcmpTypeCode {
    fn compare(&self, other: &Self) -> Ordering {
        compare_type_code(self, other)
    }

    fn from_key(key: ProtocolKey) -> Option<Self> {
        key.as_icmp().copied()
    }
}

/// Source address first, then destination
pub fn compare_address_pair<A: AddressCodec>(
    one: &AddressPair<A>,
    two: &AddressPair<A>,
) -> Ordering {
    one.src
        .compare(&two.src)
        .then_with(|| one.dst.compare(&two.dst))
}

/// Destination port first, then source port.
///
/// Groups flows by the service-side port.
pub fn compare_port_pair(one: &PortPair, two: &PortPair) -> Ordering {
    one.dst_port
        .cmp(&two.dst_port)
        .then_with(|| one.src_port.cmp(&two.src_port))
}

/// ICMP type first, then code
pub fn compare_type_code(one: &IcmpTypeCode, two: &IcmpTypeCode) -> Ordering {
    one.icmp_type
        .cmp(&two.icmp_type)
        .then_with(|| one.code.cmp(&two.code))
}

/// Full table order: address pair, protocol key, then confirmation flag
pub fn compare_flow_key<A: AddressCodec, K: KeyCodec>(
    one: &FlowIdentity<A, K>,
    one_confirmed: bool,
    two: &FlowIdentity<A, K>,
    two_confirmed: bool,
) -> Ordering {
    compare_address_pair(&one.addrs, &two.addrs)
        .then_with(|| one.key.compare(&two.key))
        .then_with(|| one_confirmed.cmp(&two_confirmed))
}
