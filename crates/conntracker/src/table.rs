//! Sorted flow table with confirm/promote reconciliation
//!
//! A table holds the flows of one (protocol, family) pair in a vector kept in
//! [`compare_flow_key`] order, so lookups are binary searches.
//!
//! # Reconciliation
//!
//! | existing entry       | observed     | result                          |
//! |----------------------|--------------|---------------------------------|
//! | same identity + flag | any          | no-op ([`RecordOutcome::Duplicate`]) |
//! | confirmed            | unconfirmed  | no-op ([`RecordOutcome::Subsumed`])  |
//! | unconfirmed          | confirmed    | flag flipped in place ([`RecordOutcome::Promoted`]) |
//! | none                 | any          | inserted with an empty trace    |
//!
//! Promotion changes the tertiary sort key of a record without moving it.
//! This stays ordered because promotion only happens when no confirmed entry
//! for the identity exists, so the record's neighbours still bracket it.

use crate::codec::AddressCodec;
use crate::compare::{compare_flow_key, KeyCodec};
use crate::flow::{FlowIdentity, FlowRecord};
use conntracker_types::{AddressFamily, FootprintEntry, L4Protocol};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::net::{Ipv4Addr, Ipv6Addr};

use conntracker_types::{IcmpTypeCode, PortPair};

/// What `record_flow` did with an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// New record added
    Inserted,
    /// Existing unconfirmed record flipped to confirmed
    Promoted,
    /// Exact (identity, flag) already present
    Duplicate,
    /// Unconfirmed observation of an already confirmed flow
    Subsumed,
}

/// How footprints find their flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FootprintMatch {
    /// Only the record with the same identity and confirmation flag
    #[default]
    Exact,
    /// Exact record first, then the one with the opposite flag
    EitherDirection,
}

/// Sorted flows of one (protocol, family) pair
#[derive(Debug, Clone)]
pub struct FlowTable<A, K> {
    protocol: L4Protocol,
    flows: Vec<FlowRecord<A, K>>,
}

impl<A: AddressCodec, K: KeyCodec> FlowTable<A, K> {
    pub fn new(protocol: L4Protocol) -> Self {
        FlowTable {
            protocol,
            flows: Vec::new(),
        }
    }

    pub fn protocol(&self) -> L4Protocol {
        self.protocol
    }

    pub fn family(&self) -> AddressFamily {
        A::FAMILY
    }

    /// "TCPv4", "ICMPv6", ...
    pub fn label(&self) -> String {
        self.protocol.label(A::FAMILY)
    }

    fn search(&self, identity: &FlowIdentity<A, K>, confirmed: bool) -> Result<usize, usize> {
        self.flows.binary_search_by(|record| {
            compare_flow_key(record.identity(), record.is_confirmed(), identity, confirmed)
        })
    }

    fn position(&self, identity: &FlowIdentity<A, K>, confirmed: bool) -> Option<usize> {
        self.search(identity, confirmed).ok()
    }

    /// Exact lookup of (identity, flag)
    pub fn lookup(
        &self,
        identity: &FlowIdentity<A, K>,
        confirmed: bool,
    ) -> Option<&FlowRecord<A, K>> {
        self.position(identity, confirmed).map(|idx| &self.flows[idx])
    }

    pub(crate) fn lookup_mut(
        &mut self,
        identity: &FlowIdentity<A, K>,
        confirmed: bool,
    ) -> Option<&mut FlowRecord<A, K>> {
        match self.position(identity, confirmed) {
            Some(idx) => self.flows.get_mut(idx),
            None => None,
        }
    }

    /// Reconciles one observation against the table.
    pub fn record_flow(&mut self, identity: FlowIdentity<A, K>, confirmed: bool) -> RecordOutcome {
        if self.position(&identity, confirmed).is_some() {
            return RecordOutcome::Duplicate;
        }

        match (confirmed, self.position(&identity, !confirmed)) {
            (false, Some(_)) => RecordOutcome::Subsumed,
            (true, Some(idx)) => {
                self.flows[idx].confirm();
                RecordOutcome::Promoted
            }
            (_, None) => {
                self.insert(identity, confirmed);
                RecordOutcome::Inserted
            }
        }
    }

    fn insert(&mut self, identity: FlowIdentity<A, K>, confirmed: bool) {
        // callers checked absence, so search always yields an insertion point
        let idx = self.search(&identity, confirmed).unwrap_or_else(|idx| idx);
        self.flows.insert(idx, FlowRecord::new(identity, confirmed));
    }

    /// Appends a footprint to the matching record's trace.
    ///
    /// Returns false when no record matches under `policy`.
    pub(crate) fn attach(
        &mut self,
        identity: &FlowIdentity<A, K>,
        confirmed: bool,
        entry: FootprintEntry,
        policy: FootprintMatch,
    ) -> bool {
        let confirmed = match policy {
            FootprintMatch::EitherDirection if self.position(identity, confirmed).is_none() => {
                !confirmed
            }
            _ => confirmed,
        };

        match self.lookup_mut(identity, confirmed) {
            Some(record) => {
                record.trace_mut().append(entry);
                true
            }
            None => false,
        }
    }

    /// Flows in sort order
    pub fn iter(&self) -> std::slice::Iter<'_, FlowRecord<A, K>> {
        self.flows.iter()
    }

    pub fn for_each_ordered<F>(&self, visitor: F)
    where
        F: FnMut(&FlowRecord<A, K>),
    {
        self.flows.iter().for_each(visitor);
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Number of confirmed flows
    pub fn confirmed_count(&self) -> usize {
        self.flows.iter().filter(|r| r.is_confirmed()).count()
    }

    /// Total footprints across all traces
    pub fn footprint_count(&self) -> usize {
        self.flows.iter().map(|r| r.trace().len()).sum()
    }

    /// Checks that records are in non-decreasing `compare_flow_key` order
    pub fn is_sorted(&self) -> bool {
        self.flows.windows(2).all(|pair| {
            compare_flow_key(
                pair[0].identity(),
                pair[0].is_confirmed(),
                pair[1].identity(),
                pair[1].is_confirmed(),
            ) != Ordering::Greater
        })
    }
}

impl<'a, A: AddressCodec, K: KeyCodec> IntoIterator for &'a FlowTable<A, K> {
    type Item = &'a FlowRecord<A, K>;
    type IntoIter = std::slice::Iter<'a, FlowRecord<A, K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub type TcpV4Table = FlowTable<Ipv4Addr, PortPair>;
pub type UdpV4Table = FlowTable<Ipv4Addr, PortPair>;
pub type IcmpV4Table = FlowTable<Ipv4Addr, IcmpTypeCode>;
pub type TcpV6Table = FlowTable<Ipv6Addr, PortPair>;
pub type UdpV6Table = FlowTable<Ipv6Addr, PortPair>;
pub type IcmpV6Table = FlowTable<Ipv6Addr, IcmpTypeCode>;

#[cfg(test)]
mod tests {
    use super::*;
    use conntracker_types::{FootprintKind, FootprintTable};
    use pretty_assertions::assert_eq;

    fn tcp(src: &str, dst: &str, sport: u16, dport: u16) -> FlowIdentity<Ipv4Addr, PortPair> {
        FlowIdentity::new(
            src.parse().unwrap(),
            dst.parse().unwrap(),
            PortPair::new(sport, dport),
        )
    }

    fn fp(chain: &str, position: u32) -> FootprintEntry {
        FootprintEntry::new(FootprintTable::Filter, FootprintKind::Rule, chain, position)
    }

    #[test]
    fn test_insert_unconfirmed() {
        let mut table = TcpV4Table::new(L4Protocol::Tcp);
        let id = tcp("10.0.0.1", "10.0.0.2", 80, 443);
        assert_eq!(table.record_flow(id, false), RecordOutcome::Inserted);
        assert_eq!(table.len(), 1);
        assert!(table.lookup(&id, false).is_some());
        assert!(table.lookup(&id, true).is_none());
    }

    #[test]
    fn test_duplicate_is_noop() {
        let mut table = TcpV4Table::new(L4Protocol::Tcp);
        let id = tcp("10.0.0.1", "10.0.0.2", 80, 443);
        table.record_flow(id, false);
        let before = table.clone();
        assert_eq!(table.record_flow(id, false), RecordOutcome::Duplicate);
        assert_eq!(table.iter().collect::<Vec<_>>(), before.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_promotion_keeps_trace() {
        let mut table = TcpV4Table::new(L4Protocol::Tcp);
        let id = tcp("10.0.0.1", "10.0.0.2", 80, 443);
        table.record_flow(id, false);
        assert!(table.attach(&id, false, fp("INPUT", 1), FootprintMatch::Exact));

        assert_eq!(table.record_flow(id, true), RecordOutcome::Promoted);
        assert_eq!(table.len(), 1);
        let record = table.lookup(&id, true).expect("promoted record");
        assert!(record.is_confirmed());
        assert_eq!(record.trace().len(), 1);
        assert!(table.lookup(&id, false).is_none());
    }

    #[test]
    fn test_confirmed_subsumes_unconfirmed() {
        let mut table = TcpV4Table::new(L4Protocol::Tcp);
        let id = tcp("10.0.0.1", "10.0.0.2", 80, 443);
        assert_eq!(table.record_flow(id, true), RecordOutcome::Inserted);
        assert_eq!(table.record_flow(id, false), RecordOutcome::Subsumed);
        assert_eq!(table.len(), 1);
        assert!(table.lookup(&id, false).is_none());
    }

    #[test]
    fn test_sorted_after_mixed_inserts() {
        let mut table = TcpV4Table::new(L4Protocol::Tcp);
        let ids = [
            tcp("10.0.0.9", "10.0.0.1", 1000, 22),
            tcp("10.0.0.1", "10.0.0.2", 80, 443),
            tcp("10.0.0.1", "10.0.0.2", 81, 443),
            tcp("10.0.0.1", "10.0.0.2", 9999, 53),
            tcp("192.168.1.1", "10.0.0.2", 80, 443),
        ];
        for (i, id) in ids.iter().enumerate() {
            table.record_flow(*id, i % 2 == 0);
        }
        assert!(table.is_sorted());

        let dports: Vec<u16> = table
            .iter()
            .filter(|r| r.src() == "10.0.0.1".parse::<Ipv4Addr>().unwrap())
            .map(|r| r.key().dst_port)
            .collect();
        assert_eq!(dports, vec![53, 443, 443]);
    }

    #[test]
    fn test_promotion_in_place_keeps_order() {
        // neighbours on both sides of the promoted record
        let mut table = TcpV4Table::new(L4Protocol::Tcp);
        let low = tcp("10.0.0.1", "10.0.0.2", 80, 442);
        let mid = tcp("10.0.0.1", "10.0.0.2", 80, 443);
        let high = tcp("10.0.0.1", "10.0.0.2", 80, 444);
        table.record_flow(low, true);
        table.record_flow(mid, false);
        table.record_flow(high, false);

        assert_eq!(table.record_flow(mid, true), RecordOutcome::Promoted);
        assert!(table.is_sorted());
        assert!(table.lookup(&mid, true).is_some());
        assert!(table.lookup(&low, true).is_some());
        assert!(table.lookup(&high, false).is_some());

        let order: Vec<(u16, bool)> = table
            .iter()
            .map(|r| (r.key().dst_port, r.is_confirmed()))
            .collect();
        assert_eq!(order, vec![(442, true), (443, true), (444, false)]);
    }

    #[test]
    fn test_attach_policy() {
        let mut table = TcpV4Table::new(L4Protocol::Tcp);
        let id = tcp("10.0.0.1", "10.0.0.2", 80, 443);
        table.record_flow(id, true);

        assert!(!table.attach(&id, false, fp("INPUT", 1), FootprintMatch::Exact));
        assert!(table.attach(&id, false, fp("INPUT", 2), FootprintMatch::EitherDirection));
        assert_eq!(table.footprint_count(), 1);
    }

    #[test]
    fn test_icmp_type_order() {
        let mut table = IcmpV4Table::new(L4Protocol::Icmp);
        let src: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let dst: Ipv4Addr = "10.0.0.2".parse().unwrap();
        table.record_flow(FlowIdentity::new(src, dst, IcmpTypeCode::new(8, 0)), false);
        table.record_flow(FlowIdentity::new(src, dst, IcmpTypeCode::new(0, 0)), false);

        let types: Vec<u8> = table.iter().map(|r| r.key().icmp_type).collect();
        assert_eq!(types, vec![0, 8]);
        assert_eq!(table.label(), "ICMPv4");
    }
}
