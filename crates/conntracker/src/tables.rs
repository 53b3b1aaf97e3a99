//! The six flow tables and their lifecycle
//!
//! [`FlowTables`] is constructed once by the application, passed by `&mut`
//! to whatever feeds it events, and torn down at exit. It routes each event
//! to the table for its (family, protocol) pair and rejects events whose
//! addresses or key do not fit that table.

use crate::codec::AddressCodec;
use crate::compare::KeyCodec;
use crate::error::{ConntrackerError, Result};
use crate::flow::FlowIdentity;
use crate::metrics::MetricsCollector;
use crate::report;
use crate::table::{
    FlowTable, FootprintMatch, IcmpV4Table, IcmpV6Table, RecordOutcome, TcpV4Table, TcpV6Table,
    UdpV4Table, UdpV6Table,
};
use conntracker_types::{AddressFamily, FootprintEntry, L4Protocol, ProtocolKey};
use std::io::Write;
use std::net::IpAddr;
use tracing::{debug, info, instrument, warn};

/// Runs `$body` with `$table` bound to the table selected by family/protocol
macro_rules! with_table {
    (mut $tables:expr, $family:expr, $protocol:expr, $table:ident => $body:expr) => {
        with_table!(@select [&mut] $tables, $family, $protocol, $table => $body)
    };
    (ref $tables:expr, $family:expr, $protocol:expr, $table:ident => $body:expr) => {
        with_table!(@select [&] $tables, $family, $protocol, $table => $body)
    };
    (@select [$($borrow:tt)+]
     $tables:expr, $family:expr, $protocol:expr, $table:ident => $body:expr) => {
        match ($family, $protocol) {
            (AddressFamily::Ipv4, L4Protocol::Tcp) => {
                let $table = $($borrow)+ $tables.tcp_v4;
                $body
            }
            (AddressFamily::Ipv4, L4Protocol::Udp) => {
                let $table = $($borrow)+ $tables.udp_v4;
                $body
            }
            (AddressFamily::Ipv4, L4Protocol::Icmp) => {
                let $table = $($borrow)+ $tables.icmp_v4;
                $body
            }
            (AddressFamily::Ipv6, L4Protocol::Tcp) => {
                let $table = $($borrow)+ $tables.tcp_v6;
                $body
            }
            (AddressFamily::Ipv6, L4Protocol::Udp) => {
                let $table = $($borrow)+ $tables.udp_v6;
                $body
            }
            (AddressFamily::Ipv6, L4Protocol::Icmp) => {
                let $table = $($borrow)+ $tables.icmp_v6;
                $body
            }
        }
    };
}

/// Per-table summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub label: String,
    pub flows: usize,
    pub confirmed: usize,
    pub footprints: usize,
}

impl TableStats {
    fn of<A: AddressCodec, K: KeyCodec>(table: &FlowTable<A, K>) -> Self {
        TableStats {
            label: table.label(),
            flows: table.len(),
            confirmed: table.confirmed_count(),
            footprints: table.footprint_count(),
        }
    }
}

/// Process-wide flow state: one sorted table per (protocol, family)
pub struct FlowTables {
    tcp_v4: TcpV4Table,
    udp_v4: UdpV4Table,
    icmp_v4: IcmpV4Table,
    tcp_v6: TcpV6Table,
    udp_v6: UdpV6Table,
    icmp_v6: IcmpV6Table,
    footprint_match: FootprintMatch,
    metrics: MetricsCollector,
}

impl FlowTables {
    /// Allocates empty tables
    pub fn init(footprint_match: FootprintMatch) -> Result<Self> {
        let tables = FlowTables {
            tcp_v4: FlowTable::new(L4Protocol::Tcp),
            udp_v4: FlowTable::new(L4Protocol::Udp),
            icmp_v4: FlowTable::new(L4Protocol::Icmp),
            tcp_v6: FlowTable::new(L4Protocol::Tcp),
            udp_v6: FlowTable::new(L4Protocol::Udp),
            icmp_v6: FlowTable::new(L4Protocol::Icmp),
            footprint_match,
            metrics: MetricsCollector::new()?,
        };
        info!(footprint_match = ?footprint_match, "Flow tables initialized");
        Ok(tables)
    }

    /// Releases every flow, trace and footprint, returning final statistics
    pub fn teardown(self) -> Vec<TableStats> {
        let stats = self.stats();
        for table in &stats {
            info!(
                table = %table.label,
                flows = table.flows,
                confirmed = table.confirmed,
                footprints = table.footprints,
                "Tearing down flow table"
            );
        }
        info!(
            orphan_footprints = self.orphan_footprints(),
            "Flow tables torn down"
        );
        stats
    }

    /// Records one flow observation.
    ///
    /// Duplicates are not errors; they come back as
    /// [`RecordOutcome::Duplicate`] or [`RecordOutcome::Subsumed`].
    #[instrument(skip(self), level = "debug")]
    pub fn record_flow(
        &mut self,
        family: AddressFamily,
        protocol: L4Protocol,
        src: IpAddr,
        dst: IpAddr,
        key: ProtocolKey,
        confirmed: bool,
    ) -> Result<RecordOutcome> {
        let result = with_table!(mut self, family, protocol, table => {
            resolve_identity(table, src, dst, key).map(|id| table.record_flow(id, confirmed))
        });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.rejected_events_total.inc();
                warn!(error = %e, "Rejected flow event");
                return Err(e);
            }
        };

        match outcome {
            RecordOutcome::Inserted => {
                self.metrics.flows_inserted_total.inc();
                self.metrics.flows.inc();
            }
            RecordOutcome::Promoted => self.metrics.flows_promoted_total.inc(),
            RecordOutcome::Duplicate | RecordOutcome::Subsumed => {
                self.metrics.flow_duplicates_total.inc()
            }
        }
        debug!(?outcome, "Recorded flow");

        Ok(outcome)
    }

    /// Appends a footprint to the flow it belongs to.
    ///
    /// A footprint with no matching flow is counted and dropped, and reported
    /// as [`ConntrackerError::OrphanFootprint`].
    #[instrument(skip(self), level = "debug")]
    #[allow(clippy::too_many_arguments)]
    pub fn record_footprint(
        &mut self,
        family: AddressFamily,
        protocol: L4Protocol,
        src: IpAddr,
        dst: IpAddr,
        key: ProtocolKey,
        confirmed: bool,
        entry: FootprintEntry,
    ) -> Result<()> {
        let policy = self.footprint_match;
        let result = with_table!(mut self, family, protocol, table => {
            resolve_identity(table, src, dst, key)
                .map(|id| table.attach(&id, confirmed, entry, policy))
        });

        match result {
            Ok(true) => {
                self.metrics.footprints_attached_total.inc();
                Ok(())
            }
            Ok(false) => {
                self.metrics.orphan_footprints_total.inc();
                debug!("Dropped orphan footprint");
                Err(ConntrackerError::OrphanFootprint { family, protocol })
            }
            Err(e) => {
                self.metrics.rejected_events_total.inc();
                warn!(error = %e, "Rejected footprint event");
                Err(e)
            }
        }
    }

    /// Exact lookup across tables, for diagnostics
    pub fn contains_flow(
        &self,
        family: AddressFamily,
        protocol: L4Protocol,
        src: IpAddr,
        dst: IpAddr,
        key: ProtocolKey,
        confirmed: bool,
    ) -> Result<bool> {
        with_table!(ref self, family, protocol, table => {
            resolve_identity(table, src, dst, key).map(|id| table.lookup(&id, confirmed).is_some())
        })
    }

    /// Writes every flow and its trace to `sink`, TCPv4 through ICMPv6
    pub fn render_all<W: Write>(&self, sink: &mut W) -> std::io::Result<()> {
        report::render_table(&self.tcp_v4, sink)?;
        report::render_table(&self.udp_v4, sink)?;
        report::render_table(&self.icmp_v4, sink)?;
        report::render_table(&self.tcp_v6, sink)?;
        report::render_table(&self.udp_v6, sink)?;
        report::render_table(&self.icmp_v6, sink)?;
        sink.flush()?;

        info!(flows = self.total_flows(), "Dumped flow tables");
        Ok(())
    }

    pub fn tcp_v4(&self) -> &TcpV4Table {
        &self.tcp_v4
    }

    pub fn udp_v4(&self) -> &UdpV4Table {
        &self.udp_v4
    }

    pub fn icmp_v4(&self) -> &IcmpV4Table {
        &self.icmp_v4
    }

    pub fn tcp_v6(&self) -> &TcpV6Table {
        &self.tcp_v6
    }

    pub fn udp_v6(&self) -> &UdpV6Table {
        &self.udp_v6
    }

    pub fn icmp_v6(&self) -> &IcmpV6Table {
        &self.icmp_v6
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn orphan_footprints(&self) -> u64 {
        self.metrics.orphan_footprints_total.get()
    }

    pub fn total_flows(&self) -> usize {
        self.tcp_v4.len()
            + self.udp_v4.len()
            + self.icmp_v4.len()
            + self.tcp_v6.len()
            + self.udp_v6.len()
            + self.icmp_v6.len()
    }

    /// Statistics in render order
    pub fn stats(&self) -> Vec<TableStats> {
        vec![
            TableStats::of(&self.tcp_v4),
            TableStats::of(&self.udp_v4),
            TableStats::of(&self.icmp_v4),
            TableStats::of(&self.tcp_v6),
            TableStats::of(&self.udp_v6),
            TableStats::of(&self.icmp_v6),
        ]
    }
}

/// Narrows raw addresses and key to the table's types
fn resolve_identity<A: AddressCodec, K: KeyCodec>(
    table: &FlowTable<A, K>,
    src: IpAddr,
    dst: IpAddr,
    key: ProtocolKey,
) -> Result<FlowIdentity<A, K>> {
    let (Some(src_addr), Some(dst_addr)) = (A::from_ip(src), A::from_ip(dst)) else {
        return Err(ConntrackerError::FamilyMismatch {
            expected: A::FAMILY,
            src,
            dst,
        });
    };
    let key = K::from_key(key).ok_or(ConntrackerError::KeyMismatch {
        protocol: table.protocol(),
        key,
    })?;
    Ok(FlowIdentity::new(src_addr, dst_addr, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conntracker_types::{FootprintKind, FootprintTable};
    use pretty_assertions::assert_eq;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn tables() -> FlowTables {
        FlowTables::init(FootprintMatch::Exact).unwrap()
    }

    #[test]
    fn test_routes_by_family_and_protocol() {
        let mut t = tables();
        t.record_flow(
            AddressFamily::Ipv4,
            L4Protocol::Udp,
            ip("10.0.0.1"),
            ip("8.8.8.8"),
            ProtocolKey::ports(5353, 53),
            false,
        )
        .unwrap();
        t.record_flow(
            AddressFamily::Ipv6,
            L4Protocol::Icmp,
            ip("fe80::1"),
            ip("fe80::2"),
            ProtocolKey::icmp(135, 0),
            true,
        )
        .unwrap();

        assert_eq!(t.udp_v4().len(), 1);
        assert_eq!(t.icmp_v6().len(), 1);
        assert_eq!(t.tcp_v4().len(), 0);
        assert_eq!(t.total_flows(), 2);
        assert_eq!(t.metrics().flows.get(), 2);
    }

    #[test]
    fn test_family_mismatch_rejected() {
        let mut t = tables();
        let err = t
            .record_flow(
                AddressFamily::Ipv4,
                L4Protocol::Tcp,
                ip("10.0.0.1"),
                ip("::1"),
                ProtocolKey::ports(1, 2),
                false,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ConntrackerError::FamilyMismatch {
                expected: AddressFamily::Ipv4,
                ..
            }
        ));
        assert_eq!(t.total_flows(), 0);
        assert_eq!(t.metrics().rejected_events_total.get(), 1);
    }

    #[test]
    fn test_key_mismatch_rejected() {
        let mut t = tables();
        let err = t
            .record_flow(
                AddressFamily::Ipv4,
                L4Protocol::Icmp,
                ip("10.0.0.1"),
                ip("10.0.0.2"),
                ProtocolKey::ports(1, 2),
                false,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ConntrackerError::KeyMismatch {
                protocol: L4Protocol::Icmp,
                ..
            }
        ));

        let err = t
            .record_footprint(
                AddressFamily::Ipv6,
                L4Protocol::Tcp,
                ip("::1"),
                ip("::2"),
                ProtocolKey::icmp(8, 0),
                false,
                FootprintEntry::new(FootprintTable::Raw, FootprintKind::Rule, "OUTPUT", 1),
            )
            .unwrap_err();
        assert!(matches!(err, ConntrackerError::KeyMismatch { .. }));
        assert_eq!(t.orphan_footprints(), 0);
        assert_eq!(t.total_flows(), 0);
    }

    #[test]
    fn test_outcome_counters() {
        let mut t = tables();
        let key = ProtocolKey::ports(80, 443);
        let (src, dst) = (ip("10.0.0.1"), ip("10.0.0.2"));
        let family = AddressFamily::Ipv4;
        let proto = L4Protocol::Tcp;

        let mut observe = |confirmed| {
            t.record_flow(family, proto, src, dst, key, confirmed).unwrap()
        };
        assert_eq!(observe(false), RecordOutcome::Inserted);
        assert_eq!(observe(false), RecordOutcome::Duplicate);
        assert_eq!(observe(true), RecordOutcome::Promoted);
        assert_eq!(observe(false), RecordOutcome::Subsumed);

        let m = t.metrics();
        assert_eq!(m.flows_inserted_total.get(), 1);
        assert_eq!(m.flows_promoted_total.get(), 1);
        assert_eq!(m.flow_duplicates_total.get(), 2);
        assert_eq!(m.flows.get(), 1);
    }

    #[test]
    fn test_either_direction_policy() {
        let mut t = FlowTables::init(FootprintMatch::EitherDirection).unwrap();
        let key = ProtocolKey::ports(80, 443);
        let (src, dst) = (ip("10.0.0.1"), ip("10.0.0.2"));
        let fp = FootprintEntry::new(FootprintTable::Filter, FootprintKind::Rule, "INPUT", 1);

        t.record_flow(AddressFamily::Ipv4, L4Protocol::Tcp, src, dst, key, true)
            .unwrap();
        t.record_footprint(AddressFamily::Ipv4, L4Protocol::Tcp, src, dst, key, false, fp)
            .unwrap();
        assert_eq!(t.tcp_v4().footprint_count(), 1);
    }

    #[test]
    fn test_contains_flow() {
        let mut t = tables();
        let key = ProtocolKey::icmp(128, 0);
        let (src, dst) = (ip("2001:db8::1"), ip("2001:db8::2"));
        t.record_flow(AddressFamily::Ipv6, L4Protocol::Icmp, src, dst, key, false)
            .unwrap();

        assert!(t
            .contains_flow(AddressFamily::Ipv6, L4Protocol::Icmp, src, dst, key, false)
            .unwrap());
        assert!(!t
            .contains_flow(AddressFamily::Ipv6, L4Protocol::Icmp, src, dst, key, true)
            .unwrap());
        assert!(!t
            .contains_flow(AddressFamily::Ipv6, L4Protocol::Icmp, dst, src, key, false)
            .unwrap());

        // the query validates like the mutators but does not count rejections
        let err = t
            .contains_flow(AddressFamily::Ipv6, L4Protocol::Udp, src, dst, key, false)
            .unwrap_err();
        assert!(matches!(err, ConntrackerError::KeyMismatch { .. }));
        assert_eq!(t.metrics().rejected_events_total.get(), 0);
    }

    #[test]
    fn test_teardown_reports_stats() {
        let mut t = tables();
        t.record_flow(
            AddressFamily::Ipv6,
            L4Protocol::Tcp,
            ip("::1"),
            ip("::2"),
            ProtocolKey::ports(1, 2),
            true,
        )
        .unwrap();
        let stats = t.teardown();
        assert_eq!(stats.len(), 6);
        assert_eq!(
            stats[3],
            TableStats {
                label: "TCPv6".to_string(),
                flows: 1,
                confirmed: 1,
                footprints: 0,
            }
        );
    }
}
