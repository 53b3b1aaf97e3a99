//! Rendering of flow tables
//!
//! One line per flow followed by one indented line per footprint:
//!
//! ```text
//!  TCPv4 [           0] src = 10.0.0.1 (port=80) to dst = 10.0.0.2 (port=443) (confirmed)
//!         footprint: table=mangle type=rule chain=PREROUTING position=3
//! ICMPv6 [           0] src = fe80::1 to dst = fe80::2 (type=135 | code=0)
//! ```

use crate::codec::AddressCodec;
use crate::compare::KeyCodec;
use crate::table::FlowTable;
use conntracker_types::{IcmpTypeCode, PortPair};
use std::fmt::Display;
use std::io::{self, Write};

pub const CONFIRMED_MARKER: &str = " (confirmed)";
const FOOTPRINT_INDENT: &str = "        ";

/// Protocol-specific flow line
pub trait RenderKey: KeyCodec {
    fn write_flow<W: Write + ?Sized, A: Display>(
        &self,
        sink: &mut W,
        label: &str,
        seq: u64,
        src: &A,
        dst: &A,
        marker: &str,
    ) -> io::Result<()>;
}

impl RenderKey for PortPair {
    fn write_flow<W: Write + ?Sized, A: Display>(
        &self,
        sink: &mut W,
        label: &str,
        seq: u64,
        src: &A,
        dst: &A,
        marker: &str,
    ) -> io::Result<()> {
        writeln!(
            sink,
            "{:>6} [{:>12}] src = {} (port={}) to dst = {} (port={}){}",
            label, seq, src, self.src_port, dst, self.dst_port, marker
        )
    }
}

impl RenderKey for IcmpTypeCode {
    fn write_flow<W: Write + ?Sized, A: Display>(
        &self,
        sink: &mut W,
        label: &str,
        seq: u64,
        src: &A,
        dst: &A,
        marker: &str,
    ) -> io::Result<()> {
        writeln!(
            sink,
            "{:>6} [{:>12}] src = {} to dst = {} (type={} | code={}){}",
            label, seq, src, dst, self.icmp_type, self.code, marker
        )
    }
}

/// Writes one table in sort order, numbering flows from 0.
///
/// Returns the number of flows written.
pub fn render_table<A, K, W>(table: &FlowTable<A, K>, sink: &mut W) -> io::Result<usize>
where
    A: AddressCodec,
    K: RenderKey,
    W: Write + ?Sized,
{
    let label = table.label();
    let mut seq: u64 = 0;

    for record in table {
        let marker = if record.is_confirmed() {
            CONFIRMED_MARKER
        } else {
            ""
        };
        record
            .key()
            .write_flow(sink, &label, seq, &record.src(), &record.dst(), marker)?;
        for entry in record.trace() {
            writeln!(sink, "{}footprint: {}", FOOTPRINT_INDENT, entry)?;
        }
        seq += 1;
    }

    Ok(table.len())
}
