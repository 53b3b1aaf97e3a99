//! Flow tracking and firewall footprint correlation
//!
//! This crate keeps one deduplicated, sorted table of observed flows per
//! (L4 protocol, address family) pair and attaches firewall rule matches
//! ("footprints") to the flows they were observed on. The tables can be
//! rendered as a human-readable dump at any time.
//!
//! # Architecture
//!
//! ```text
//! event files ──▶ feed::read_events ──▶ mpsc ──▶ feed::drain
//!                                                     │
//!                                                     ▼
//!                                                FlowTables
//!                     TCPv4 UDPv4 ICMPv4 TCPv6 UDPv6 ICMPv6
//!                     (each a FlowTable<A: AddressCodec, K: KeyCodec>)
//!                                                     │
//!                                                     ▼
//!                                             report::render_table
//! ```
//!
//! Each [`FlowTable`] is a sorted vector searched by [`compare_flow_key`];
//! a flow's trace is an append-only list of [`FootprintEntry`] values.

pub mod codec;
pub mod compare;
pub mod config;
pub mod error;
pub mod event;
pub mod feed;
pub mod flow;
pub mod footprint;
pub mod metrics;
pub mod report;
pub mod table;
pub mod tables;

pub use codec::AddressCodec;
pub use compare::{compare_flow_key, KeyCodec};
pub use config::ConntrackerConfig;
pub use error::{ConntrackerError, Result};
pub use event::{Applied, Event, FlowEvent, FootprintEvent};
pub use feed::{drain, read_events, FeedSummary, ReadSummary};
pub use flow::{AddressPair, FlowIdentity, FlowRecord};
pub use footprint::FootprintTrace;
pub use metrics::MetricsCollector;
pub use table::{FlowTable, FootprintMatch, RecordOutcome};
pub use tables::{FlowTables, TableStats};

pub use conntracker_types::{
    AddressFamily, FootprintEntry, FootprintKind, FootprintTable, IcmpTypeCode, L4Protocol,
    PortPair, ProtocolKey,
};
