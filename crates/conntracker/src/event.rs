//! Flow and footprint events
//!
//! Events are exchanged as JSON lines, one per line:
//!
//! ```text
//! {"event":"flow","family":"ipv4","protocol":"tcp","src":"10.0.0.1","dst":"10.0.0.2","key":{"ports":{"src":80,"dst":443}},"confirmed":false}
//! {"event":"footprint","family":"ipv4","protocol":"tcp","src":"10.0.0.1","dst":"10.0.0.2","key":{"ports":{"src":80,"dst":443}},"trace":"TRACE: mangle:PREROUTING:rule:3"}
//! ```
//!
//! A footprint carries either a kernel `trace` prefix or a structured
//! `footprint` object. Blank lines and `#` comments are skipped.

use crate::error::{ConntrackerError, Result};
use crate::table::RecordOutcome;
use crate::tables::FlowTables;
use conntracker_types::{AddressFamily, FootprintEntry, L4Protocol, ProtocolKey};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One observed packet or connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub family: AddressFamily,
    pub protocol: L4Protocol,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub key: ProtocolKey,
    /// Reply direction seen
    #[serde(default)]
    pub confirmed: bool,
}

/// One firewall rule match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootprintEvent {
    pub family: AddressFamily,
    pub protocol: L4Protocol,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub key: ProtocolKey,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprint: Option<FootprintEntry>,
}

impl FootprintEvent {
    /// Resolves the footprint, preferring the structured form
    pub fn entry(&self) -> Result<FootprintEntry> {
        match (&self.footprint, &self.trace) {
            (Some(entry), _) => Ok(entry.clone()),
            (None, Some(trace)) => Ok(trace.parse()?),
            (None, None) => Err(ConntrackerError::MissingFootprint),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Event {
    Flow(FlowEvent),
    Footprint(FootprintEvent),
}

/// What applying an event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Flow(RecordOutcome),
    Footprint,
}

impl Event {
    /// Parses one feed line. `Ok(None)` for blank and comment lines.
    pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Event>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let event: Event = serde_json::from_str(line).map_err(|e| ConntrackerError::Event {
            line: line_no,
            reason: e.to_string(),
        })?;

        // resolve the footprint now so bad trace lines fail with their line number
        if let Event::Footprint(fp) = &event {
            fp.entry().map_err(|e| ConntrackerError::Event {
                line: line_no,
                reason: e.to_string(),
            })?;
        }

        Ok(Some(event))
    }

    /// Feeds the event into the tables
    pub fn apply(&self, tables: &mut FlowTables) -> Result<Applied> {
        match self {
            Event::Flow(flow) => tables
                .record_flow(
                    flow.family,
                    flow.protocol,
                    flow.src,
                    flow.dst,
                    flow.key,
                    flow.confirmed,
                )
                .map(Applied::Flow),
            Event::Footprint(fp) => {
                let entry = fp.entry()?;
                tables
                    .record_footprint(
                        fp.family,
                        fp.protocol,
                        fp.src,
                        fp.dst,
                        fp.key,
                        fp.confirmed,
                        entry,
                    )
                    .map(|()| Applied::Footprint)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::FootprintMatch;
    use conntracker_types::{FootprintKind, FootprintTable};
    use pretty_assertions::assert_eq;

    const FLOW: &str = r#"{"event":"flow","family":"ipv4","protocol":"tcp","src":"10.0.0.1","dst":"10.0.0.2","key":{"ports":{"src":80,"dst":443}},"confirmed":false}"#;

    #[test]
    fn test_parse_flow_line() {
        let event = Event::parse_line(1, FLOW).unwrap().unwrap();
        assert_eq!(
            event,
            Event::Flow(FlowEvent {
                family: AddressFamily::Ipv4,
                protocol: L4Protocol::Tcp,
                src: "10.0.0.1".parse().unwrap(),
                dst: "10.0.0.2".parse().unwrap(),
                key: ProtocolKey::ports(80, 443),
                confirmed: false,
            })
        );
    }

    #[test]
    fn test_skip_blank_and_comments() {
        assert_eq!(Event::parse_line(1, "").unwrap(), None);
        assert_eq!(Event::parse_line(2, "   # replayed from host-a").unwrap(), None);
    }

    #[test]
    fn test_confirmed_defaults_false() {
        let line = r#"{"event":"flow","family":"ipv6","protocol":"icmp","src":"::1","dst":"::2","key":{"icmp":{"type":128,"code":0}}}"#;
        match Event::parse_line(1, line).unwrap() {
            Some(Event::Flow(flow)) => assert!(!flow.confirmed),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_footprint_forms() {
        let trace = r#"{"event":"footprint","family":"ipv4","protocol":"udp","src":"10.0.0.1","dst":"10.0.0.2","key":{"ports":{"src":5353,"dst":53}},"trace":"TRACE: raw:PREROUTING:policy:4"}"#;
        let structured = r#"{"event":"footprint","family":"ipv4","protocol":"udp","src":"10.0.0.1","dst":"10.0.0.2","key":{"ports":{"src":5353,"dst":53}},"footprint":{"table":"raw","kind":"policy","chain":"PREROUTING","position":4}}"#;

        let expected = FootprintEntry::new(FootprintTable::Raw, FootprintKind::Policy, "PREROUTING", 4);
        for line in [trace, structured] {
            match Event::parse_line(1, line).unwrap() {
                Some(Event::Footprint(fp)) => assert_eq!(fp.entry().unwrap(), expected),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_bad_lines_carry_line_number() {
        let err = Event::parse_line(7, "{not json").unwrap_err();
        assert!(matches!(err, ConntrackerError::Event { line: 7, .. }));

        let missing = r#"{"event":"footprint","family":"ipv4","protocol":"tcp","src":"10.0.0.1","dst":"10.0.0.2","key":{"ports":{"src":1,"dst":2}}}"#;
        let err = Event::parse_line(9, missing).unwrap_err();
        assert!(matches!(err, ConntrackerError::Event { line: 9, .. }));

        let bad_trace = r#"{"event":"footprint","family":"ipv4","protocol":"tcp","src":"10.0.0.1","dst":"10.0.0.2","key":{"ports":{"src":1,"dst":2}},"trace":"TRACE: filter"}"#;
        assert!(Event::parse_line(10, bad_trace).is_err());
    }

    #[test]
    fn test_apply() {
        let mut tables = FlowTables::init(FootprintMatch::Exact).unwrap();
        let event = Event::parse_line(1, FLOW).unwrap().unwrap();
        assert_eq!(
            event.apply(&mut tables).unwrap(),
            Applied::Flow(RecordOutcome::Inserted)
        );
        assert_eq!(tables.tcp_v4().len(), 1);
    }
}
