//! Firewall footprint types.
//!
//! A footprint is one firewall rule match attributed to a flow's packets, as
//! reported by the xtables `TRACE` target:
//!
//! ```text
//! TRACE: <table>:<chain>:<kind>:<position>
//! ```

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest chain name kept, in bytes (kernel limit is 32 including NUL).
pub const CHAIN_NAME_MAX: usize = 31;

const TRACE_PREFIX: &str = "TRACE:";

/// Netfilter table a footprint was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FootprintTable {
    Raw = 1,
    Mangle = 2,
    Nat = 3,
    Filter = 4,
    Unknown = 255,
}

impl FootprintTable {
    /// Maps a numeric table code; unrecognized codes become `Unknown`.
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => FootprintTable::Raw,
            2 => FootprintTable::Mangle,
            3 => FootprintTable::Nat,
            4 => FootprintTable::Filter,
            _ => FootprintTable::Unknown,
        }
    }

    pub const fn code(&self) -> u8 {
        *self as u8
    }

    /// Lenient name lookup used for kernel trace lines.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or(FootprintTable::Unknown)
    }
}

impl fmt::Display for FootprintTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FootprintTable::Raw => "raw",
            FootprintTable::Mangle => "mangle",
            FootprintTable::Nat => "nat",
            FootprintTable::Filter => "filter",
            FootprintTable::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for FootprintTable {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(FootprintTable::Raw),
            "mangle" => Ok(FootprintTable::Mangle),
            "nat" => Ok(FootprintTable::Nat),
            "filter" => Ok(FootprintTable::Filter),
            "unknown" => Ok(FootprintTable::Unknown),
            _ => Err(ParseError::InvalidFootprintTable(s.to_string())),
        }
    }
}

/// What kind of chain element produced the footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FootprintKind {
    /// The chain's default policy was applied.
    Policy = 1,
    /// A rule in the chain matched.
    Rule = 2,
    /// Fell off the end of a user-defined chain.
    Return = 3,
    Unknown = 255,
}

impl FootprintKind {
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => FootprintKind::Policy,
            2 => FootprintKind::Rule,
            3 => FootprintKind::Return,
            _ => FootprintKind::Unknown,
        }
    }

    pub const fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or(FootprintKind::Unknown)
    }
}

impl fmt::Display for FootprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FootprintKind::Policy => "policy",
            FootprintKind::Rule => "rule",
            FootprintKind::Return => "return",
            FootprintKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for FootprintKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "policy" => Ok(FootprintKind::Policy),
            "rule" => Ok(FootprintKind::Rule),
            "return" => Ok(FootprintKind::Return),
            "unknown" => Ok(FootprintKind::Unknown),
            _ => Err(ParseError::InvalidFootprintKind(s.to_string())),
        }
    }
}

/// One firewall rule match.
///
/// # Examples
///
/// ```
/// use conntracker_types::{FootprintEntry, FootprintKind, FootprintTable};
///
/// let fp: FootprintEntry = "TRACE: mangle:PREROUTING:rule:3".parse().unwrap();
/// assert_eq!(fp.table(), FootprintTable::Mangle);
/// assert_eq!(fp.kind(), FootprintKind::Rule);
/// assert_eq!(fp.chain(), "PREROUTING");
/// assert_eq!(fp.position(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "FootprintFields")]
pub struct FootprintEntry {
    table: FootprintTable,
    kind: FootprintKind,
    chain: String,
    position: u32,
}

#[derive(Deserialize)]
struct FootprintFields {
    table: FootprintTable,
    kind: FootprintKind,
    chain: String,
    position: u32,
}

impl From<FootprintFields> for FootprintEntry {
    fn from(f: FootprintFields) -> Self {
        FootprintEntry::new(f.table, f.kind, f.chain, f.position)
    }
}

impl FootprintEntry {
    /// Creates a footprint. Chain names longer than [`CHAIN_NAME_MAX`] bytes
    /// are cut at the nearest char boundary.
    pub fn new(
        table: FootprintTable,
        kind: FootprintKind,
        chain: impl Into<String>,
        position: u32,
    ) -> Self {
        let mut chain = chain.into();
        if chain.len() > CHAIN_NAME_MAX {
            let mut end = CHAIN_NAME_MAX;
            while !chain.is_char_boundary(end) {
                end -= 1;
            }
            chain.truncate(end);
        }
        FootprintEntry {
            table,
            kind,
            chain,
            position,
        }
    }

    pub const fn table(&self) -> FootprintTable {
        self.table
    }

    pub const fn kind(&self) -> FootprintKind {
        self.kind
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub const fn position(&self) -> u32 {
        self.position
    }
}

impl fmt::Display for FootprintEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table={} type={} chain={} position={}",
            self.table, self.kind, self.chain, self.position
        )
    }
}

impl FromStr for FootprintEntry {
    type Err = ParseError;

    /// Parses `"[TRACE: ]<table>:<chain>:<kind>:<position>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.trim();
        let body = body.strip_prefix(TRACE_PREFIX).unwrap_or(body).trim();

        let mut fields = body.splitn(4, ':');
        let (Some(table), Some(chain), Some(kind), Some(position)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ParseError::InvalidTrace(s.to_string()));
        };

        if chain.is_empty() {
            return Err(ParseError::InvalidTrace(s.to_string()));
        }

        // the kernel terminates the prefix with a space before the packet dump
        let position = position
            .split_whitespace()
            .next()
            .unwrap_or("")
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidTrace(s.to_string()))?;

        Ok(FootprintEntry::new(
            FootprintTable::from_name(table),
            FootprintKind::from_name(kind),
            chain,
            position,
        ))
    }
}
