//! Footprint trace: ordered firewall rule matches of one flow

use conntracker_types::FootprintEntry;

/// Append-only sequence of footprints, kept in the order they were matched.
///
/// Owned by exactly one flow record and dropped with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FootprintTrace {
    entries: Vec<FootprintEntry>,
}

impl FootprintTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a footprint at the end. No deduplication.
    pub fn append(&mut self, entry: FootprintEntry) {
        self.entries.push(entry);
    }

    pub fn for_each_ordered<F>(&self, visitor: F)
    where
        F: FnMut(&FootprintEntry),
    {
        self.entries.iter().for_each(visitor);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FootprintEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a FootprintTrace {
    type Item = &'a FootprintEntry;
    type IntoIter = std::slice::Iter<'a, FootprintEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conntracker_types::{FootprintKind, FootprintTable};
    use pretty_assertions::assert_eq;

    fn fp(chain: &str, position: u32) -> FootprintEntry {
        FootprintEntry::new(FootprintTable::Filter, FootprintKind::Rule, chain, position)
    }

    #[test]
    fn test_append_keeps_insertion_order() {
        let mut trace = FootprintTrace::new();
        trace.append(fp("OUTPUT", 9));
        trace.append(fp("INPUT", 1));
        trace.append(fp("FORWARD", 4));

        let mut seen = Vec::new();
        trace.for_each_ordered(|e| seen.push(e.position()));
        assert_eq!(seen, vec![9, 1, 4]);
    }

    #[test]
    fn test_no_deduplication() {
        let mut trace = FootprintTrace::new();
        trace.append(fp("INPUT", 1));
        trace.append(fp("INPUT", 1));
        assert_eq!(trace.len(), 2);
        assert!(!trace.is_empty());
    }
}
