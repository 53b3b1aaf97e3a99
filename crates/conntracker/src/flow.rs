//! Flow identities and records
//!
//! One generic [`FlowRecord`] covers the six tracked variants, instantiated
//! per (address, key) type by the tables in [`crate::table`].

use crate::codec::AddressCodec;
use crate::compare::KeyCodec;
use crate::footprint::FootprintTrace;

/// Source and destination of a flow, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressPair<A> {
    pub src: A,
    pub dst: A,
}

/// Address pair plus protocol key. Excludes the confirmation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowIdentity<A, K> {
    pub addrs: AddressPair<A>,
    pub key: K,
}

impl<A: AddressCodec, K: KeyCodec> FlowIdentity<A, K> {
    pub fn new(src: A, dst: A, key: K) -> Self {
        FlowIdentity {
            addrs: AddressPair { src, dst },
            key,
        }
    }
}

/// A tracked flow: identity, confirmation state and footprint trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord<A, K> {
    identity: FlowIdentity<A, K>,
    confirmed: bool,
    trace: FootprintTrace,
}

impl<A: AddressCodec, K: KeyCodec> FlowRecord<A, K> {
    pub(crate) fn new(identity: FlowIdentity<A, K>, confirmed: bool) -> Self {
        FlowRecord {
            identity,
            confirmed,
            trace: FootprintTrace::new(),
        }
    }

    pub fn identity(&self) -> &FlowIdentity<A, K> {
        &self.identity
    }

    pub fn src(&self) -> A {
        self.identity.addrs.src
    }

    pub fn dst(&self) -> A {
        self.identity.addrs.dst
    }

    pub fn key(&self) -> &K {
        &self.identity.key
    }

    /// True once a reply has been observed
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn trace(&self) -> &FootprintTrace {
        &self.trace
    }

    pub(crate) fn trace_mut(&mut self) -> &mut FootprintTrace {
        &mut self.trace
    }

    /// Marks the flow confirmed. The flag never goes back to false.
    pub(crate) fn confirm(&mut self) {
        self.confirmed = true;
    }
}
