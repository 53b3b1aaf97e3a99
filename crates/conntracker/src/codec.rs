//! Address codec: canonical comparable form of flow addresses
//!
//! IPv4 addresses order numerically. IPv6 addresses order by their canonical
//! text presentation compared byte by byte, so `2001:db8::10` sorts before
//! `2001:db8::9`. The textual order is consistent with equality but not with
//! numeric magnitude, and is kept as is.

use conntracker_types::AddressFamily;
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Per-family address handling used by the generic flow table
pub trait AddressCodec: Copy + Eq + fmt::Debug + fmt::Display {
    const FAMILY: AddressFamily;

    /// Total order over addresses of this family
    fn compare(&self, other: &Self) -> Ordering;

    /// Narrows an `IpAddr`, returning `None` when the family differs
    fn from_ip(addr: IpAddr) -> Option<Self>;
}

impl AddressCodec for Ipv4Addr {
    const FAMILY: AddressFamily = AddressFamily::Ipv4;

    fn compare(&self, other: &Self) -> Ordering {
        u32::from_be_bytes(self.octets()).cmp(&u32::from_be_bytes(other.octets()))
    }

    fn from_ip(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        }
    }
}

impl AddressCodec for Ipv6Addr {
    const FAMILY: AddressFamily = AddressFamily::Ipv6;

    fn compare(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }

    fn from_ip(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V6(v6) => Some(v6),
            IpAddr::V4(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v6(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_ipv4_numeric_order() {
        let a: Ipv4Addr = "10.0.0.2".parse().unwrap();
        let b: Ipv4Addr = "10.0.0.10".parse().unwrap();
        let c: Ipv4Addr = "9.255.255.255".parse().unwrap();
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(c.compare(&a), Ordering::Less);
        assert_eq!(a.compare(&a), Ordering::Equal);
    }

    #[test]
    fn test_ipv6_textual_order() {
        // numerically ::9 < ::10, textually "...10" < "...9"
        assert_eq!(v6("2001:db8::10").compare(&v6("2001:db8::9")), Ordering::Less);
        assert_eq!(v6("fe80::1").compare(&v6("2001:db8::1")), Ordering::Greater);
        assert_eq!(v6("::1").compare(&v6("::1")), Ordering::Equal);
    }

    #[test]
    fn test_ipv6_mapped_orders_by_text() {
        // "::ffff:10.0.0.9" > "::ffff:10.0.0.10" because '9' > '1'
        assert_eq!(
            v6("::ffff:10.0.0.9").compare(&v6("::ffff:10.0.0.10")),
            Ordering::Greater
        );
        assert_eq!(v6("::ffff:10.0.0.9").to_string(), "::ffff:10.0.0.9");
    }

    #[test]
    fn test_from_ip_rejects_other_family() {
        let v4: IpAddr = "10.0.0.1".parse().unwrap();
        let v6: IpAddr = "::1".parse().unwrap();
        assert!(Ipv4Addr::from_ip(v6).is_none());
        assert!(Ipv6Addr::from_ip(v4).is_none());
        assert_eq!(Ipv4Addr::from_ip(v4), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }
}
