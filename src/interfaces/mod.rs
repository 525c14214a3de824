// Interfaces module - interface/address records and the `ip addr` reader

pub mod parser;

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub use parser::{list_interfaces, parse_ip_addr};

/// An address with its prefix length and the modifier keywords seen on its line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: IpAddr,
    pub prefix_len: u8,
    pub secondary: bool,
    pub temporary: bool,
    pub deprecated: bool,
}

impl AddressRecord {
    /// Parse `addr` or `addr/len`; the prefix defaults to the full address width.
    /// A prefix wider than the address family is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        let (address, prefix_len) = match value.split_once('/') {
            Some((addr, len)) => (addr.parse::<IpAddr>().ok()?, Some(len.parse::<u8>().ok()?)),
            None => (value.parse::<IpAddr>().ok()?, None),
        };
        let width = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = prefix_len.unwrap_or(width);
        if prefix_len > width {
            return None;
        }

        Some(AddressRecord {
            address,
            prefix_len,
            secondary: false,
            temporary: false,
            deprecated: false,
        })
    }

    /// True for a globally routable IPv6 address whose interface identifier
    /// was built from the MAC (modified EUI-64, `ff:fe` in the middle). These
    /// are the addresses privacy extensions exist to avoid.
    pub fn is_ipv6_global_mac_derived(&self) -> bool {
        match self.address {
            IpAddr::V6(v6) => is_global_unicast(&v6) && is_eui64_derived(&v6),
            IpAddr::V4(_) => false,
        }
    }
}

fn is_global_unicast(addr: &Ipv6Addr) -> bool {
    // 2000::/3
    (addr.segments()[0] & 0xe000) == 0x2000
}

fn is_eui64_derived(addr: &Ipv6Addr) -> bool {
    let octets = addr.octets();
    octets[11] == 0xff && octets[12] == 0xfe
}

/// One interface block of `ip addr` output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub name: String,
    pub mac: Option<String>,
    pub is_up: bool,
    pub is_ppp: bool,
    /// Tunnel-like link types (tun, adb) used for upstream connectivity
    pub is_other: bool,
    pub mtu: u32,
    pub addresses: Vec<AddressRecord>,
}

impl InterfaceRecord {
    /// Stand-in for an interface that could not be queried
    pub fn placeholder(name: &str) -> Self {
        InterfaceRecord {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Only ethernet-like (has a MAC), PPP and known tunnel-like links are kept.
    pub fn is_retained(&self) -> bool {
        self.mac.is_some() || self.is_ppp || self.is_other
    }

    pub fn ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        self.addresses
            .iter()
            .filter_map(|a| match a.address {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect()
    }

    pub fn ipv6_addresses(&self) -> Vec<Ipv6Addr> {
        self.addresses
            .iter()
            .filter_map(|a| match a.address {
                IpAddr::V6(v6) => Some(v6),
                IpAddr::V4(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_prefix_defaults() {
        let with_len = AddressRecord::parse("192.0.2.10/24").unwrap();
        assert_eq!(with_len.address, "192.0.2.10".parse::<IpAddr>().unwrap());
        assert_eq!(with_len.prefix_len, 24);

        assert_eq!(AddressRecord::parse("192.0.2.10").unwrap().prefix_len, 32);
        assert_eq!(AddressRecord::parse("2001:db8::1").unwrap().prefix_len, 128);
    }

    #[test]
    fn test_address_parse_rejects_garbage() {
        assert!(AddressRecord::parse("not-an-address").is_none());
        assert!(AddressRecord::parse("10.0.0.1/abc").is_none());
        assert!(AddressRecord::parse("10.0.0.1/33").is_none());
        assert!(AddressRecord::parse("10.0.0.1/200").is_none());
        assert!(AddressRecord::parse("::1/129").is_none());
        assert_eq!(AddressRecord::parse("2001:db8::1/128").unwrap().prefix_len, 128);
    }

    #[test]
    fn test_mac_derived_detection() {
        let eui64 = AddressRecord::parse("2001:db8::a8bb:ccff:fedd:eeff/64").unwrap();
        assert!(eui64.is_ipv6_global_mac_derived());

        let random = AddressRecord::parse("2001:db8::1c2d:3e4f:5a6b:7c8d/64").unwrap();
        assert!(!random.is_ipv6_global_mac_derived());

        let link_local = AddressRecord::parse("fe80::a8bb:ccff:fedd:eeff/64").unwrap();
        assert!(!link_local.is_ipv6_global_mac_derived());

        let v4 = AddressRecord::parse("10.0.0.1/8").unwrap();
        assert!(!v4.is_ipv6_global_mac_derived());
    }

    #[test]
    fn test_address_family_views() {
        let record = InterfaceRecord {
            name: "wlan0".to_string(),
            addresses: vec![
                AddressRecord::parse("10.0.0.5/24").unwrap(),
                AddressRecord::parse("2001:db8::5/64").unwrap(),
            ],
            ..Default::default()
        };
        assert_eq!(record.ipv4_addresses(), vec![Ipv4Addr::new(10, 0, 0, 5)]);
        assert_eq!(record.ipv6_addresses().len(), 1);
    }
}
