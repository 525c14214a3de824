// Routes module - route records, default-route detection and route queries

pub mod lookup;
pub mod parser;

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub use lookup::{
    exists_ipv6_default_route, ifaces_with_ipv6_default_route, ipv4_default_route,
    outbound_ipv4_address,
};
pub use parser::{list_routes, parse_ip_route};

const DEFAULT_TARGET: &str = "default";
const IPV4_ALL_ZERO: &str = "0.0.0.0/0";
const IPV6_ALL_ZERO: &str = "::/0";
/// Global unicast aggregate, as good as a default route for IPv6 today
pub const IPV6_GLOBAL_AGGREGATE: &str = "2000::/3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    /// CIDR notation or "default"
    pub target: String,
    pub gateway: Option<IpAddr>,
    pub device: Option<String>,
    pub metric: Option<u32>,
    /// The line exactly as listed, replayed with `route add` to restore it
    pub full_line: String,
}

impl RouteRecord {
    pub fn is_ipv4_default(&self) -> bool {
        self.target.eq_ignore_ascii_case(DEFAULT_TARGET) || self.target == IPV4_ALL_ZERO
    }

    pub fn is_ipv6_default(&self) -> bool {
        self.target.eq_ignore_ascii_case(DEFAULT_TARGET)
            || self.target == IPV6_ALL_ZERO
            || self.target == IPV6_GLOBAL_AGGREGATE
    }
}
