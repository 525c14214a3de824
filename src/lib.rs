// ipv6config - read and change the IPv6 network state of a Linux host by
// driving `ip` (or `busybox ip`) and `ethtool`

pub mod apply;
pub mod command;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod mutate;
pub mod routes;
pub mod stats;
pub mod tool;

pub use error::{NetError, NetResult};
