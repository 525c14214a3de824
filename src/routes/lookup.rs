// Route queries built on the routing table listing

use std::net::{IpAddr, Ipv4Addr};

use super::{RouteRecord, list_routes};
use crate::command::CommandRunner;
use crate::interfaces::list_interfaces;
use crate::tool::NetContext;

/// First IPv4 route targeting a default synonym, in listing order
pub async fn ipv4_default_route<R: CommandRunner>(ctx: &NetContext<R>) -> Option<RouteRecord> {
    let route = list_routes(ctx, false)
        .await
        .into_iter()
        .find(RouteRecord::is_ipv4_default);

    match &route {
        Some(r) => tracing::info!(
            "Found default IPv4 route pointing to gateway {:?} on interface {:?}",
            r.gateway,
            r.device
        ),
        None => tracing::debug!("No default IPv4 route"),
    }
    route
}

/// The IPv4 address used for default routing, i.e. the one a 6to4 tunnel
/// would be derived from.
pub async fn outbound_ipv4_address<R: CommandRunner>(ctx: &NetContext<R>) -> Option<Ipv4Addr> {
    for route in list_routes(ctx, false).await {
        if !route.is_ipv4_default() {
            continue;
        }
        let Some(device) = route.device.as_deref().filter(|d| !d.is_empty()) else {
            tracing::warn!("Default IPv4 route with empty interface, can't determine outbound interface");
            continue;
        };

        let details = list_interfaces(ctx, Some(device)).await.unwrap_or_default();
        if details.len() != 1 {
            tracing::error!(
                "Interface {} is listed for IPv4 default route, but got {} interface entries instead of 1",
                device,
                details.len()
            );
            continue;
        }

        let outbound = details[0].addresses.iter().find_map(|a| match a.address {
            IpAddr::V4(v4) if !a.secondary => Some(v4),
            _ => None,
        });
        if let Some(address) = outbound {
            tracing::info!(
                "Found outbound IPv4 address {} on interface {}, assuming it is used for default routing",
                address,
                device
            );
            return Some(address);
        }
    }

    tracing::warn!("Unable to find IPv4 default route with outbound IP address");
    None
}

/// Devices of every IPv6 default-equivalent route, in listing order.
/// Duplicates are kept. Routes listed without a `dev` have no device to
/// report and are omitted (they still count for `exists_ipv6_default_route`).
pub async fn ifaces_with_ipv6_default_route<R: CommandRunner>(ctx: &NetContext<R>) -> Vec<String> {
    let ifaces: Vec<String> = list_routes(ctx, true)
        .await
        .into_iter()
        .filter(RouteRecord::is_ipv6_default)
        .filter_map(|route| {
            tracing::info!(
                "Found default IPv6 route {} pointing to gateway {:?} on interface {:?}",
                route.target,
                route.gateway,
                route.device
            );
            route.device
        })
        .collect();

    if ifaces.is_empty() {
        tracing::info!("Unable to find any IPv6 default route");
    }
    ifaces
}

pub async fn exists_ipv6_default_route<R: CommandRunner>(ctx: &NetContext<R>) -> bool {
    list_routes(ctx, true)
        .await
        .iter()
        .any(RouteRecord::is_ipv6_default)
}
