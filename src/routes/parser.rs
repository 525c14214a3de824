// Parser for `ip route` / `ip -6 route` output

use super::RouteRecord;
use crate::command::CommandRunner;
use crate::tool::{NetContext, OPTION_IPV6_ONLY, ROUTES_COMMAND};

const ROUTE_GATEWAY: &str = "via";
const ROUTE_DEVICE: &str = "dev";
const ROUTE_METRIC: &str = "metric";

/// List the main routing table. Routes are informational, so a failed query
/// is logged and yields an empty list.
pub async fn list_routes<R: CommandRunner>(ctx: &NetContext<R>, ipv6: bool) -> Vec<RouteRecord> {
    let mut args = Vec::new();
    if ipv6 {
        args.push(OPTION_IPV6_ONLY);
    }
    args.push(ROUTES_COMMAND);
    let invocation = ctx.ip().invocation(args);

    tracing::debug!("Acquiring route details with '{}'", invocation);
    match ctx.runner().run_checked(&invocation).await {
        Ok(output) => parse_ip_route(&output.stdout),
        Err(e) => {
            tracing::warn!("Tried to parse routes, but could not: {}", e);
            Vec::new()
        }
    }
}

/// Parse `ip route` output: `<target> [via <gw>] [dev <iface>] [other options...]`
pub fn parse_ip_route(output: &str) -> Vec<RouteRecord> {
    let mut routes = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let target = match parts.first() {
            Some(target) => target.to_string(),
            None => continue,
        };

        let mut gateway = None;
        let mut device = None;
        let mut metric = None;

        let mut i = 1;
        while i < parts.len() {
            match (parts[i], parts.get(i + 1)) {
                (ROUTE_GATEWAY, Some(gw)) => {
                    gateway = gw.parse().ok();
                    if gateway.is_none() {
                        tracing::debug!("Ignoring unparseable gateway '{}' for {}", gw, target);
                    }
                    i += 2;
                }
                (ROUTE_DEVICE, Some(iface)) => {
                    device = Some(iface.to_string());
                    i += 2;
                }
                (ROUTE_METRIC, Some(m)) => {
                    metric = m.parse().ok();
                    i += 2;
                }
                (opt, _) => {
                    tracing::trace!("ignoring option '{}' for target {}", opt, target);
                    i += 1;
                }
            }
        }

        routes.push(RouteRecord {
            target,
            gateway,
            device,
            metric,
            full_line: line.to_string(),
        });
    }

    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::FakeRunner;
    use crate::tool::testing::{IP, context};
    use std::net::IpAddr;

    #[test]
    fn test_parse_default_route() {
        let routes = parse_ip_route("default via 192.0.2.1 dev eth0");
        assert_eq!(routes.len(), 1);

        let route = &routes[0];
        assert_eq!(route.target, "default");
        assert_eq!(route.gateway, Some("192.0.2.1".parse::<IpAddr>().unwrap()));
        assert_eq!(route.device.as_deref(), Some("eth0"));
        assert_eq!(route.full_line, "default via 192.0.2.1 dev eth0");
    }

    #[test]
    fn test_parse_ip_route() {
        let output = "\
default via 192.168.1.1 dev wlan0  metric 303
192.168.1.0/24 dev wlan0  proto kernel  scope link  src 192.168.1.23
10.0.0.0/8 via 192.168.1.254
";
        let routes = parse_ip_route(output);
        assert_eq!(routes.len(), 3);

        assert_eq!(routes[0].metric, Some(303));
        assert_eq!(routes[1].target, "192.168.1.0/24");
        assert_eq!(routes[1].gateway, None);
        assert_eq!(routes[1].device.as_deref(), Some("wlan0"));
        // gateway without device
        assert_eq!(routes[2].device, None);
        assert_eq!(routes[2].gateway, Some("192.168.1.254".parse::<IpAddr>().unwrap()));
        // spacing is kept as listed for replay
        assert_eq!(routes[1].full_line, "192.168.1.0/24 dev wlan0  proto kernel  scope link  src 192.168.1.23");
    }

    #[test]
    fn test_parse_ipv6_routes() {
        let output = "\
2001:db8::/64 dev wlan0  proto kernel  metric 256  expires 2591985sec
fe80::/64 dev wlan0  proto kernel  metric 256
default via fe80::1 dev wlan0  proto ra  metric 1024  expires 1785sec hoplimit 64
";
        let routes = parse_ip_route(output);
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[2].gateway, Some("fe80::1".parse::<IpAddr>().unwrap()));
        assert_eq!(routes[2].metric, Some(1024));
    }

    #[test]
    fn test_trailing_keyword_without_value() {
        let routes = parse_ip_route("10.0.0.0/8 dev");
        assert_eq!(routes[0].device, None);
    }

    #[tokio::test]
    async fn test_list_routes_failure_is_empty() {
        let runner = FakeRunner::new().fail(&format!("{} -6 route", IP), 2);
        let ctx = context(runner);
        assert!(list_routes(&ctx, true).await.is_empty());
        assert_eq!(ctx.runner().calls(), vec![format!("{} -6 route", IP)]);
    }
}
