// 6to4 (protocol 41, "sit") tunnel interfaces

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::{MutationReport, NetworkMutator, Step, validate_iface_name};
use crate::command::{CommandRunner, Invocation};
use crate::error::{NetError, NetResult};
use crate::tool::{ADDRESSES_COMMAND, OPTION_IPV6_ONLY, ROUTES_COMMAND};

pub const DEFAULT_TUNNEL_MTU: u32 = 1430;
const TUNNEL_TTL: &str = "255";
const TUNNEL_ROUTE_METRIC: &str = "1";
/// IPv4-mapped addresses are reached directly through the tunnel
const IPV4_MAPPED_RANGE: &str = "::ffff:0:0/96";
const GLOBAL_UNICAST_RANGE: &str = "2000::/3";
/// Well-known 6to4 relay anycast address (192.88.99.1)
const SIXTOFOUR_RELAY: &str = "::192.88.99.1";

/// 6to4 prefix for an IPv4 address: 2002:AABB:CCDD for AA.BB.CC.DD
pub fn sixtofour_prefix(ipv4: Ipv4Addr) -> String {
    let [a, b, c, d] = ipv4.octets();
    format!("2002:{:02x}{:02x}:{:02x}{:02x}", a, b, c, d)
}

/// Parameters for a new 6to4 tunnel. The endpoint and prefix are usually
/// derived from the current default route and may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SixToFourTunnel {
    pub name: String,
    pub local_endpoint: Option<Ipv4Addr>,
    pub prefix: Option<String>,
    /// Non-positive values select DEFAULT_TUNNEL_MTU
    pub mtu: i32,
}

impl SixToFourTunnel {
    /// Tunnel for `local_endpoint` with its derived 6to4 prefix
    pub fn for_endpoint(name: &str, local_endpoint: Ipv4Addr, mtu: i32) -> Self {
        SixToFourTunnel {
            name: name.to_string(),
            local_endpoint: Some(local_endpoint),
            prefix: Some(sixtofour_prefix(local_endpoint)),
            mtu,
        }
    }

    fn effective_mtu(&self) -> u32 {
        u32::try_from(self.mtu)
            .ok()
            .filter(|mtu| *mtu > 0)
            .unwrap_or(DEFAULT_TUNNEL_MTU)
    }
}

impl<R: CommandRunner> NetworkMutator<'_, R> {
    /// Create and configure a 6to4 tunnel interface.
    ///
    /// Missing parameters fail before any command is issued. The five
    /// commands run strictly in order; the first failure stops the sequence
    /// and earlier steps are left in place.
    pub async fn create_6to4_tunnel(&self, tunnel: &SixToFourTunnel) -> NetResult<MutationReport> {
        let (Some(local), Some(prefix)) = (tunnel.local_endpoint, tunnel.prefix.as_deref()) else {
            tracing::error!("Unable to create 6to4 tunnel, missing parameters: {:?}", tunnel);
            return Err(NetError::Precondition(
                "6to4 tunnel needs a local IPv4 endpoint and a prefix".to_string(),
            ));
        };
        if prefix.trim().is_empty() {
            return Err(NetError::Precondition("6to4 prefix is empty".to_string()));
        }
        validate_iface_name(&tunnel.name)?;

        let iface = tunnel.name.as_str();
        let mtu = tunnel.effective_mtu();
        let local = local.to_string();
        let mtu_arg = mtu.to_string();
        // /16, not /64: other 6to4 hosts are then reached directly through
        // their IPv4 address instead of via the nearest relay
        let address = format!("{}::/16", prefix);
        let ip = self.ctx.ip();

        let plan: Vec<(Step, Invocation)> = vec![
            (
                Step::CreateTunnel { iface: iface.to_string() },
                ip.invocation([
                    "tunnel", "add", iface, "mode", "sit", "remote", "any", "local", &local, "ttl", TUNNEL_TTL,
                ]),
            ),
            (
                Step::TunnelUp { iface: iface.to_string(), mtu },
                ip.invocation(["link", "set", iface, "up", "mtu", &mtu_arg]),
            ),
            (
                Step::AddTunnelAddress { address: address.clone() },
                ip.invocation([OPTION_IPV6_ONLY, ADDRESSES_COMMAND, "add", &address, "dev", iface]),
            ),
            (
                Step::AddMappedRoute { iface: iface.to_string() },
                ip.invocation([
                    OPTION_IPV6_ONLY, ROUTES_COMMAND, "add", IPV4_MAPPED_RANGE, "dev", iface, "metric",
                    TUNNEL_ROUTE_METRIC,
                ]),
            ),
            (
                Step::AddRelayRoute { iface: iface.to_string() },
                ip.invocation([
                    OPTION_IPV6_ONLY, ROUTES_COMMAND, "add", GLOBAL_UNICAST_RANGE, "via", SIXTOFOUR_RELAY, "dev",
                    iface, "metric", TUNNEL_ROUTE_METRIC,
                ]),
            ),
        ];

        tracing::debug!(
            "Trying to create 6to4 tunnel interface {} with local endpoint {} for prefix {} with MTU {}",
            iface,
            local,
            prefix,
            mtu
        );

        let mut report = MutationReport::new();
        for (step, invocation) in plan {
            let result = self.execute(invocation).await;
            let failed = result.is_err();
            report.record(step, &result);
            if failed {
                tracing::error!("Aborting creation of tunnel interface {}", iface);
                return Ok(report);
            }
        }

        tracing::info!(
            "Successfully created 6to4 tunnel interface {} with local endpoint {} for prefix {} with MTU {}",
            iface,
            local,
            prefix,
            mtu
        );
        Ok(report)
    }

    /// Delete a previously created tunnel interface
    pub async fn delete_tunnel(&self, iface: &str) -> NetResult<()> {
        validate_iface_name(iface)?;
        match self.execute(self.ctx.ip().invocation(["tunnel", "del", iface])).await {
            Ok(()) => {
                tracing::debug!("Deleted tunnel interface {}", iface);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Unable to delete tunnel interface {}, it probably has not been created beforehand: {}",
                    iface,
                    e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::FakeRunner;
    use crate::tool::testing::{IP, context};

    fn expected_commands() -> Vec<String> {
        vec![
            format!("{} tunnel add tun6to4 mode sit remote any local 198.51.100.7 ttl 255", IP),
            format!("{} link set tun6to4 up mtu 1430", IP),
            format!("{} -6 addr add 2002:c633:6407::/16 dev tun6to4", IP),
            format!("{} -6 route add ::ffff:0:0/96 dev tun6to4 metric 1", IP),
            format!("{} -6 route add 2000::/3 via ::192.88.99.1 dev tun6to4 metric 1", IP),
        ]
    }

    #[test]
    fn test_sixtofour_prefix() {
        assert_eq!(sixtofour_prefix(Ipv4Addr::new(198, 51, 100, 7)), "2002:c633:6407");
        assert_eq!(sixtofour_prefix(Ipv4Addr::new(10, 0, 0, 1)), "2002:0a00:0001");
    }

    #[test]
    fn test_mtu_defaults_when_not_positive() {
        let mut tunnel = SixToFourTunnel::for_endpoint("tun6to4", Ipv4Addr::new(198, 51, 100, 7), 0);
        assert_eq!(tunnel.effective_mtu(), 1430);
        tunnel.mtu = -5;
        assert_eq!(tunnel.effective_mtu(), 1430);
        tunnel.mtu = 1280;
        assert_eq!(tunnel.effective_mtu(), 1280);
    }

    #[tokio::test]
    async fn test_create_tunnel_issues_five_ordered_commands() {
        let ctx = context(FakeRunner::new());
        let tunnel = SixToFourTunnel::for_endpoint("tun6to4", Ipv4Addr::new(198, 51, 100, 7), -1);

        let report = NetworkMutator::new(&ctx).create_6to4_tunnel(&tunnel).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.steps.len(), 5);
        assert_eq!(ctx.runner().calls(), expected_commands());
    }

    #[tokio::test]
    async fn test_create_tunnel_stops_at_first_failure() {
        let commands = expected_commands();
        let ctx = context(FakeRunner::new().fail(&commands[2], 2));
        let tunnel = SixToFourTunnel::for_endpoint("tun6to4", Ipv4Addr::new(198, 51, 100, 7), 1430);

        let report = NetworkMutator::new(&ctx).create_6to4_tunnel(&tunnel).await.unwrap();
        assert!(!report.is_success());
        assert_eq!(report.steps.len(), 3);
        assert_eq!(
            report.failures().next().map(|s| &s.step),
            Some(&Step::AddTunnelAddress {
                address: "2002:c633:6407::/16".to_string()
            })
        );
        assert_eq!(ctx.runner().calls(), commands[..3].to_vec());
    }

    #[tokio::test]
    async fn test_create_tunnel_missing_parameters() {
        let ctx = context(FakeRunner::new());
        let tunnel = SixToFourTunnel {
            name: "tun6to4".to_string(),
            local_endpoint: None,
            prefix: Some("2002:c633:6407".to_string()),
            mtu: 0,
        };

        let result = NetworkMutator::new(&ctx).create_6to4_tunnel(&tunnel).await;
        assert!(matches!(result, Err(NetError::Precondition(_))));
        assert!(ctx.runner().calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_tunnel() {
        let ctx = context(FakeRunner::new().fail(&format!("{} tunnel del tun6to4", IP), 1));
        assert!(NetworkMutator::new(&ctx).delete_tunnel("tun6to4").await.is_err());
        assert_eq!(ctx.runner().calls(), vec![format!("{} tunnel del tun6to4", IP)]);
    }
}
