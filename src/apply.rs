// Applies stored preferences in one go: at boot (only when autostart is set)
// or on demand. Kernel state set here persists until the next reboot.

use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;

use crate::command::CommandRunner;
use crate::interfaces::list_interfaces;
use crate::mutate::{
    InterfaceSelection, MutationReport, NetworkMutator, PrivacyOutcome, SixToFourTunnel,
    is_privacy_supported_in_kernel,
};
use crate::routes::outbound_ipv4_address;
use crate::tool::NetContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Boot,
    OnDemand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub autostart: bool,
    pub enable_privacy: bool,
    pub create_tunnel: bool,
    pub interfaces: InterfaceSelection,
    pub tunnel_name: String,
    pub tunnel_mtu: i32,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            autostart: false,
            enable_privacy: false,
            create_tunnel: false,
            interfaces: InterfaceSelection::default(),
            tunnel_name: "tun6to4".to_string(),
            tunnel_mtu: 0,
        }
    }
}

/// Global address still derived from a hardware address, on an interface
/// without any temporary address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposedAddress {
    pub iface: String,
    pub address: Ipv6Addr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub applied: bool,
    pub privacy: Option<PrivacyOutcome>,
    pub exposed_addresses: Vec<ExposedAddress>,
    pub tunnel: Option<MutationReport>,
    pub notes: Vec<String>,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.privacy.as_ref().is_none_or(PrivacyOutcome::is_success)
            && self.tunnel.as_ref().is_none_or(MutationReport::is_success)
    }

    fn note(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.notes.push(message);
    }
}

/// Apply privacy (and optionally a 6to4 tunnel) according to `prefs`.
///
/// Interfaces are only reloaded when privacy gets enabled; disabling leaves
/// current addresses in place.
pub async fn apply_preferences<R: CommandRunner>(
    ctx: &NetContext<R>,
    prefs: &Preferences,
    trigger: Trigger,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    tracing::info!(
        "Applying preferences ({:?}): autostart={}, enable_privacy={}, create_tunnel={}",
        trigger,
        prefs.autostart,
        prefs.enable_privacy,
        prefs.create_tunnel
    );

    if trigger == Trigger::Boot && !prefs.autostart {
        tracing::debug!("Autostart disabled, leaving kernel settings untouched");
        return outcome;
    }
    outcome.applied = true;

    let mutator = NetworkMutator::new(ctx);
    if is_privacy_supported_in_kernel(&ctx.settings().conf_root) {
        let privacy = mutator
            .apply_privacy_all(prefs.enable_privacy, prefs.enable_privacy, &prefs.interfaces)
            .await;
        outcome.privacy = Some(privacy);

        if prefs.enable_privacy {
            outcome.exposed_addresses = exposed_addresses(ctx).await;
            for exposed in &outcome.exposed_addresses {
                tracing::warn!(
                    "Interface {} still only uses MAC-derived address {}",
                    exposed.iface,
                    exposed.address
                );
            }
        }
    } else {
        outcome.note(format!(
            "Kernel does not support IPv6 address privacy (no use_tempaddr below {})",
            ctx.settings().conf_root.display()
        ));
    }

    if prefs.create_tunnel {
        match outbound_ipv4_address(ctx).await {
            Some(local) => {
                let tunnel = SixToFourTunnel::for_endpoint(&prefs.tunnel_name, local, prefs.tunnel_mtu);
                match mutator.create_6to4_tunnel(&tunnel).await {
                    Ok(report) => outcome.tunnel = Some(report),
                    Err(e) => outcome.note(format!("Unable to create 6to4 tunnel: {}", e)),
                }
            }
            None => outcome.note("No outbound IPv4 address, not creating 6to4 tunnel".to_string()),
        }
    }

    outcome
}

async fn exposed_addresses<R: CommandRunner>(ctx: &NetContext<R>) -> Vec<ExposedAddress> {
    let interfaces = list_interfaces(ctx, None).await.unwrap_or_default();
    let mut exposed = Vec::new();
    for iface in interfaces {
        if iface.addresses.iter().any(|a| a.temporary) {
            continue;
        }
        exposed.extend(
            iface
                .addresses
                .iter()
                .filter(|a| a.is_ipv6_global_mac_derived())
                .filter_map(|a| match a.address {
                    std::net::IpAddr::V6(address) => Some(ExposedAddress {
                        iface: iface.name.clone(),
                        address,
                    }),
                    std::net::IpAddr::V4(_) => None,
                }),
        );
    }
    exposed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::FakeRunner;
    use crate::tool::testing::{IP, conf_tree, context, context_with_root};

    const RMNET_ADDR: &str = "\
4: rmnet0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP qlen 1000
    link/ether 02:50:f3:00:00:01 brd ff:ff:ff:ff:ff:ff
    inet 198.51.100.7/24 brd 198.51.100.255 scope global rmnet0
    inet6 2001:db8::250:f3ff:fe00:1/64 scope global dynamic
";

    fn prefs() -> Preferences {
        Preferences {
            autostart: false,
            enable_privacy: true,
            create_tunnel: true,
            interfaces: InterfaceSelection::Listed(vec![]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_boot_without_autostart_does_nothing() {
        let ctx = context(FakeRunner::new());
        let outcome = apply_preferences(&ctx, &prefs(), Trigger::Boot).await;
        assert!(!outcome.applied);
        assert!(ctx.runner().calls().is_empty());
    }

    #[tokio::test]
    async fn test_on_demand_applies_privacy_and_tunnel() {
        let root = conf_tree(&["all", "default"]);
        let runner = FakeRunner::new()
            .respond(&format!("{} route", IP), "default via 198.51.100.1 dev rmnet0\n")
            .respond(&format!("{} addr", IP), RMNET_ADDR)
            .respond(&format!("{} addr show dev rmnet0", IP), RMNET_ADDR);
        let ctx = context_with_root(runner, root.clone());

        let outcome = apply_preferences(&ctx, &prefs(), Trigger::OnDemand).await;
        assert!(outcome.applied);
        assert!(outcome.is_success());
        assert_eq!(outcome.privacy.as_ref().map(|p| p.writes.steps.len()), Some(2));
        assert_eq!(
            outcome.exposed_addresses,
            vec![ExposedAddress {
                iface: "rmnet0".to_string(),
                address: "2001:db8::250:f3ff:fe00:1".parse().unwrap(),
            }]
        );
        assert_eq!(outcome.tunnel.as_ref().map(|t| t.steps.len()), Some(5));
        assert!(
            ctx.runner()
                .calls()
                .contains(&format!("{} -6 addr add 2002:c633:6407::/16 dev tun6to4", IP))
        );
    }

    #[tokio::test]
    async fn test_missing_kernel_support_and_outbound_address_are_noted() {
        let ctx = context(FakeRunner::new());
        let mut prefs = prefs();
        prefs.autostart = true;

        let outcome = apply_preferences(&ctx, &prefs, Trigger::Boot).await;
        assert!(outcome.applied);
        assert!(outcome.privacy.is_none());
        assert!(outcome.tunnel.is_none());
        assert_eq!(outcome.notes.len(), 2);
        assert_eq!(ctx.runner().calls(), vec![format!("{} route", IP)]);
    }
}
