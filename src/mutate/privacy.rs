// IPv6 address privacy (temporary addresses) via the `use_tempaddr` kernel knob

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    CONF_INTERFACES_ALL, CONF_INTERFACES_DEFAULT, MutationReport, NetworkMutator, Step,
    validate_iface_name,
};
use crate::command::{CommandRunner, Invocation};
use crate::error::NetResult;
use crate::routes::ifaces_with_ipv6_default_route;

const ADDRESS_PRIVACY_PARAM: &str = "use_tempaddr";
/// Prefer temporary addresses for outgoing connections
const PRIVACY_ENABLED: u8 = 2;
const PRIVACY_DISABLED: u8 = 0;

/// Which interfaces besides `all` and `default` get the privacy setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceSelection {
    /// Exactly these names
    Listed(Vec<String>),
    /// Every entry of the kernel config tree
    Discover,
}

impl Default for InterfaceSelection {
    fn default() -> Self {
        InterfaceSelection::Listed(default_privacy_interfaces())
    }
}

/// WLAN, cellular and tunnel names seen on common handsets
pub fn default_privacy_interfaces() -> Vec<String> {
    ["eth0", "rmnet0", "rmnet1", "rmnet2", "ip6tnl0", "tiwlan0"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivacyOutcome {
    /// One step per kernel parameter write (or skip)
    pub writes: MutationReport,
    /// Reload of the modified interfaces carrying an IPv6 default route
    pub reload: Option<MutationReport>,
}

impl PrivacyOutcome {
    /// Every attempted write succeeded
    pub fn is_success(&self) -> bool {
        self.writes.is_success()
    }
}

/// Both universal entries expose a readable privacy parameter
pub fn is_privacy_supported_in_kernel(conf_root: &Path) -> bool {
    [CONF_INTERFACES_ALL, CONF_INTERFACES_DEFAULT].iter().all(|entry| {
        let param = conf_root.join(entry).join(ADDRESS_PRIVACY_PARAM);
        std::fs::File::open(param).is_ok()
    })
}

/// Interface entries of the kernel config tree, without `all` and `default`
pub fn discover_conf_interfaces(conf_root: &Path) -> NetResult<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(conf_root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name != CONF_INTERFACES_ALL && name != CONF_INTERFACES_DEFAULT)
        .collect();
    names.sort();
    Ok(names)
}

impl<R: CommandRunner> NetworkMutator<'_, R> {
    /// Write the privacy parameter of one interface (2 enables, 0 disables).
    pub async fn set_privacy(&self, iface: &str, enable: bool) -> NetResult<()> {
        validate_iface_name(iface)?;
        let value = if enable { PRIVACY_ENABLED } else { PRIVACY_DISABLED };
        let param = self.ctx.conf_dir(iface).join(ADDRESS_PRIVACY_PARAM);
        let line = format!("echo {} > {}", value, param.display());

        self.execute(Invocation::shell(line)).await?;
        tracing::debug!(
            "{} address privacy on interface {}",
            if enable { "Enabled" } else { "Disabled" },
            iface
        );
        Ok(())
    }

    /// Set privacy on `all`, `default` and the selected interfaces. Entries
    /// without a kernel config directory are skipped. With `force_reload`,
    /// only modified interfaces that carry an IPv6 default route are reset,
    /// so interfaces not using IPv6 are left alone.
    pub async fn apply_privacy_all(
        &self,
        enable: bool,
        force_reload: bool,
        selection: &InterfaceSelection,
    ) -> PrivacyOutcome {
        tracing::info!(
            "{} IPv6 address privacy{}",
            if enable { "Enabling" } else { "Disabling" },
            if force_reload { " and forcing reload of interfaces" } else { "" }
        );

        let mut entries = vec![CONF_INTERFACES_ALL.to_string(), CONF_INTERFACES_DEFAULT.to_string()];
        let selected = match selection {
            InterfaceSelection::Listed(names) => names.clone(),
            InterfaceSelection::Discover => {
                discover_conf_interfaces(&self.ctx.settings().conf_root).unwrap_or_else(|e| {
                    tracing::warn!("Unable to list kernel config tree: {}", e);
                    Vec::new()
                })
            }
        };
        for name in selected {
            if !entries.contains(&name) {
                entries.push(name);
            }
        }

        // only interfaces used for outgoing IPv6 traffic need a reload
        let ipv6_routed = ifaces_with_ipv6_default_route(self.ctx).await;

        let mut writes = MutationReport::new();
        let mut to_reload = Vec::new();
        for iface in entries {
            let step = Step::SetPrivacy {
                iface: iface.clone(),
                enable,
            };
            if !self.ctx.conf_dir(&iface).is_dir() {
                writes.skip(step, "not an IPv6-capable interface of the running kernel");
                continue;
            }

            let result = self.set_privacy(&iface, enable).await;
            if result.is_ok() && ipv6_routed.contains(&iface) {
                to_reload.push(iface);
            }
            writes.record(step, &result);
        }

        let reload = if force_reload {
            Some(self.force_reload(&to_reload).await)
        } else {
            None
        };

        PrivacyOutcome { writes, reload }
    }
}
