// Link statistics from the link-diagnostics tool (`ethtool <iface>`)
//
// The tool's key set is open-ended, so results stay a string map. Keys
// commonly seen: "Speed", "Duplex", "Port", "Auto-negotiation",
// "Link detected", "Supported link modes", "Advertised link modes".

use std::collections::BTreeMap;

use crate::command::{CommandRunner, Invocation};
use crate::error::NetResult;
use crate::interfaces::list_interfaces;
use crate::tool::NetContext;

pub type LinkStats = BTreeMap<String, String>;

pub const KEY_SPEED: &str = "Speed";
pub const KEY_DUPLEX: &str = "Duplex";
pub const KEY_LINK_DETECTED: &str = "Link detected";
pub const KEY_SUPPORTED_LINK_MODES: &str = "Supported link modes";

/// Keys whose value wraps over several lines
const WRAPPED_KEYS: &[&str] = &[
    KEY_SUPPORTED_LINK_MODES,
    "Advertised link modes",
    "Link partner advertised link modes",
];

const BANNER: &str = "Settings for ";

/// Read link stats for `iface`. A link that is not up is not probed and
/// yields an empty map.
pub async fn read_link_stats<R: CommandRunner>(ctx: &NetContext<R>, iface: &str) -> NetResult<LinkStats> {
    let details = list_interfaces(ctx, Some(iface)).await?;
    if !details.first().is_some_and(|d| d.is_up) {
        tracing::debug!("Interface {} is not up, not probing link stats", iface);
        return Ok(LinkStats::new());
    }

    let invocation = Invocation::direct(ctx.settings().ethtool.to_string_lossy(), [iface]);
    let output = ctx.runner().run_checked(&invocation).await?;
    let stats = parse_ethtool(&output.stdout);
    if let Some(modes) = stats.get(KEY_SUPPORTED_LINK_MODES) {
        tracing::debug!("Possible link modes of {} are: {}", iface, modes);
    }
    Ok(stats)
}

/// Parse `ethtool` output into a key/value map
pub fn parse_ethtool(output: &str) -> LinkStats {
    let mut stats = LinkStats::new();
    // key and accumulated value of a wrapped section in progress
    let mut wrapped: Option<(&str, String)> = None;

    for line in output.lines() {
        if line.starts_with(BANNER) {
            continue;
        }
        let trimmed = line.trim();

        if let Some((key, value)) = wrapped.as_mut() {
            // continuation lines carry no key of their own
            if !trimmed.is_empty() && !trimmed.contains(':') {
                value.push(' ');
                value.push_str(trimmed);
                continue;
            }
            stats.insert(key.to_string(), value.trim().to_string());
            wrapped = None;
        }

        if let Some(key) = WRAPPED_KEYS.iter().find(|k| trimmed.starts_with(**k)) {
            let first = trimmed.split_once(':').map(|(_, v)| v.trim()).unwrap_or_default();
            wrapped = Some((*key, first.to_string()));
            continue;
        }

        // only plain "key: value" lines
        let parts: Vec<&str> = line.split(':').filter(|p| !p.is_empty()).collect();
        if parts.len() != 2 {
            continue;
        }
        stats.insert(parts[0].trim().to_string(), parts[1].trim().to_string());
    }

    if let Some((key, value)) = wrapped {
        stats.insert(key.to_string(), value.trim().to_string());
    }
    stats
}
