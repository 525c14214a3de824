// Forced address reload: setting an interface down and up again makes the
// kernel drop its addresses and generate new ones (with the current privacy
// setting).

use super::{CONF_INTERFACES_ALL, CONF_INTERFACES_DEFAULT, MutationReport, NetworkMutator, Step};
use crate::command::CommandRunner;
use crate::error::NetResult;
use crate::routes::ipv4_default_route;
use crate::tool::ROUTES_COMMAND;

impl<R: CommandRunner> NetworkMutator<'_, R> {
    /// Reset one interface: down, settle, up. No route handling.
    pub async fn force_reload_one(&self, iface: &str) -> NetResult<()> {
        if let Err(e) = self.link_set(iface, "down").await {
            tracing::warn!("Unable to set interface {} down: {}", iface, e);
            return Err(e);
        }
        tokio::time::sleep(self.ctx.settings().settle_delay).await;
        if let Err(e) = self.link_set(iface, "up").await {
            tracing::warn!("Set interface {} down but was unable to set it up again: {}", iface, e);
            return Err(e);
        }
        tracing::debug!("Reset interface {} to force address reload", iface);
        Ok(())
    }

    /// Reset several interfaces at once, keeping the IPv4 default route.
    ///
    /// Best-effort: a failing step is recorded and the remaining steps still
    /// run. Only interfaces that actually went down are brought up again.
    pub async fn force_reload(&self, ifaces: &[String]) -> MutationReport {
        let mut report = MutationReport::new();

        let mut targets: Vec<&str> = Vec::new();
        for iface in ifaces.iter().map(String::as_str) {
            if iface == CONF_INTERFACES_ALL || iface == CONF_INTERFACES_DEFAULT || targets.contains(&iface) {
                continue;
            }
            if !self.ctx.conf_dir(iface).is_dir() {
                report.skip(
                    Step::LinkDown {
                        iface: iface.to_string(),
                    },
                    "not an IPv6-capable interface of the running kernel",
                );
                continue;
            }
            targets.push(iface);
        }
        if targets.is_empty() {
            tracing::debug!("No interfaces to reload");
            return report;
        }

        // taking interfaces down drops the default route with them
        let saved_route = ipv4_default_route(self.ctx)
            .await
            .map(|r| r.full_line)
            .filter(|line| !line.trim().is_empty());

        let mut downed = Vec::new();
        for iface in targets {
            let result = self.link_set(iface, "down").await;
            if result.is_ok() {
                downed.push(iface);
            } else {
                tracing::warn!("Unable to set interface {} down, will not try to set it up again", iface);
            }
            report.record(
                Step::LinkDown {
                    iface: iface.to_string(),
                },
                &result,
            );
        }

        tokio::time::sleep(self.ctx.settings().settle_delay).await;

        for iface in downed {
            let result = self.link_set(iface, "up").await;
            if result.is_ok() {
                tracing::debug!("Reset interface {} to force address reload", iface);
            }
            report.record(
                Step::LinkUp {
                    iface: iface.to_string(),
                },
                &result,
            );
        }

        if let Some(route) = saved_route {
            let result = self.restore_route(&route).await;
            match &result {
                Ok(()) => tracing::info!("Reloaded default route '{}'", route),
                Err(_) => tracing::warn!(
                    "Unable to reload default route '{}', connectivity may be broken until next network interface change",
                    route
                ),
            }
            report.record(Step::RestoreDefaultRoute { route }, &result);
        }

        report
    }

    /// Replay a listed route line with `route add`
    async fn restore_route(&self, full_line: &str) -> NetResult<()> {
        let args = [ROUTES_COMMAND, "add"]
            .into_iter()
            .chain(full_line.split_whitespace());
        self.execute(self.ctx.ip().invocation(args)).await
    }
}
