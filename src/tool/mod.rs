// Tool resolution - finds a working `ip` binary and carries it, together with
// the runner and host paths, through every state query and mutation

pub mod locator;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::command::{CommandRunner, Invocation};

pub use locator::{ToolLocator, ToolSearch};

/// Subcommand used for listing (and smoke testing) addresses.
pub const ADDRESSES_COMMAND: &str = "addr";
/// Subcommand used for listing and changing routes.
pub const ROUTES_COMMAND: &str = "route";
/// Restricts `ip` to the IPv6 family.
pub const OPTION_IPV6_ONLY: &str = "-6";

/// A resolved, working `ip` implementation: either the binary itself or a
/// multi-call binary followed by its applet name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpTool {
    program: PathBuf,
    prefix_args: Vec<String>,
}

impl IpTool {
    pub fn new(program: impl Into<PathBuf>, prefix_args: Vec<String>) -> Self {
        IpTool {
            program: program.into(),
            prefix_args,
        }
    }

    pub fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let all_args = self
            .prefix_args
            .iter()
            .cloned()
            .chain(args.into_iter().map(Into::into));
        Invocation::direct(self.program.to_string_lossy(), all_args)
    }
}

impl fmt::Display for IpTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.prefix_args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Host-specific locations and timings
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// Root of the per-interface IPv6 kernel configuration tree
    pub conf_root: PathBuf,
    /// Link diagnostics binary
    pub ethtool: PathBuf,
    /// Pause between setting interfaces down and up again
    pub settle_delay: Duration,
}

impl Default for HostSettings {
    fn default() -> Self {
        HostSettings {
            conf_root: PathBuf::from("/proc/sys/net/ipv6/conf"),
            ethtool: PathBuf::from("/usr/sbin/ethtool"),
            settle_delay: Duration::from_millis(100),
        }
    }
}

/// Everything a state query or mutation needs: how to run commands, which
/// `ip` to run, and where the host keeps its kernel knobs.
pub struct NetContext<R> {
    runner: R,
    ip: IpTool,
    settings: HostSettings,
}

impl<R: CommandRunner> NetContext<R> {
    pub fn new(runner: R, ip: IpTool, settings: HostSettings) -> Self {
        NetContext {
            runner,
            ip,
            settings,
        }
    }

    /// Resolve the tool through `locator` (cached after the first success)
    /// and build a context around it.
    pub async fn resolve(
        runner: R,
        locator: &ToolLocator,
        settings: HostSettings,
    ) -> crate::error::NetResult<Self> {
        let ip = locator.resolve(&runner).await?;
        Ok(NetContext::new(runner, ip, settings))
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn ip(&self) -> &IpTool {
        &self.ip
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// `<conf_root>/<iface>`
    pub fn conf_dir(&self, iface: &str) -> PathBuf {
        self.settings.conf_root.join(iface)
    }
}
