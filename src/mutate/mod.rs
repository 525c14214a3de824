// Privileged state changes: privacy kernel parameter, forced address reload,
// 6to4 tunnels. All of these need root.
//
// Multi-step operations are not transactional. They return a MutationReport
// with one outcome per step instead of a single flag.

pub mod privacy;
pub mod reload;
pub mod tunnel;

use serde::Serialize;
use std::fmt;

use crate::command::{CommandRunner, Invocation};
use crate::error::{NetError, NetResult};
use crate::tool::NetContext;

pub use privacy::{InterfaceSelection, PrivacyOutcome, is_privacy_supported_in_kernel};
pub use tunnel::{DEFAULT_TUNNEL_MTU, SixToFourTunnel, sixtofour_prefix};

/// Kernel config pseudo-interface covering all interfaces
pub const CONF_INTERFACES_ALL: &str = "all";
/// Kernel config pseudo-interface used as template for new interfaces
pub const CONF_INTERFACES_DEFAULT: &str = "default";

/// Longest name the kernel accepts (IFNAMSIZ - 1)
const MAX_IFACE_NAME_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    SetPrivacy { iface: String, enable: bool },
    LinkDown { iface: String },
    LinkUp { iface: String },
    RestoreDefaultRoute { route: String },
    CreateTunnel { iface: String },
    TunnelUp { iface: String, mtu: u32 },
    AddTunnelAddress { address: String },
    AddMappedRoute { iface: String },
    AddRelayRoute { iface: String },
    DeleteTunnel { iface: String },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::SetPrivacy { iface, enable } => {
                write!(f, "{} address privacy on {}", if *enable { "enable" } else { "disable" }, iface)
            }
            Step::LinkDown { iface } => write!(f, "set {} down", iface),
            Step::LinkUp { iface } => write!(f, "set {} up", iface),
            Step::RestoreDefaultRoute { route } => write!(f, "restore default route '{}'", route),
            Step::CreateTunnel { iface } => write!(f, "create tunnel interface {}", iface),
            Step::TunnelUp { iface, mtu } => write!(f, "set tunnel {} up with mtu {}", iface, mtu),
            Step::AddTunnelAddress { address } => write!(f, "add 6to4 address {}", address),
            Step::AddMappedRoute { iface } => write!(f, "add IPv4-mapped route on {}", iface),
            Step::AddRelayRoute { iface } => write!(f, "add 6to4 relay route on {}", iface),
            Step::DeleteTunnel { iface } => write!(f, "delete tunnel interface {}", iface),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    #[serde(flatten)]
    pub step: Step,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationReport {
    pub steps: Vec<StepOutcome>,
}

impl MutationReport {
    pub fn new() -> Self {
        MutationReport::default()
    }

    /// No step failed. Skipped steps do not count as failures.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed(_)))
    }

    pub fn record(&mut self, step: Step, result: &NetResult<()>) {
        let status = match result {
            Ok(()) => StepStatus::Done,
            Err(e) => {
                tracing::warn!("Unable to {}: {}", step, e);
                StepStatus::Failed(e.to_string())
            }
        };
        self.steps.push(StepOutcome { step, status });
    }

    pub fn skip(&mut self, step: Step, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!("Skipping {}: {}", step, reason);
        self.steps.push(StepOutcome {
            step,
            status: StepStatus::Skipped(reason),
        });
    }
}

/// Issues privileged commands against the host described by a NetContext
pub struct NetworkMutator<'a, R> {
    ctx: &'a NetContext<R>,
}

impl<'a, R: CommandRunner> NetworkMutator<'a, R> {
    pub fn new(ctx: &'a NetContext<R>) -> Self {
        NetworkMutator { ctx }
    }

    /// Run one command; a non-zero exit is a failure
    async fn execute(&self, invocation: Invocation) -> NetResult<()> {
        tracing::debug!("Executing '{}'", invocation);
        self.ctx.runner().run_checked(&invocation).await.map(|_| ())
    }

    async fn link_set(&self, iface: &str, state: &str) -> NetResult<()> {
        self.execute(self.ctx.ip().invocation(["link", "set", iface, state]))
            .await
    }
}

/// Reject names that cannot be a kernel interface or would change the meaning
/// of a shell command line.
pub fn validate_iface_name(iface: &str) -> NetResult<()> {
    if iface.is_empty() || iface.len() > MAX_IFACE_NAME_LEN {
        return Err(NetError::Precondition(format!(
            "interface name '{}' must be 1 to {} characters",
            iface, MAX_IFACE_NAME_LEN
        )));
    }
    if iface.starts_with('-')
        || !iface
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@' | ':'))
    {
        return Err(NetError::Precondition(format!(
            "interface name '{}' contains unsupported characters",
            iface
        )));
    }
    Ok(())
}
