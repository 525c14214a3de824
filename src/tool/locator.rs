// Locates a working `ip` binary: existence check first, then a live smoke test,
// because some devices ship an `ip` that is present but broken.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use super::{ADDRESSES_COMMAND, IpTool};
use crate::command::CommandRunner;
use crate::error::{NetError, NetResult};

pub const IP_BINARY: &str = "ip";
pub const BUSYBOX_BINARY: &str = "busybox";

/// Where to look, in order
#[derive(Debug, Clone)]
pub struct ToolSearch {
    pub dirs: Vec<PathBuf>,
}

impl Default for ToolSearch {
    fn default() -> Self {
        ToolSearch {
            dirs: ["/sbin/", "/bin/", "/system/bin/", "/system/xbin/"]
                .iter()
                .map(PathBuf::from)
                .collect(),
        }
    }
}

impl ToolSearch {
    /// Direct `ip` in every directory first, then `busybox ip` in every directory.
    pub fn candidates(&self) -> Vec<IpTool> {
        let direct = self
            .dirs
            .iter()
            .map(|dir| IpTool::new(dir.join(IP_BINARY), vec![]));
        let multi_call = self
            .dirs
            .iter()
            .map(|dir| IpTool::new(dir.join(BUSYBOX_BINARY), vec![IP_BINARY.to_string()]));
        direct.chain(multi_call).collect()
    }
}

/// Resolves the tool once; the first working candidate is kept for the
/// lifetime of the locator and never re-validated.
#[derive(Debug, Default)]
pub struct ToolLocator {
    search: ToolSearch,
    resolved: OnceLock<IpTool>,
    tried: Mutex<Vec<String>>,
}

impl ToolLocator {
    pub fn new(search: ToolSearch) -> Self {
        ToolLocator {
            search,
            resolved: OnceLock::new(),
            tried: Mutex::new(Vec::new()),
        }
    }

    /// Build a locator that already knows its tool and never probes.
    pub fn preresolved(tool: IpTool) -> Self {
        let locator = ToolLocator::new(ToolSearch { dirs: Vec::new() });
        let _ = locator.resolved.set(tool);
        locator
    }

    /// Fails with the last transient (retryable) smoke-test error if there was
    /// one, otherwise with ToolNotFound. Failures are never cached.
    pub async fn resolve<R: CommandRunner>(&self, runner: &R) -> NetResult<IpTool> {
        if let Some(tool) = self.resolved.get() {
            return Ok(tool.clone());
        }

        let mut tried = Vec::new();
        let mut transient = None;
        for candidate in self.search.candidates() {
            let binary = candidate_binary(&candidate);
            tracing::trace!("Checking for availability of '{}'", binary.display());

            if is_readable_file(&binary) {
                let smoke_test = candidate.invocation([ADDRESSES_COMMAND]);
                tracing::debug!("Trying to execute '{}'", smoke_test);
                match runner.run_checked(&smoke_test).await {
                    Ok(_) => {
                        tracing::debug!("Found working ip binary '{}'", candidate);
                        let tool = self.resolved.get_or_init(|| candidate).clone();
                        self.record_tried(tried);
                        return Ok(tool);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Found ip binary '{}', but it does not behave as expected ({}). Trying next location.",
                            candidate,
                            e
                        );
                        if e.is_retryable() {
                            transient = Some(e);
                        }
                    }
                }
            }
            tried.push(candidate.to_string());
        }

        tracing::error!(
            "Could not find ip binary in {:?}, will be unable to read network interface details",
            tried
        );
        self.record_tried(tried.clone());
        // a candidate that only failed transiently may work on the next attempt
        match transient {
            Some(e) => Err(e),
            None => Err(NetError::ToolNotFound { tried }),
        }
    }

    /// Candidates rejected during the last resolution attempt
    pub fn tried(&self) -> Vec<String> {
        self.tried.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn record_tried(&self, tried: Vec<String>) {
        if let Ok(mut guard) = self.tried.lock() {
            *guard = tried;
        }
    }
}

fn candidate_binary(tool: &IpTool) -> PathBuf {
    tool.program.clone()
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && std::fs::File::open(path).is_ok()
}
