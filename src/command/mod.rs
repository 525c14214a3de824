// Subprocess execution - spawns external tools and captures their output

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{NetError, NetResult};

/// Shell used for commands that need redirections
pub const SH_COMMAND: &str = "sh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationKind {
    /// Run the program directly with an argument vector
    Direct { program: String, args: Vec<String> },
    /// Hand the whole line to `sh -c`
    Shell { line: String },
}

/// A single external command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: InvocationKind,
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn direct<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            kind: InvocationKind::Direct {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
            stdin: None,
        }
    }

    pub fn shell(line: impl Into<String>) -> Self {
        Invocation {
            kind: InvocationKind::Shell { line: line.into() },
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InvocationKind::Direct { program, args } => {
                write!(f, "{}", program)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            InvocationKind::Shell { line } => write!(f, "{}", line),
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands. The real implementation spawns processes; tests
/// swap in a scripted runner.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run the command to completion. A non-zero exit is not an error here,
    /// callers inspect `exit_code` themselves.
    async fn run(&self, invocation: &Invocation) -> NetResult<CommandOutput>;

    /// Run the command and treat a non-zero exit as a failure.
    async fn run_checked(&self, invocation: &Invocation) -> NetResult<CommandOutput> {
        let output = self.run(invocation).await?;
        if !output.success() {
            return Err(NetError::NonZeroExit {
                command: invocation.to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Spawns real processes through tokio
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        SystemRunner { timeout }
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> NetResult<CommandOutput> {
        let command_line = invocation.to_string();
        tracing::trace!("Executing '{}'", command_line);

        let mut command = match &invocation.kind {
            InvocationKind::Direct { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            InvocationKind::Shell { line } => {
                let mut cmd = Command::new(SH_COMMAND);
                cmd.arg("-c").arg(line);
                cmd
            }
        };
        command
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| NetError::Spawn {
            command: command_line.clone(),
            source: e,
        })?;

        // stdin is fed while the child runs, both under the same timeout
        let stdin_pipe = child.stdin.take();
        let feed = async {
            match (&invocation.stdin, stdin_pipe) {
                (Some(input), Some(mut stdin)) => {
                    let written = stdin.write_all(input.as_bytes()).await;
                    // closing stdin lets filters like `cat` terminate
                    drop(stdin);
                    match written {
                        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                            tracing::trace!("'{}' exited without reading all of its input", command_line);
                            Ok(())
                        }
                        other => other,
                    }
                }
                _ => Ok(()),
            }
        };
        let finish = async { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, finish).await {
                Ok(results) => results,
                Err(_) => {
                    tracing::warn!("'{}' timed out after {:?}", command_line, limit);
                    return Err(NetError::Timeout {
                        command: command_line.clone(),
                        timeout: limit,
                    });
                }
            },
            None => finish.await,
        };
        let output = fed.and(output).map_err(|e| NetError::Wait {
            command: command_line.clone(),
            source: e,
        })?;

        // killed by a signal has no exit code
        let exit_code = output.status.code().unwrap_or(-1);
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display() {
        let direct = Invocation::direct("/sbin/ip", ["-6", "route"]);
        assert_eq!(direct.to_string(), "/sbin/ip -6 route");

        let shell = Invocation::shell("echo 2 > /proc/sys/net/ipv6/conf/all/use_tempaddr");
        assert_eq!(
            shell.to_string(),
            "echo 2 > /proc/sys/net/ipv6/conf/all/use_tempaddr"
        );
    }

    #[tokio::test]
    async fn test_system_runner_captures_stdout_and_exit_code() {
        let runner = SystemRunner::new(Some(Duration::from_secs(5)));

        let ok = runner.run(&Invocation::shell("echo hello")).await.unwrap();
        assert_eq!(ok.stdout, "hello\n");
        assert!(ok.success());

        let failed = runner.run(&Invocation::shell("exit 3")).await.unwrap();
        assert_eq!(failed.exit_code, 3);
        assert!(matches!(
            runner.run_checked(&Invocation::shell("exit 3")).await,
            Err(NetError::NonZeroExit { code: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_system_runner_feeds_stdin() {
        let runner = SystemRunner::new(Some(Duration::from_secs(5)));
        let output = runner
            .run(&Invocation::shell("cat").with_stdin("piped input"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "piped input");
    }

    #[tokio::test]
    async fn test_system_runner_timeout() {
        let runner = SystemRunner::new(Some(Duration::from_millis(100)));
        let result = runner.run(&Invocation::shell("sleep 5")).await;
        assert!(matches!(result, Err(NetError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_system_runner_timeout_covers_unread_stdin() {
        let runner = SystemRunner::new(Some(Duration::from_millis(200)));
        let started = std::time::Instant::now();
        let result = runner
            .run(&Invocation::shell("sleep 3").with_stdin("x".repeat(1 << 20)))
            .await;
        assert!(matches!(result, Err(NetError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_system_runner_tolerates_unread_stdin_on_exit() {
        let runner = SystemRunner::new(Some(Duration::from_secs(5)));
        let output = runner
            .run(&Invocation::shell("exit 0").with_stdin("x".repeat(1 << 20)))
            .await
            .unwrap();
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_system_runner_spawn_failure() {
        let runner = SystemRunner::new(None);
        let result = runner
            .run(&Invocation::direct("/nonexistent/binary/ip", ["addr"]))
            .await;
        assert!(matches!(result, Err(NetError::Spawn { .. })));
    }
}
