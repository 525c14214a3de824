// Scripted runner for tests: answers by exact command line and records calls

use std::sync::Mutex;

use super::{CommandOutput, CommandRunner, Invocation};
use crate::error::{NetError, NetResult};

enum Reply {
    Output(CommandOutput),
    SpawnError,
    Timeout,
}

/// Unscripted commands succeed with empty output.
#[derive(Default)]
pub(crate) struct FakeRunner {
    replies: Vec<(String, Reply)>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        FakeRunner::default()
    }

    pub(crate) fn respond(mut self, command: &str, stdout: &str) -> Self {
        self.replies.push((
            command.to_string(),
            Reply::Output(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: 0,
            }),
        ));
        self
    }

    pub(crate) fn fail(mut self, command: &str, exit_code: i32) -> Self {
        self.replies.push((
            command.to_string(),
            Reply::Output(CommandOutput {
                stdout: String::new(),
                stderr: "RTNETLINK answers: Operation not permitted".to_string(),
                exit_code,
            }),
        ));
        self
    }

    pub(crate) fn spawn_error(mut self, command: &str) -> Self {
        self.replies.push((command.to_string(), Reply::SpawnError));
        self
    }

    pub(crate) fn timeout(mut self, command: &str) -> Self {
        self.replies.push((command.to_string(), Reply::Timeout));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> NetResult<CommandOutput> {
        let line = invocation.to_string();
        self.calls.lock().unwrap().push(line.clone());

        match self.replies.iter().find(|(command, _)| *command == line) {
            Some((_, Reply::Output(output))) => Ok(output.clone()),
            Some((_, Reply::SpawnError)) => Err(NetError::Spawn {
                command: line,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            }),
            Some((_, Reply::Timeout)) => Err(NetError::Timeout {
                command: line,
                timeout: std::time::Duration::from_secs(10),
            }),
            None => Ok(CommandOutput::default()),
        }
    }
}
