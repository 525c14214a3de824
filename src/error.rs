// Error types for reading and changing host network state

use std::time::Duration;
use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum NetError {
    #[error("No working ip binary found, tried:{}", format_tried(.tried))]
    ToolNotFound { tried: Vec<String> },

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Interrupted while waiting for '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' exited with code {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using NetError
pub type NetResult<T> = Result<T, NetError>;

fn format_tried(tried: &[String]) -> String {
    tried.iter().map(|t| format!(" '{}'", t)).collect()
}

impl NetError {
    /// Convert error to user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            NetError::ToolNotFound { .. } => {
                "Could not find a working ip binary, unable to read network interface details.".to_string()
            }
            NetError::Spawn { .. } | NetError::NonZeroExit { .. } => {
                "Unable to execute system command (root access missing?).".to_string()
            }
            NetError::Timeout { command, .. } => {
                format!("'{}' did not finish in time. Try again.", command)
            }
            NetError::Wait { .. } => "Command was interrupted. Try again.".to_string(),
            NetError::Precondition(msg) => format!("Invalid request: {}", msg),
            NetError::Io(_) => {
                "File system error. Check permissions on the kernel configuration tree.".to_string()
            }
            NetError::Config(_) => {
                "Configuration error. Check your config file or command-line arguments.".to_string()
            }
            NetError::Serialization(_) => {
                "Data format error. This might be a bug, please report it.".to_string()
            }
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, NetError::Timeout { .. } | NetError::Wait { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout = NetError::Timeout {
            command: "/sbin/ip addr".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(timeout.is_retryable());
        assert!(!NetError::Precondition("test".to_string()).is_retryable());
        assert!(!NetError::ToolNotFound { tried: vec![] }.is_retryable());
    }

    #[test]
    fn test_tool_not_found_lists_tried_paths() {
        let err = NetError::ToolNotFound {
            tried: vec!["/sbin/ip".to_string(), "/bin/busybox ip".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No working ip binary found, tried: '/sbin/ip' '/bin/busybox ip'"
        );
    }
}
