//! Error types for the container engine layer.

use thiserror::Error;

/// Errors produced while running containers.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A command inside the container exited non-zero.
    #[error("command {command:?} exited with code {exit_code}: {stderr}")]
    ExecFailed {
        command: Vec<String>,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// The base image could not be pulled.
    #[error("failed to pull image {image}: {reason}")]
    ImagePull { image: String, reason: String },

    /// The container runtime CLI could not be started.
    #[error("container runtime `{cli}` is not available: {reason}")]
    RuntimeUnavailable { cli: String, reason: String },

    /// Registry login was rejected.
    #[error("registry authentication failed for {registry}: {reason}")]
    Auth { registry: String, reason: String },

    /// Pushing an image failed.
    #[error("failed to publish {address}: {reason}")]
    Publish { address: String, reason: String },

    /// Copying an artifact out of a container failed.
    #[error("failed to export {path}: {reason}")]
    Export { path: String, reason: String },

    /// A runtime command did not finish in time.
    #[error("{operation} timed out after {timeout_secs} seconds")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("invalid image reference: {0}")]
    InvalidImageRef(String),

    #[error("invalid container spec: {0}")]
    InvalidSpec(String),

    #[error("secret {name} is unavailable: {reason}")]
    SecretUnavailable { name: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Exit code of the failed command, if this error came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            EngineError::ExecFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_failure_message_carries_stderr_verbatim() {
        let err = EngineError::ExecFailed {
            command: vec!["vale".to_string(), "docs".to_string()],
            exit_code: 1,
            stdout: String::new(),
            stderr: "docs/index.md:3:1 error".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exited with code 1"));
        assert!(msg.contains("docs/index.md:3:1 error"));
        assert_eq!(err.exit_code(), Some(1));
    }

    #[test]
    fn non_exec_errors_have_no_exit_code() {
        let err = EngineError::InvalidSpec("empty".to_string());
        assert_eq!(err.exit_code(), None);
    }
}
