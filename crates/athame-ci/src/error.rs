//! Error types for pipelines, notifications and deploy targets.

use athame_engine::EngineError;
use athame_tools::ToolError;
use thiserror::Error;

/// A check in a fan-out that did not succeed.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("{task}: {source}")]
    Failed {
        task: String,
        #[source]
        source: EngineError,
    },

    #[error("{task} did not complete: {reason}")]
    Aborted { task: String, reason: String },
}

impl CheckError {
    pub fn task(&self) -> &str {
        match self {
            CheckError::Failed { task, .. } | CheckError::Aborted { task, .. } => task,
        }
    }
}

/// Delivering a notification failed.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A deploy target failed.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("{target} deploy failed: {source}")]
    Failed {
        target: String,
        #[source]
        source: ToolError,
    },

    #[error("{target} deploy is misconfigured: {reason}")]
    Misconfigured { target: String, reason: String },
}

impl DeployError {
    pub fn failed(target: &str, source: impl Into<ToolError>) -> Self {
        DeployError::Failed {
            target: target.to_lowercase(),
            source: source.into(),
        }
    }
}

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("tests failed: {0}")]
    TestsFailed(#[source] CheckError),

    #[error("build failed: {0}")]
    Build(#[source] EngineError),

    #[error("trivy scan failed: {0}")]
    Scan(#[source] EngineError),

    #[error("failed to publish to {registry}: {source}")]
    Publish {
        registry: String,
        #[source]
        source: EngineError,
    },

    /// Deploy failed after the image was published to `address`.
    #[error("{source}")]
    Deploy {
        address: String,
        #[source]
        source: DeployError,
    },

    #[error("phase {phase} cannot run after {after}")]
    PhaseOrder { phase: String, after: String },
}

impl PipelineError {
    pub fn publish_ghcr(source: EngineError) -> Self {
        PipelineError::Publish {
            registry: "GHCR".to_string(),
            source,
        }
    }

    /// Address that was already published when the pipeline failed.
    pub fn published_address(&self) -> Option<&str> {
        match self {
            PipelineError::Deploy { address, .. } => Some(address),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_failed(stderr: &str) -> EngineError {
        EngineError::ExecFailed {
            command: vec!["vale".into(), "docs".into()],
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn tests_failed_keeps_tool_output() {
        let err = PipelineError::TestsFailed(CheckError::Failed {
            task: "vale".into(),
            source: exec_failed("docs/index.md:3:1: Vale.Spelling"),
        });
        let msg = err.to_string();
        assert!(msg.starts_with("tests failed: vale: "));
        assert!(msg.contains("Vale.Spelling"));
    }

    #[test]
    fn deploy_error_uses_lowercase_target() {
        let err = DeployError::failed("Fly.io", ToolError::MissingOutput("no app".into()));
        assert!(err.to_string().starts_with("fly.io deploy failed: "));
    }

    #[test]
    fn publish_error_names_registry() {
        let err = PipelineError::publish_ghcr(EngineError::Publish {
            address: "ghcr.io/o/site:1".into(),
            reason: "denied".into(),
        });
        assert!(err.to_string().starts_with("failed to publish to GHCR: "));
        assert!(err.published_address().is_none());
    }
}
