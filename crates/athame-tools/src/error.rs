//! Error types for tool wrappers that do more than run a container.

use athame_engine::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    /// The wrapped tool (or its container) failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Transport-level HTTP failure. URLs are stripped because deploy hook
    /// URLs are credentials.
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned non-success status: {status}")]
    Status { service: &'static str, status: u16 },

    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },

    /// A tool ran but produced nothing usable.
    #[error("{0}")]
    MissingOutput(String),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

impl ToolError {
    pub(crate) fn http(service: &'static str, source: reqwest::Error) -> Self {
        ToolError::Http {
            service,
            source: source.without_url(),
        }
    }
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;
