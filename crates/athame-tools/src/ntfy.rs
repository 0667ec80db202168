//! ntfy push notifications over HTTP.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ToolError, ToolResult};

pub const DEFAULT_SERVER: &str = "https://ntfy.sh";
pub const DEFAULT_TOPIC: &str = "athame";

/// ntfy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NtfyConfig {
    /// Server URL
    pub server: String,
    /// Topic used when callers do not pick one
    pub topic: String,
}

impl Default for NtfyConfig {
    fn default() -> Self {
        NtfyConfig {
            server: std::env::var("ATHAME_NTFY_SERVER")
                .unwrap_or_else(|_| DEFAULT_SERVER.to_string()),
            topic: std::env::var("ATHAME_NTFY_TOPIC").unwrap_or_else(|_| DEFAULT_TOPIC.to_string()),
        }
    }
}

impl NtfyConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(server: &str, topic: &str) -> Self {
        NtfyConfig {
            server: server.to_string(),
            topic: topic.to_string(),
        }
    }
}

/// Optional message metadata, sent as headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub title: Option<String>,
    /// `urgent`, `high`, `default`, `low` or `min`.
    pub priority: Option<String>,
    /// Comma-separated tags / emoji shortcodes.
    pub tags: Option<String>,
    pub markdown: bool,
    /// Action buttons, e.g. `view, Open, https://...`.
    pub actions: Option<String>,
}

/// ntfy HTTP client
#[derive(Debug, Clone)]
pub struct NtfyClient {
    config: NtfyConfig,
    http_client: reqwest::Client,
}

impl NtfyClient {
    pub fn new(config: NtfyConfig) -> ToolResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("athame/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::http("ntfy", e))?;
        Ok(NtfyClient {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &NtfyConfig {
        &self.config
    }

    /// POST `message` to `<server>/<topic>`. Any non-2xx status is an error.
    pub async fn send(&self, topic: &str, message: &str, opts: &SendOptions) -> ToolResult<String> {
        let url = format!("{}/{}", self.config.server.trim_end_matches('/'), topic);
        debug!(topic = %topic, title = ?opts.title, "sending ntfy notification");

        let mut req = self.http_client.post(&url).body(message.to_string());
        if let Some(title) = opts.title.as_deref().filter(|t| !t.is_empty()) {
            req = req.header("Title", title);
        }
        if let Some(priority) = opts.priority.as_deref().filter(|p| !p.is_empty()) {
            req = req.header("Priority", priority);
        }
        if let Some(tags) = opts.tags.as_deref().filter(|t| !t.is_empty()) {
            req = req.header("Tags", tags);
        }
        if opts.markdown {
            req = req.header("Markdown", "yes");
        }
        if let Some(actions) = opts.actions.as_deref().filter(|a| !a.is_empty()) {
            req = req.header("Actions", actions);
        }

        let resp = req.send().await.map_err(|e| ToolError::http("ntfy", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                service: "ntfy",
                status: status.as_u16(),
            });
        }
        Ok(format!("Notification sent successfully to {topic}"))
    }
}
