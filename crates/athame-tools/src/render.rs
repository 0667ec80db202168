//! Render deploy hooks.
//!
//! The hook URL is itself the credential, so it is held as a [`Secret`] and
//! stripped from every error.

use athame_engine::Secret;
use tracing::info;

use crate::error::{ToolError, ToolResult};

/// Client for one service's deploy hook.
#[derive(Debug, Clone)]
pub struct RenderDeployHook {
    hook: Secret,
    http_client: reqwest::Client,
}

impl RenderDeployHook {
    pub fn new(hook: Secret) -> ToolResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("athame/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::http("render", e))?;
        Ok(Self { hook, http_client })
    }

    /// Redeploy the service's current image.
    pub async fn deploy(&self) -> ToolResult<String> {
        self.trigger(self.hook.plaintext().to_string()).await
    }

    /// Deploy a specific image (`registry/repo:tag` or `registry/repo@digest`).
    pub async fn deploy_image(&self, image_url: &str) -> ToolResult<String> {
        self.trigger(image_hook_url(self.hook.plaintext(), image_url))
            .await
    }

    async fn trigger(&self, url: String) -> ToolResult<String> {
        let resp = self
            .http_client
            .post(url)
            .send()
            .await
            .map_err(|e| ToolError::http("render", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                service: "render",
                status: status.as_u16(),
            });
        }
        info!(status = status.as_u16(), "render deploy triggered");
        Ok(format!("Deploy triggered successfully. Status: {status}"))
    }
}

/// Hook URL with the `imgURL` query parameter appended. Hook URLs already
/// carry a `key` query parameter.
pub fn image_hook_url(hook: &str, image_url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(image_url.as_bytes()).collect();
    format!("{hook}&imgURL={encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_url_is_query_escaped() {
        let url = image_hook_url(
            "https://api.render.com/deploy/srv-1?key=abc",
            "ghcr.io/o/site:1@sha256:ff",
        );
        assert_eq!(
            url,
            "https://api.render.com/deploy/srv-1?key=abc&imgURL=ghcr.io%2Fo%2Fsite%3A1%40sha256%3Aff"
        );
    }
}
