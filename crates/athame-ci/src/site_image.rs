//! nginx image serving a built static site.

use athame_engine::{
    ContainerEngine, ContainerSpec, EngineResult, HostDirectory, Platform, RegistryAuth, Secret,
};
use chrono::Utc;
use tracing::info;

pub const NGINX_IMAGE: &str =
    "nginx:1.27.5-alpine3.21@sha256:65645c7bb6a0661892a8b03b89d0743208a18dd2f3f17a54ef4b76fb8e2f2a10";
pub const HTML_DIR: &str = "/usr/share/nginx/html";
pub const SOURCE_URL: &str = "https://github.com/staticaland/athame";
pub const GHCR: &str = "ghcr.io";
pub const DEFAULT_GHCR_USERNAME: &str = "staticaland";

/// `ATHAME_GHCR_USERNAME`, or the default owner.
pub fn default_ghcr_username() -> String {
    std::env::var("ATHAME_GHCR_USERNAME")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_GHCR_USERNAME.to_string())
}

/// Markdown body announcing a published image.
pub fn published_message(address: &str) -> String {
    format!(
        "Published to GHCR.\n\n**Image:**\n```\n{address}\n```\n\n**Run:**\n```bash\ndocker run -p 8080:80 {address}\n```"
    )
}

/// Where and how a site image is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteImage {
    pub image_name: String,
    pub tag: String,
    pub ghcr_username: String,
    pub platforms: Vec<Platform>,
}

impl SiteImage {
    /// amd64 for the hosting platforms, arm64 for local use.
    pub fn new(
        image_name: impl Into<String>,
        tag: impl Into<String>,
        ghcr_username: impl Into<String>,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            tag: tag.into(),
            ghcr_username: ghcr_username.into(),
            platforms: vec![Platform::linux_amd64(), Platform::linux_arm64()],
        }
    }

    pub fn address(&self) -> String {
        format!(
            "{GHCR}/{}/athame/{}:{}",
            self.ghcr_username, self.image_name, self.tag
        )
    }

    /// One nginx container per platform with `site` as its document root.
    pub fn variants(&self, site: &HostDirectory) -> Vec<ContainerSpec> {
        let created = Utc::now().to_rfc3339();
        self.platforms
            .iter()
            .map(|platform| {
                ContainerSpec::from_image(NGINX_IMAGE)
                    .with_platform(platform.clone())
                    .with_directory(HTML_DIR, site)
                    .with_exposed_port(80)
                    .with_label("org.opencontainers.image.title", &self.image_name)
                    .with_label("org.opencontainers.image.version", &self.tag)
                    .with_label("org.opencontainers.image.created", &created)
                    .with_label("org.opencontainers.image.source", SOURCE_URL)
            })
            .collect()
    }

    /// Push `variants` to GHCR as one multi-platform image.
    pub async fn publish(
        &self,
        engine: &dyn ContainerEngine,
        variants: &[ContainerSpec],
        token: &Secret,
    ) -> EngineResult<String> {
        let address = self.address();
        info!(address = %address, variants = variants.len(), "publishing image");
        let auth = RegistryAuth::new(GHCR, &self.ghcr_username, token);
        engine.publish(variants, &address, Some(&auth)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_layout() {
        let image = SiteImage::new("mkdocs-demo", "latest", "staticaland");
        assert_eq!(image.address(), "ghcr.io/staticaland/athame/mkdocs-demo:latest");
    }

    #[test]
    fn published_message_has_run_command() {
        let msg = published_message("ghcr.io/o/athame/docs:1@sha256:abc");
        assert!(msg.starts_with("Published to GHCR."));
        assert!(msg.contains("docker run -p 8080:80 ghcr.io/o/athame/docs:1@sha256:abc"));
    }

    #[test]
    fn variants_cover_both_platforms() {
        let dir = tempfile::tempdir().unwrap();
        let site = HostDirectory::from_path(dir.path()).unwrap();
        let variants = SiteImage::new("docs", "1.2.0", "o").variants(&site);

        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].platform(), Some(&Platform::linux_amd64()));
        assert_eq!(variants[1].platform(), Some(&Platform::linux_arm64()));
        let labels = variants[0].labels();
        assert_eq!(labels[0], ("org.opencontainers.image.title", "docs"));
        assert_eq!(labels[1], ("org.opencontainers.image.version", "1.2.0"));
        assert_eq!(labels[3], ("org.opencontainers.image.source", SOURCE_URL));
    }
}
