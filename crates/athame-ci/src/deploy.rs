//! Deploy targets for published images.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use athame_engine::{ContainerEngine, ImageRef, Secret};
use athame_tools::flyio::{Flyio, DEFAULT_REGION as FLYIO_DEFAULT_REGION};
use athame_tools::gcloud::{CloudRunDeploy, Gcloud};
use athame_tools::render::RenderDeployHook;
use athame_tools::ToolResult;
use serde::{Deserialize, Serialize};

use crate::error::DeployError;
use crate::fanout::join_all_first_error;
use crate::notify::{notify_best_effort, Notification, Notifier};
use crate::obs;

/// Port nginx listens on inside the site image.
pub const SITE_INTERNAL_PORT: u16 = 80;
pub const CLOUD_RUN_DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_ARTIFACT_REGISTRY_REPO: &str = "ghcr";
pub const DEFAULT_ARTIFACT_REGISTRY_REGION: &str = "europe-north2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployOutcome {
    pub target: String,
    pub url: String,
    pub output: String,
}

/// Somewhere a published image can be deployed.
#[async_trait]
pub trait DeployTarget: Send + Sync {
    /// Human readable name, e.g. `Fly.io`.
    fn name(&self) -> &'static str;

    /// Public URL of the deployed site.
    fn site_url(&self) -> String;

    /// Message sent once the deploy succeeded.
    fn completed_message(&self) -> Notification;

    /// Deploy `image` (the published address, unchanged).
    async fn deploy(&self, image: &str) -> Result<String, DeployError>;
}

pub struct FlyioTarget {
    engine: Arc<dyn ContainerEngine>,
    flyio: Flyio,
    app: String,
    token: Secret,
    region: String,
    internal_port: u16,
}

impl FlyioTarget {
    pub fn new(engine: Arc<dyn ContainerEngine>, app: impl Into<String>, token: Secret) -> Self {
        Self {
            engine,
            flyio: Flyio::default(),
            app: app.into(),
            token,
            region: FLYIO_DEFAULT_REGION.to_string(),
            internal_port: SITE_INTERNAL_PORT,
        }
    }

    /// Primary region; empty keeps the default.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        if !region.is_empty() {
            self.region = region;
        }
        self
    }

    pub fn with_internal_port(mut self, port: u16) -> Self {
        self.internal_port = port;
        self
    }
}

#[async_trait]
impl DeployTarget for FlyioTarget {
    fn name(&self) -> &'static str {
        "Fly.io"
    }

    fn site_url(&self) -> String {
        format!("https://{}.fly.dev", self.app)
    }

    fn completed_message(&self) -> Notification {
        Notification::succeeded(
            "Fly.io Deploy Completed",
            format!("Deployed to Fly.io.\n\n**App:** {}", self.app),
        )
        .with_markdown()
        .with_view_action(&self.site_url())
    }

    async fn deploy(&self, image: &str) -> Result<String, DeployError> {
        if self.app.is_empty() {
            return Err(DeployError::Misconfigured {
                target: self.name().to_lowercase(),
                reason: "app name is empty".to_string(),
            });
        }
        self.flyio
            .deploy(
                self.engine.as_ref(),
                &self.app,
                image,
                &self.token,
                &self.region,
                self.internal_port,
            )
            .await
            .map_err(|e| DeployError::failed(self.name(), e))
    }
}

pub struct CloudRunTarget {
    engine: Arc<dyn ContainerEngine>,
    gcloud: Gcloud,
    service: String,
    project: String,
    region: String,
    key: Secret,
    allow_unauthenticated: bool,
    artifact_registry_repo: String,
    artifact_registry_region: String,
}

impl CloudRunTarget {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        service: impl Into<String>,
        project: impl Into<String>,
        key: Secret,
    ) -> Self {
        Self {
            engine,
            gcloud: Gcloud::default(),
            service: service.into(),
            project: project.into(),
            region: CLOUD_RUN_DEFAULT_REGION.to_string(),
            key,
            allow_unauthenticated: false,
            artifact_registry_repo: DEFAULT_ARTIFACT_REGISTRY_REPO.to_string(),
            artifact_registry_region: DEFAULT_ARTIFACT_REGISTRY_REGION.to_string(),
        }
    }

    /// Cloud Run region; empty keeps the default.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        if !region.is_empty() {
            self.region = region;
        }
        self
    }

    pub fn allow_unauthenticated(mut self, allow: bool) -> Self {
        self.allow_unauthenticated = allow;
        self
    }

    /// Artifact Registry remote repository proxying GHCR.
    pub fn with_artifact_registry(
        mut self,
        repo: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        self.artifact_registry_repo = repo.into();
        self.artifact_registry_region = region.into();
        self
    }

    /// Where Cloud Run pulls `address` from.
    ///
    /// GHCR addresses map onto the Artifact Registry remote repository;
    /// anything else is used as-is.
    pub fn artifact_registry_image(&self, address: &str) -> String {
        match ImageRef::parse(address) {
            Ok(r) if r.registry() == "ghcr.io" => format!(
                "{}-docker.pkg.dev/{}/{}/{}",
                self.artifact_registry_region,
                self.project,
                self.artifact_registry_repo,
                r.path_without_registry()
            ),
            _ => address.to_string(),
        }
    }
}

#[async_trait]
impl DeployTarget for CloudRunTarget {
    fn name(&self) -> &'static str {
        "Google Cloud Run"
    }

    fn site_url(&self) -> String {
        format!("https://{}-{}.run.app", self.service, self.region)
    }

    fn completed_message(&self) -> Notification {
        Notification::succeeded(
            "Google Cloud Run Deploy Completed",
            format!("Deployed to Cloud Run.\n\n**Service:** {}", self.service),
        )
        .with_markdown()
        .with_view_action(&self.site_url())
    }

    async fn deploy(&self, image: &str) -> Result<String, DeployError> {
        if self.service.is_empty() || self.project.is_empty() {
            return Err(DeployError::Misconfigured {
                target: self.name().to_lowercase(),
                reason: "service and project are required".to_string(),
            });
        }
        let req = CloudRunDeploy {
            service: self.service.clone(),
            image: self.artifact_registry_image(image),
            project: self.project.clone(),
            region: self.region.clone(),
            allow_unauthenticated: self.allow_unauthenticated,
            key: Some(self.key.clone()),
        };
        self.gcloud
            .deploy(self.engine.as_ref(), &req)
            .await
            .map_err(|e| DeployError::failed(self.name(), e))
    }
}

pub struct RenderTarget {
    hook: RenderDeployHook,
    service_name: String,
    pin_image: bool,
}

impl RenderTarget {
    /// `service_name` is the `<name>.onrender.com` subdomain.
    pub fn new(hook: Secret, service_name: impl Into<String>) -> ToolResult<Self> {
        Ok(Self {
            hook: RenderDeployHook::new(hook)?,
            service_name: service_name.into(),
            pin_image: false,
        })
    }

    /// Deploy the published address instead of the service's configured image.
    pub fn pin_image(mut self, pin: bool) -> Self {
        self.pin_image = pin;
        self
    }
}

#[async_trait]
impl DeployTarget for RenderTarget {
    fn name(&self) -> &'static str {
        "Render"
    }

    fn site_url(&self) -> String {
        format!("https://{}.onrender.com", self.service_name)
    }

    fn completed_message(&self) -> Notification {
        Notification::succeeded("Render Deploy Completed", "Deployed to Render.")
            .with_view_action(&self.site_url())
    }

    async fn deploy(&self, image: &str) -> Result<String, DeployError> {
        let result = if self.pin_image {
            self.hook.deploy_image(image).await
        } else {
            self.hook.deploy().await
        };
        result.map_err(|e| DeployError::failed(self.name(), e))
    }
}

/// How several targets are driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStrategy {
    /// One after another, stopping at the first failure.
    Sequential,
    /// All at once; every target is attempted.
    #[default]
    Concurrent,
}

impl FromStr for DeployStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(DeployStrategy::Sequential),
            "concurrent" => Ok(DeployStrategy::Concurrent),
            other => Err(format!("unknown deploy strategy: {other}")),
        }
    }
}

async fn deploy_one(
    target: &dyn DeployTarget,
    image: &str,
    notifier: &dyn Notifier,
) -> Result<DeployOutcome, DeployError> {
    match target.deploy(image).await {
        Ok(output) => {
            let url = target.site_url();
            obs::emit_deploy_finished(target.name(), Some(&url), true);
            notify_best_effort(notifier, target.completed_message()).await;
            Ok(DeployOutcome {
                target: target.name().to_string(),
                url,
                output,
            })
        }
        Err(e) => {
            obs::emit_deploy_finished(target.name(), None, false);
            notify_best_effort(
                notifier,
                Notification::failed(format!("{} Deploy Failed", target.name())),
            )
            .await;
            Err(e)
        }
    }
}

/// Deploy `image` to every target, notifying per target.
pub async fn deploy_all(
    targets: &[Box<dyn DeployTarget>],
    image: &str,
    strategy: DeployStrategy,
    notifier: &dyn Notifier,
) -> Result<Vec<DeployOutcome>, DeployError> {
    match strategy {
        DeployStrategy::Sequential => {
            let mut outcomes = Vec::with_capacity(targets.len());
            for target in targets {
                outcomes.push(deploy_one(target.as_ref(), image, notifier).await?);
            }
            Ok(outcomes)
        }
        DeployStrategy::Concurrent => {
            join_all_first_error(
                targets
                    .iter()
                    .map(|t| deploy_one(t.as_ref(), image, notifier)),
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athame_engine::fakes::ScriptedEngine;

    const ADDR: &str = "ghcr.io/staticaland/athame/mkdocs-demo:latest@sha256:0f3e5b1c2d4a69788796a5b4c3d2e1f00112233445566778899aabbccddeeff0";

    fn cloud_run(engine: ScriptedEngine) -> CloudRunTarget {
        CloudRunTarget::new(
            Arc::new(engine),
            "docs",
            "my-project",
            Secret::new("GCLOUD_SERVICE_ACCOUNT_KEY", "{}"),
        )
    }

    #[test]
    fn ghcr_addresses_map_to_artifact_registry() {
        let target = cloud_run(ScriptedEngine::new());
        assert_eq!(
            target.artifact_registry_image(ADDR),
            format!(
                "europe-north2-docker.pkg.dev/my-project/ghcr/{}",
                ADDR.trim_start_matches("ghcr.io/")
            )
        );
        assert_eq!(
            target.artifact_registry_image("docker.io/library/nginx:1.27"),
            "docker.io/library/nginx:1.27"
        );
    }

    #[test]
    fn site_urls() {
        let engine: Arc<dyn ContainerEngine> = Arc::new(ScriptedEngine::new());
        let fly = FlyioTarget::new(engine, "athame-docs", Secret::new("FLY_API_TOKEN", "t"));
        assert_eq!(fly.site_url(), "https://athame-docs.fly.dev");
        let run = cloud_run(ScriptedEngine::new()).with_region("");
        assert_eq!(run.site_url(), "https://docs-us-central1.run.app");
    }

    #[test]
    fn strategy_parses() {
        assert_eq!("sequential".parse(), Ok(DeployStrategy::Sequential));
        assert_eq!(DeployStrategy::default(), DeployStrategy::Concurrent);
        assert!("parallel".parse::<DeployStrategy>().is_err());
    }

    #[tokio::test]
    async fn cloud_run_deploys_rewritten_image() {
        let engine = ScriptedEngine::new();
        cloud_run(engine.clone()).deploy(ADDR).await.unwrap();
        let line = engine.calls_matching("gcloud run deploy")[0].command_line();
        assert!(line.contains("--image=europe-north2-docker.pkg.dev/my-project/ghcr/staticaland/"));
        assert!(line.contains("--region=us-central1"));
    }

    #[tokio::test]
    async fn empty_app_is_misconfigured() {
        let engine = ScriptedEngine::new();
        let fly = FlyioTarget::new(Arc::new(engine.clone()), "", Secret::new("FLY_API_TOKEN", "t"));
        let err = fly.deploy(ADDR).await.unwrap_err();
        assert!(matches!(err, DeployError::Misconfigured { .. }));
        assert!(engine.calls().is_empty());
    }
}
