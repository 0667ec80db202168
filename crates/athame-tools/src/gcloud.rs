//! Google Cloud SDK: Cloud Run deploys and lookups.

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult, Secret};
use tracing::info;

use crate::error::{ToolError, ToolResult};
use crate::ToolImage;

const KEY_PATH: &str = "/tmp/key.json";

pinned_tool!(
    Gcloud,
    "google/cloud-sdk",
    "546.0.0-alpine@sha256:cbc3420643b13a8b12950d03d2b0d31c4e522cd3d7438bc10bd741fb9947419c"
);

/// A `gcloud run deploy` request.
#[derive(Debug, Clone)]
pub struct CloudRunDeploy {
    pub service: String,
    /// Image reference, normally in Artifact Registry.
    pub image: String,
    pub project: String,
    pub region: String,
    pub allow_unauthenticated: bool,
    /// Service account key (JSON).
    pub key: Option<Secret>,
}

impl Gcloud {
    /// Base container, logged in with the service account key when given.
    pub fn authenticated(&self, key: Option<&Secret>) -> ContainerSpec {
        match key {
            Some(key) => self.base().with_mounted_secret(KEY_PATH, key).with_exec([
                "gcloud",
                "auth",
                "activate-service-account",
                "--key-file=/tmp/key.json",
            ]),
            None => self.base(),
        }
    }

    pub fn deploy_spec(&self, req: &CloudRunDeploy) -> ContainerSpec {
        let mut args = vec![
            "gcloud".to_string(),
            "run".to_string(),
            "deploy".to_string(),
            req.service.clone(),
            format!("--image={}", req.image),
            format!("--project={}", req.project),
            format!("--region={}", req.region),
        ];
        if req.allow_unauthenticated {
            args.push("--allow-unauthenticated".to_string());
        }
        self.authenticated(req.key.as_ref()).with_exec(args)
    }

    /// Deploy an image to Cloud Run.
    pub async fn deploy(
        &self,
        engine: &dyn ContainerEngine,
        req: &CloudRunDeploy,
    ) -> EngineResult<String> {
        info!(service = %req.service, project = %req.project, region = %req.region, "deploying to Cloud Run");
        engine.stdout(&self.deploy_spec(req)).await
    }

    /// URL Cloud Run assigned to `service` (includes the project number).
    pub async fn service_url(
        &self,
        engine: &dyn ContainerEngine,
        service: &str,
        project: &str,
        region: &str,
        key: Option<&Secret>,
    ) -> ToolResult<String> {
        let spec = self.authenticated(key).with_exec([
            "gcloud".to_string(),
            "run".to_string(),
            "services".to_string(),
            "describe".to_string(),
            service.to_string(),
            format!("--project={project}"),
            format!("--region={region}"),
            "--format=value(status.url)".to_string(),
        ]);
        let out = engine.stdout(&spec).await?;
        let url = out.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(ToolError::MissingOutput(format!(
                "service URL not found for {service}"
            )));
        }
        Ok(url.to_string())
    }
}

impl ToolImage for Gcloud {
    fn name(&self) -> &'static str {
        "gcloud"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
