//! Fly.io deploys with flyctl.

use athame_engine::{ContainerEngine, ContainerSpec, Secret};
use serde::Serialize;
use tracing::info;

use crate::alpine::Alpine;
use crate::error::ToolResult;
use crate::ToolImage;

pub const DEFAULT_REGION: &str = "arn";
pub const DEFAULT_INTERNAL_PORT: u16 = 8080;
const CONFIG_PATH: &str = "/fly.toml";
const FLYCTL: &str = "/root/.fly/bin/flyctl";

#[derive(Debug, Serialize)]
struct FlyConfig<'a> {
    app: &'a str,
    primary_region: &'a str,
    build: FlyBuild<'a>,
    http_service: FlyHttpService,
}

#[derive(Debug, Serialize)]
struct FlyBuild<'a> {
    image: &'a str,
}

#[derive(Debug, Serialize)]
struct FlyHttpService {
    internal_port: u16,
    force_https: bool,
    auto_stop_machines: bool,
    auto_start_machines: bool,
    min_machines_running: u32,
}

/// Render the `fly.toml` for an image-based app.
pub fn render_config(app: &str, image: &str, region: &str, internal_port: u16) -> ToolResult<String> {
    let config = FlyConfig {
        app,
        primary_region: region,
        build: FlyBuild { image },
        http_service: FlyHttpService {
            internal_port,
            force_https: true,
            auto_stop_machines: true,
            auto_start_machines: true,
            min_machines_running: 0,
        },
    };
    Ok(toml::to_string(&config)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Flyio {
    alpine: Alpine,
}

impl Flyio {
    /// Alpine with flyctl installed and the API token in `FLY_API_TOKEN`.
    pub fn with_token(&self, token: &Secret) -> ContainerSpec {
        self.base().with_secret_variable("FLY_API_TOKEN", token)
    }

    pub fn deploy_spec(
        &self,
        app: &str,
        image: &str,
        token: &Secret,
        region: &str,
        internal_port: u16,
    ) -> ToolResult<ContainerSpec> {
        let config = render_config(app, image, region, internal_port)?;
        Ok(self
            .with_token(token)
            .with_new_file(CONFIG_PATH, config)
            .with_exec([FLYCTL, "deploy", "--config", CONFIG_PATH]))
    }

    /// Deploy `image` as `app`.
    pub async fn deploy(
        &self,
        engine: &dyn ContainerEngine,
        app: &str,
        image: &str,
        token: &Secret,
        region: &str,
        internal_port: u16,
    ) -> ToolResult<String> {
        info!(app = %app, image = %image, region = %region, "deploying to Fly.io");
        let spec = self.deploy_spec(app, image, token, region, internal_port)?;
        Ok(engine.stdout(&spec).await?)
    }
}

impl ToolImage for Flyio {
    fn name(&self) -> &'static str {
        "flyio"
    }

    fn base(&self) -> ContainerSpec {
        self.alpine
            .with_packages(["curl"])
            .with_exec(["sh", "-c", "curl -L https://fly.io/install.sh | sh"])
    }
}
