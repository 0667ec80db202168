//! Renovate dependency updater.

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult, Secret};

use crate::ToolImage;

pinned_tool!(
    Renovate,
    "renovate/renovate",
    "41.163.0@sha256:0c1a0c9222430be38b2cf3136fec3b8c5ecf343807ee0026ee95e50db3e1ffb2"
);

pub const DEFAULT_PLATFORM: &str = "github";

impl Renovate {
    pub fn run_spec(&self, project: &str, token: &Secret, platform: &str) -> ContainerSpec {
        self.base()
            .with_env_variable("RENOVATE_PLATFORM", platform)
            .with_secret_variable("RENOVATE_TOKEN", token)
            .with_env_variable("RENOVATE_AUTODISCOVER", "false")
            .with_env_variable("RENOVATE_REQUIRE_CONFIG", "optional")
            .with_env_variable("LOG_LEVEL", "debug")
            .with_exec(["renovate", project])
    }

    /// Run Renovate once against `project` (`owner/repo`).
    pub async fn run(
        &self,
        engine: &dyn ContainerEngine,
        project: &str,
        token: &Secret,
        platform: &str,
    ) -> EngineResult<String> {
        engine.stdout(&self.run_spec(project, token, platform)).await
    }
}

impl ToolImage for Renovate {
    fn name(&self) -> &'static str {
        "renovate"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
