//! GitHub CLI, installed through asdf.

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult, Secret};

use crate::asdf::Asdf;
use crate::ToolImage;

pub const DEFAULT_VERSION: &str = "2.71.0";
const PLUGIN_URL: &str = "https://github.com/bartlomiejdanek/asdf-github-cli.git";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubCli {
    version: String,
    asdf: Asdf,
}

impl GithubCli {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            asdf: Asdf::default(),
        }
    }

    /// Base container authenticated through `GITHUB_TOKEN`.
    pub fn with_token(&self, token: &Secret) -> ContainerSpec {
        self.base().with_secret_variable("GITHUB_TOKEN", token)
    }

    /// `gh repo list --limit <limit>`.
    pub async fn list_repos(
        &self,
        engine: &dyn ContainerEngine,
        token: &Secret,
        limit: u32,
    ) -> EngineResult<String> {
        let spec = self
            .with_token(token)
            .with_exec(["gh".to_string(), "repo".into(), "list".into(), "--limit".into(), limit.to_string()]);
        engine.stdout(&spec).await
    }
}

impl Default for GithubCli {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION)
    }
}

impl ToolImage for GithubCli {
    fn name(&self) -> &'static str {
        "github-cli"
    }

    fn base(&self) -> ContainerSpec {
        self.asdf.install_plugin("github-cli", PLUGIN_URL, &self.version)
    }
}
