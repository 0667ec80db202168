//! release-please, installed with npm.

use athame_engine::{ContainerSpec, HostDirectory, Secret};

use crate::node::Node;
use crate::ToolImage;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleasePlease {
    node: Node,
}

impl ReleasePlease {
    pub fn new(node: Node) -> Self {
        Self { node }
    }

    /// `manifest-pr` then `manifest-release` against `repo_url`, run in `source`.
    ///
    /// The token is passed by environment and expanded by the shell, so it
    /// never appears in an argument list.
    pub fn manifest(&self, source: &HostDirectory, token: &Secret, repo_url: &str) -> ContainerSpec {
        let run = |command: &str| {
            vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("release-please {command} --token=\"$GITHUB_TOKEN\" --repo-url=\"$REPO_URL\""),
            ]
        };
        self.node
            .with_source(source)
            .with_exec(["npm", "install", "-g", "release-please"])
            .with_secret_variable("GITHUB_TOKEN", token)
            .with_env_variable("REPO_URL", repo_url)
            .with_exec(run("manifest-pr"))
            .with_exec(run("manifest-release"))
    }
}

impl ToolImage for ReleasePlease {
    fn name(&self) -> &'static str {
        "release-please"
    }

    fn base(&self) -> ContainerSpec {
        self.node
            .base()
            .with_exec(["npm", "install", "-g", "release-please"])
    }
}
