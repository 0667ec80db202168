//! Prettier, installed globally on a Node image.

use athame_engine::{ContainerSpec, HostDirectory};

use crate::ToolImage;

pinned_tool!(
    Prettier,
    "node",
    "22.21.1-alpine3.22@sha256:b2358485e3e33bc3a33114d2b1bdb18cdbe4df01bd2b257198eb51beb1f026c5"
);

impl Prettier {
    /// `prettier --check <pattern>` with `source` mounted at `/src`.
    pub fn check(&self, source: &HostDirectory, pattern: &str) -> ContainerSpec {
        self.base()
            .with_mounted_directory("/src", source)
            .with_workdir("/src")
            .with_exec(["prettier", "--check", pattern])
    }
}

impl ToolImage for Prettier {
    fn name(&self) -> &'static str {
        "prettier"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
            .with_exec(["npm", "install", "-g", "prettier"])
    }
}
