//! markdownlint-cli2.

use athame_engine::{ContainerSpec, HostDirectory};

use crate::ToolImage;

pinned_tool!(
    Markdownlint,
    "davidanson/markdownlint-cli2",
    "v0.18.1@sha256:173cb697a255a8a985f2c6a83b4f7a8b3c98f4fb382c71c45f1c52e4d4fed63a"
);

impl Markdownlint {
    /// `markdownlint-cli2 <pattern>` with `source` mounted at `/src`.
    pub fn check(&self, source: &HostDirectory, pattern: &str) -> ContainerSpec {
        self.base()
            .with_mounted_directory("/src", source)
            .with_workdir("/src")
            .with_exec(["markdownlint-cli2", pattern])
    }
}

impl ToolImage for Markdownlint {
    fn name(&self) -> &'static str {
        "markdownlint"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
