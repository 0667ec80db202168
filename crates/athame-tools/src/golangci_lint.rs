//! golangci-lint.

use athame_engine::{ContainerSpec, HostDirectory};

use crate::ToolImage;

pinned_tool!(
    GolangciLint,
    "golangci/golangci-lint",
    "v2.6.0-alpine@sha256:1e8c410818ea9f1f4176b89dd2d95776f07184a7d4a8bf88d25e553b04c1995a"
);

impl GolangciLint {
    /// `golangci-lint run <packages...>` with `source` mounted at `/src`.
    ///
    /// No packages lints the current module only.
    pub fn lint(&self, source: &HostDirectory, packages: &[&str]) -> ContainerSpec {
        let mut args = vec!["golangci-lint", "run"];
        args.extend_from_slice(packages);
        self.base()
            .with_mounted_directory("/src", source)
            .with_workdir("/src")
            .with_exec(args)
    }
}

impl ToolImage for GolangciLint {
    fn name(&self) -> &'static str {
        "golangci-lint"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
