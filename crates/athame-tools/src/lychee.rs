//! Lychee link checker.

use athame_engine::{ContainerSpec, HostDirectory};

use crate::ToolImage;

pinned_tool!(
    Lychee,
    "lycheeverse/lychee",
    "0.15.1-alpine@sha256:214ed75d61117c5dc39310b9da73bb9fae5333f6f6eb6891e861e79cda780268"
);

impl Lychee {
    /// `lychee <path>` with `source` mounted at `/src`.
    pub fn check(&self, source: &HostDirectory, path: &str) -> ContainerSpec {
        self.base()
            .with_mounted_directory("/src", source)
            .with_workdir("/src")
            .with_exec(["lychee", path])
    }
}

impl ToolImage for Lychee {
    fn name(&self) -> &'static str {
        "lychee"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
