//! gosec security scanner for Go.

use athame_engine::{ContainerSpec, HostDirectory};

use crate::ToolImage;

pinned_tool!(
    Gosec,
    "securego/gosec",
    "2.22.10@sha256:c8852d609f9af551387555a81808a3bca8d172629b124fab0d83c937cabc2f3d"
);

impl Gosec {
    /// `gosec ./...` with `source` mounted at `/src`.
    pub fn scan(&self, source: &HostDirectory) -> ContainerSpec {
        self.base()
            .with_mounted_directory("/src", source)
            .with_workdir("/src")
            .with_exec(["gosec", "./..."])
    }
}

impl ToolImage for Gosec {
    fn name(&self) -> &'static str {
        "gosec"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
