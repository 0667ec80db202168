//! ORAS client for OCI artifacts.

use athame_engine::ContainerSpec;

use crate::ToolImage;

pinned_tool!(Oras, "ghcr.io/oras-project/oras", "v1.3.0@sha256:6ce045ce069a89934d6666b8b49f9c4c0145201bd6de6dbe2aee267814c55468");

impl ToolImage for Oras {
    fn name(&self) -> &'static str {
        "oras"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
