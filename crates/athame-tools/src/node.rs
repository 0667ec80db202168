//! Node.js image.

use athame_engine::{ContainerSpec, HostDirectory};

use crate::ToolImage;

pinned_tool!(
    Node,
    "node",
    "22.21.0-alpine3.22@sha256:bd26af08779f746650d95a2e4d653b0fd3c8030c44284b6b98d701c9b5eb66b9"
);

impl Node {
    /// Base container with `source` mounted at `/src` as the workdir.
    pub fn with_source(&self, source: &HostDirectory) -> ContainerSpec {
        self.base()
            .with_mounted_directory("/src", source)
            .with_workdir("/src")
    }
}

impl ToolImage for Node {
    fn name(&self) -> &'static str {
        "node"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
