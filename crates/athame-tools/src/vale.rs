//! Vale prose linter.

use athame_engine::{ContainerSpec, HostDirectory};

use crate::ToolImage;

pinned_tool!(
    Vale,
    "jdkato/vale",
    "v3.12.0@sha256:d5e8108bfd238192a82f303349b95ce39f605354843bc94811e24da1fe8f8ee0"
);

impl Vale {
    /// `vale <path>` with `source` mounted at `/src`.
    pub fn check(&self, source: &HostDirectory, path: &str) -> ContainerSpec {
        self.base()
            .with_mounted_directory("/src", source)
            .with_workdir("/src")
            .with_exec(["vale", path])
    }
}

impl ToolImage for Vale {
    fn name(&self) -> &'static str {
        "vale"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
