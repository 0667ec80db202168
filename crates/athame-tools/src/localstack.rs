//! LocalStack AWS emulator, run as a service.

use athame_engine::{ContainerSpec, ServiceSpec};

use crate::ToolImage;

/// Alias LocalStack is reachable under when bound to a container.
pub const LOCALSTACK_ALIAS: &str = "localstack";
/// Edge port.
pub const LOCALSTACK_PORT: u16 = 4566;

pinned_tool!(
    Localstack,
    "localstack/localstack",
    "4.10.0@sha256:a65ee2a9d45a7a34a1f1faae515d2e577ce11210312c077700ccc82daefec238"
);

impl Localstack {
    /// LocalStack as a background service exposing the edge port.
    pub fn run(&self) -> ServiceSpec {
        self.base()
            .with_exposed_port(LOCALSTACK_PORT)
            .as_service(["docker-entrypoint.sh"])
    }
}

impl ToolImage for Localstack {
    fn name(&self) -> &'static str {
        "localstack"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
