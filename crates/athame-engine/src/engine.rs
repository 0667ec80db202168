//! The container engine contract.

use async_trait::async_trait;

use crate::artifact::{HostDirectory, HostFile};
use crate::container::ContainerSpec;
use crate::error::EngineResult;
use crate::secret::Secret;

/// Credentials for pushing to a registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    /// Registry host, e.g. `ghcr.io`.
    pub registry: String,
    pub username: String,
    pub secret: Secret,
}

impl RegistryAuth {
    pub fn new(registry: impl Into<String>, username: impl Into<String>, secret: &Secret) -> Self {
        Self {
            registry: registry.into(),
            username: username.into(),
            secret: secret.clone(),
        }
    }
}

/// Runs [`ContainerSpec`]s.
///
/// Implementations are opaque collaborators: pull the image, apply the
/// operations in order, then produce stdout or an artifact. Any non-zero exit
/// is an error carrying the command's output verbatim.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Run every exec in order and return the stdout of the last one.
    async fn stdout(&self, spec: &ContainerSpec) -> EngineResult<String>;

    /// Run the spec, then copy `path` (a directory) out of the container.
    async fn export_directory(&self, spec: &ContainerSpec, path: &str)
        -> EngineResult<HostDirectory>;

    /// Run the spec, then copy `path` (a file) out of the container.
    async fn export_file(&self, spec: &ContainerSpec, path: &str) -> EngineResult<HostFile>;

    /// Run the spec and save the resulting container as an image tarball.
    async fn export_tarball(&self, spec: &ContainerSpec) -> EngineResult<HostFile>;

    /// Snapshot one container per platform variant and push them to
    /// `address` as a single (multi-platform) image.
    ///
    /// Returns the published reference including its digest.
    async fn publish(
        &self,
        variants: &[ContainerSpec],
        address: &str,
        auth: Option<&RegistryAuth>,
    ) -> EngineResult<String>;
}
