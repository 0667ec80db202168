//! crane, the go-containerregistry registry client.
//!
//! The image is distroless: every method is a single exec.

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult, HostFile, Secret};

use crate::ToolImage;

/// Where a registry auth file is mounted for authenticated calls.
pub const DOCKER_CONFIG_PATH: &str = "/root/.docker/config.json";
const EXPORT_PATH: &str = "/tmp/image.tar";

pinned_tool!(
    Crane,
    "gcr.io/go-containerregistry/crane",
    "v0.20.3@sha256:fc86bcad43a000c2a1ca926a1e167db26c053cebc3fa5d14285c72773fb8c11d"
);

impl Crane {
    fn authenticated(&self, auth: Option<&Secret>) -> ContainerSpec {
        match auth {
            Some(config) => self.base().with_mounted_secret(DOCKER_CONFIG_PATH, config),
            None => self.base(),
        }
    }

    async fn run(&self, engine: &dyn ContainerEngine, spec: ContainerSpec) -> EngineResult<String> {
        engine.stdout(&spec).await
    }

    /// Tags in a repository.
    pub async fn list(&self, engine: &dyn ContainerEngine, repository: &str) -> EngineResult<String> {
        self.run(engine, self.base().with_exec(["crane", "ls", repository]))
            .await
    }

    pub async fn digest(&self, engine: &dyn ContainerEngine, image: &str) -> EngineResult<String> {
        self.run(engine, self.base().with_exec(["crane", "digest", image]))
            .await
    }

    pub async fn manifest(&self, engine: &dyn ContainerEngine, image: &str) -> EngineResult<String> {
        self.run(engine, self.base().with_exec(["crane", "manifest", image]))
            .await
    }

    pub async fn config(&self, engine: &dyn ContainerEngine, image: &str) -> EngineResult<String> {
        self.run(engine, self.base().with_exec(["crane", "config", image]))
            .await
    }

    /// Check that a remote image exists and is well formed.
    pub async fn validate(&self, engine: &dyn ContainerEngine, image: &str) -> EngineResult<String> {
        self.run(
            engine,
            self.base().with_exec(["crane", "validate", "--remote", image]),
        )
        .await
    }

    /// Copy an image between registries. `auth` is a docker `config.json`.
    pub async fn copy(
        &self,
        engine: &dyn ContainerEngine,
        source: &str,
        destination: &str,
        auth: Option<&Secret>,
    ) -> EngineResult<String> {
        self.run(
            engine,
            self.authenticated(auth)
                .with_exec(["crane", "copy", source, destination]),
        )
        .await
    }

    /// Add `tag` to an existing remote image.
    pub async fn tag(
        &self,
        engine: &dyn ContainerEngine,
        image: &str,
        tag: &str,
        auth: Option<&Secret>,
    ) -> EngineResult<String> {
        self.run(
            engine,
            self.authenticated(auth).with_exec(["crane", "tag", image, tag]),
        )
        .await
    }

    /// Flattened filesystem of an image as a tarball.
    pub async fn export(&self, engine: &dyn ContainerEngine, image: &str) -> EngineResult<HostFile> {
        let spec = self
            .base()
            .with_exec(["crane", "export", image, EXPORT_PATH]);
        engine.export_file(&spec, EXPORT_PATH).await
    }
}

impl ToolImage for Crane {
    fn name(&self) -> &'static str {
        "crane"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
