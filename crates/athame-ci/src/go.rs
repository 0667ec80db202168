//! `go-ci`: lint and security-scan Go sources, then ship the binary as an image.

use std::sync::Arc;

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult, HostDirectory, HostFile};
use athame_tools::golangci_lint::GolangciLint;
use athame_tools::gosec::Gosec;
use tracing::{info, Instrument};

use crate::error::{CheckError, PipelineError, PipelineResult};
use crate::fanout::{run_checks, CheckTask, FanOutPolicy, TaskOutcome};
use crate::obs;
use crate::phase::{Phase, PipelineReport, PipelineRun};

const PIPELINE: &str = "go-ci";

pub const DEFAULT_GOLANG_IMAGE_TAG: &str =
    "1.25.3-alpine3.22@sha256:aee43c3ccbf24fdffb7295693b6e33b21e01baec1b2a55acc351fde345e9ec34";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoCiConfig {
    pub golang_image_tag: String,
    pub binary_name: String,
    pub image_name: String,
    /// Base of the shipped image.
    pub runtime_image: String,
    /// Anonymous registry the image is pushed to.
    pub registry: String,
    pub fan_out: FanOutPolicy,
}

impl Default for GoCiConfig {
    fn default() -> Self {
        Self {
            golang_image_tag: DEFAULT_GOLANG_IMAGE_TAG.to_string(),
            binary_name: "app".to_string(),
            image_name: "myapp".to_string(),
            runtime_image: "alpine:latest".to_string(),
            registry: "ttl.sh".to_string(),
            fan_out: FanOutPolicy::default(),
        }
    }
}

pub struct GoCi {
    engine: Arc<dyn ContainerEngine>,
    config: GoCiConfig,
}

impl GoCi {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: GoCiConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &GoCiConfig {
        &self.config
    }

    /// Go toolchain container.
    pub fn base(&self) -> ContainerSpec {
        ContainerSpec::from_image(format!("golang:{}", self.config.golang_image_tag))
            .without_entrypoint()
    }

    fn lint_spec(&self, source: &HostDirectory) -> ContainerSpec {
        GolangciLint::default().lint(source, &["./..."])
    }

    fn gosec_spec(&self, source: &HostDirectory) -> ContainerSpec {
        Gosec::default().scan(source)
    }

    pub async fn lint(&self, source: &HostDirectory) -> EngineResult<String> {
        self.engine.stdout(&self.lint_spec(source)).await
    }

    pub async fn gosec(&self, source: &HostDirectory) -> EngineResult<String> {
        self.engine.stdout(&self.gosec_spec(source)).await
    }

    /// golangci-lint and gosec, concurrently.
    pub async fn run_all_tests(
        &self,
        source: &HostDirectory,
    ) -> Result<Vec<TaskOutcome>, CheckError> {
        let tasks = vec![
            CheckTask::new("golangci-lint", self.lint_spec(source)),
            CheckTask::new("gosec", self.gosec_spec(source)),
        ];
        run_checks(Arc::clone(&self.engine), tasks, self.config.fan_out)
            .await
            .into_result()
    }

    /// Static binary built with `CGO_ENABLED=0`.
    pub async fn build_binary(&self, source: &HostDirectory) -> EngineResult<HostFile> {
        let binary = &self.config.binary_name;
        let builder = self
            .base()
            .with_directory("/src", source)
            .with_workdir("/src")
            .with_env_variable("CGO_ENABLED", "0")
            .with_exec(["go", "build", "-o", binary.as_str()]);
        self.engine
            .export_file(&builder, &format!("/src/{binary}"))
            .await
    }

    /// Runtime image running `binary` as its entrypoint.
    pub fn runtime_image(&self, binary: &HostFile) -> ContainerSpec {
        let path = format!("/bin/{}", self.config.binary_name);
        ContainerSpec::from_image(&self.config.runtime_image)
            .with_file(&path, binary)
            .with_entrypoint([path])
    }

    pub fn address(&self) -> String {
        format!("{}/{}:latest", self.config.registry, self.config.image_name)
    }

    /// Build the binary and publish its image. Returns the address with digest.
    pub async fn build(&self, source: &HostDirectory) -> PipelineResult<String> {
        let binary = self.build_binary(source).await.map_err(PipelineError::Build)?;
        self.publish(&binary).await
    }

    async fn publish(&self, binary: &HostFile) -> PipelineResult<String> {
        let address = self.address();
        self.engine
            .publish(&[self.runtime_image(binary)], &address, None)
            .await
            .map_err(|source| PipelineError::Publish {
                registry: self.config.registry.clone(),
                source,
            })
    }

    /// Run every check, then build and publish.
    pub async fn lint_and_build(&self, source: &HostDirectory) -> PipelineResult<PipelineReport> {
        let mut run = PipelineRun::start(PIPELINE);
        let span = obs::pipeline_span(PIPELINE, run.run_id());
        let result = async {
            run.phase(Phase::Verify, async {
                self.run_all_tests(source)
                    .await
                    .map_err(PipelineError::TestsFailed)
            })
            .await?;
            let binary = run
                .phase(Phase::Build, async {
                    self.build_binary(source).await.map_err(PipelineError::Build)
                })
                .await?;
            let address = run.phase(Phase::Publish, self.publish(&binary)).await?;
            info!(address = %address, "image published");
            run.set_address(&address);
            Ok(())
        }
        .instrument(span)
        .await;
        run.finish(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athame_engine::fakes::{CallKind, ScriptedEngine};
    use athame_engine::Op;

    fn source() -> (HostDirectory, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (HostDirectory::from_path(dir.path()).unwrap(), dir)
    }

    #[tokio::test]
    async fn build_ships_static_binary_to_ttl_sh() {
        let engine = ScriptedEngine::new().respond_when("go build", "ELF");
        let ci = GoCi::new(Arc::new(engine.clone()), GoCiConfig::default());
        let (src, _dir) = source();

        let addr = ci.build(&src).await.unwrap();
        assert!(addr.starts_with("ttl.sh/myapp:latest@sha256:"));

        let calls = engine.calls();
        assert_eq!(calls[0].kind, CallKind::ExportFile("/src/app".into()));
        assert_eq!(calls[0].command_line(), "go build -o app");
        assert!(calls[0].image.starts_with("golang:1.25.3-alpine3.22@sha256:"));

        let prod = calls[1].spec.as_ref().unwrap();
        assert_eq!(prod.image(), "alpine:latest");
        assert!(prod
            .ops()
            .iter()
            .any(|op| matches!(op, Op::Entrypoint(e) if e == &["/bin/app"])));
    }

    #[tokio::test]
    async fn lint_failure_stops_before_build() {
        let engine = ScriptedEngine::new().fail_when("golangci-lint", "main.go:3: unused");
        let ci = GoCi::new(Arc::new(engine.clone()), GoCiConfig::default());
        let (src, _dir) = source();

        let err = ci.lint_and_build(&src).await.unwrap_err();
        assert!(err.to_string().starts_with("tests failed: golangci-lint: "));
        assert_eq!(engine.calls().len(), 2);
        assert!(engine.publish_calls().is_empty());
    }

    #[tokio::test]
    async fn lint_and_build_reports_phases() {
        let engine = ScriptedEngine::new();
        let ci = GoCi::new(Arc::new(engine), GoCiConfig::default());
        let (src, _dir) = source();

        let report = ci.lint_and_build(&src).await.unwrap();
        assert_eq!(report.pipeline, "go-ci");
        assert_eq!(report.passed_count(), 3);
        assert!(report.phase(Phase::Scan).is_none());
    }
}
