//! `miele-ci`: build the Vite app, scan it, publish it and deploy it to Fly.io.

use std::sync::Arc;

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult, HostDirectory, Secret};
use athame_tools::node::Node;
use athame_tools::trivy::{ScanOptions, Trivy};
use athame_tools::ToolImage;
use tracing::{info, Instrument};

use crate::deploy::{deploy_all, DeployStrategy, DeployTarget, FlyioTarget};
use crate::error::{PipelineError, PipelineResult};
use crate::notify::{notify_best_effort, notify_on_failure, Notification, Notifier};
use crate::obs;
use crate::phase::{Phase, PipelineReport, PipelineRun};
use crate::site_image::{default_ghcr_username, SiteImage};

const PIPELINE: &str = "miele-ci";
const SCAN_TARGET: &str = "scan-target";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MieleCiConfig {
    pub image_name: String,
    pub tag: String,
    pub ghcr_username: String,
    pub scan: ScanOptions,
}

impl Default for MieleCiConfig {
    fn default() -> Self {
        Self {
            image_name: "miele".to_string(),
            tag: "latest".to_string(),
            ghcr_username: default_ghcr_username(),
            scan: ScanOptions::default(),
        }
    }
}

impl MieleCiConfig {
    pub fn from_env() -> Self {
        Self::default()
    }
}

pub struct MieleCi {
    engine: Arc<dyn ContainerEngine>,
    notifier: Arc<dyn Notifier>,
    /// The application root (`package.json` lives here).
    source: HostDirectory,
    config: MieleCiConfig,
}

impl MieleCi {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        notifier: Arc<dyn Notifier>,
        source: HostDirectory,
        config: MieleCiConfig,
    ) -> Self {
        Self {
            engine,
            notifier,
            source,
            config,
        }
    }

    pub fn site_image(&self) -> SiteImage {
        SiteImage::new(
            &self.config.image_name,
            &self.config.tag,
            &self.config.ghcr_username,
        )
    }

    /// Install dependencies from the lockfile, then `npm run build`.
    pub fn build_spec(&self) -> ContainerSpec {
        Node::default()
            .base()
            .with_workdir("/app")
            .with_env_variable("NODE_ENV", "production")
            .with_file("/app/package-lock.json", &self.source.file("package-lock.json"))
            .with_file("/app/package.json", &self.source.file("package.json"))
            .with_exec(["npm", "ci", "--include=dev"])
            .with_directory("/app", &self.source)
            .with_exec(["npm", "run", "build"])
    }

    /// The built `dist` directory.
    pub async fn build(&self) -> EngineResult<HostDirectory> {
        self.engine
            .export_directory(&self.build_spec(), "/app/dist")
            .await
    }

    /// Trivy scan of the first variant, with notifications.
    async fn scan(&self, variants: &[ContainerSpec]) -> PipelineResult<String> {
        let notifier = self.notifier.as_ref();
        notify_best_effort(
            notifier,
            Notification::started(
                "Trivy Security Scan Started",
                "Scanning container for vulnerabilities...",
            )
            .with_tags("shield"),
        )
        .await;

        let Some(target) = variants.first() else {
            return Ok(String::new());
        };
        let scanned = Trivy::default()
            .scan_container(self.engine.as_ref(), target, SCAN_TARGET, &self.config.scan)
            .await
            .map_err(PipelineError::Scan);
        let report = notify_on_failure(notifier, "Trivy Security Scan Failed", scanned).await?;
        info!("Trivy scan results:\n{report}");

        notify_best_effort(
            notifier,
            Notification::succeeded(
                "Trivy Security Scan Completed",
                "Security scan completed successfully.",
            ),
        )
        .await;
        Ok(report)
    }

    async fn push(&self, variants: &[ContainerSpec], token: &Secret) -> PipelineResult<String> {
        self.site_image()
            .publish(self.engine.as_ref(), variants, token)
            .await
            .map_err(PipelineError::publish_ghcr)
    }

    /// Build, scan, then publish to GHCR. Returns the address with digest.
    pub async fn publish(&self, token: &Secret) -> PipelineResult<String> {
        let dist = self.build().await.map_err(PipelineError::Build)?;
        let variants = self.site_image().variants(&dist);
        self.scan(&variants).await?;
        self.push(&variants, token).await
    }

    /// Publish, then deploy to Fly.io.
    pub async fn deploy(
        &self,
        token: &Secret,
        flyio: FlyioTarget,
    ) -> PipelineResult<PipelineReport> {
        let mut run = PipelineRun::start(PIPELINE);
        let span = obs::pipeline_span(PIPELINE, run.run_id());
        let targets: Vec<Box<dyn DeployTarget>> = vec![Box::new(flyio)];
        let result = self
            .stages(&mut run, token, &targets)
            .instrument(span)
            .await;
        run.finish(result)
    }

    async fn stages(
        &self,
        run: &mut PipelineRun,
        token: &Secret,
        targets: &[Box<dyn DeployTarget>],
    ) -> PipelineResult<()> {
        let notifier = self.notifier.as_ref();
        notify_best_effort(
            notifier,
            Notification::started("Miele CI/CD Started", "Starting build..."),
        )
        .await;

        let built = run
            .phase(Phase::Build, async {
                self.build().await.map_err(PipelineError::Build)
            })
            .await;
        let dist = notify_on_failure(notifier, "Image Publishing Failed", built).await?;
        let variants = self.site_image().variants(&dist);

        let scanned = run.phase(Phase::Scan, self.scan(&variants)).await;
        notify_on_failure(notifier, "Image Publishing Failed", scanned).await?;

        let published = run.phase(Phase::Publish, self.push(&variants, token)).await;
        let address = notify_on_failure(notifier, "Image Publishing Failed", published).await?;
        run.set_address(&address);
        notify_best_effort(
            notifier,
            Notification::succeeded(
                "Image Publishing Completed",
                format!("Published to GHCR.\n\n**Image:**\n```\n{address}\n```"),
            )
            .with_markdown(),
        )
        .await;

        run.phase(Phase::Deploy, async {
            deploy_all(targets, &address, DeployStrategy::Sequential, notifier)
                .await
                .map(|_| ())
                .map_err(|source| PipelineError::Deploy {
                    address: address.clone(),
                    source,
                })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::DisabledNotifier;
    use athame_engine::fakes::{CallKind, ScriptedEngine};

    fn app() -> (HostDirectory, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        (HostDirectory::from_path(dir.path()).unwrap(), dir)
    }

    fn pipeline(engine: &ScriptedEngine, source: HostDirectory) -> MieleCi {
        let config = MieleCiConfig {
            ghcr_username: "staticaland".into(),
            ..Default::default()
        };
        MieleCi::new(
            Arc::new(engine.clone()),
            Arc::new(DisabledNotifier),
            source,
            config,
        )
    }

    #[test]
    fn build_installs_before_copying_sources() {
        let engine = ScriptedEngine::new();
        let (src, _dir) = app();
        let spec = pipeline(&engine, src).build_spec();
        assert_eq!(spec.workdir(), Some("/app"));
        let execs: Vec<String> = spec.execs().iter().map(|e| e.join(" ")).collect();
        assert_eq!(execs, ["npm ci --include=dev", "npm run build"]);
    }

    #[tokio::test]
    async fn publish_scans_first_variant_before_pushing() {
        let engine = ScriptedEngine::new().respond_when("trivy image", "Total: 0");
        let (src, _dir) = app();
        let addr = pipeline(&engine, src)
            .publish(&Secret::new("GHCR_TOKEN", "t"))
            .await
            .unwrap();
        assert!(addr.starts_with("ghcr.io/staticaland/athame/miele:latest@"));

        let kinds: Vec<CallKind> = engine.calls().into_iter().map(|c| c.kind).collect();
        assert_eq!(kinds[0], CallKind::ExportDirectory("/app/dist".into()));
        assert_eq!(kinds[1], CallKind::ExportTarball);
        assert_eq!(kinds[2], CallKind::Stdout);
        assert!(matches!(kinds[3], CallKind::Publish { variants: 2, .. }));
    }

    #[tokio::test]
    async fn scan_failure_blocks_publishing() {
        let engine = ScriptedEngine::new().fail_when("trivy image", "FATAL: db download failed");
        let (src, _dir) = app();
        let err = pipeline(&engine, src)
            .publish(&Secret::new("GHCR_TOKEN", "t"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("trivy scan failed: "));
        assert!(engine.publish_calls().is_empty());
    }

    #[tokio::test]
    async fn publish_reports_build_failure_as_build() {
        let engine = ScriptedEngine::new().fail_when("npm run build", "vite: not found");
        let (src, _dir) = app();
        let err = pipeline(&engine, src)
            .publish(&Secret::new("GHCR_TOKEN", "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Build(_)));
        assert!(err.to_string().starts_with("build failed: "));
        assert!(engine.calls_matching("trivy").is_empty());
        assert!(engine.publish_calls().is_empty());
    }

    #[tokio::test]
    async fn deploy_runs_all_phases() {
        let engine = ScriptedEngine::new();
        let (src, _dir) = app();
        let ci = pipeline(&engine, src);
        let fly = FlyioTarget::new(
            Arc::new(engine.clone()),
            "miele",
            Secret::new("FLY_API_TOKEN", "t"),
        );

        let report = ci.deploy(&Secret::new("GHCR_TOKEN", "t"), fly).await.unwrap();
        let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
        assert_eq!(
            phases,
            [Phase::Build, Phase::Scan, Phase::Publish, Phase::Deploy]
        );
        assert_eq!(engine.calls_matching("flyctl deploy").len(), 1);
    }
}
