//! `mkdocs-ci`: lint, build, publish and deploy an MkDocs Material site.

use std::sync::Arc;

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult, HostDirectory, Secret};
use athame_tools::lychee::Lychee;
use athame_tools::markdownlint::Markdownlint;
use athame_tools::mkdocs_material::MkdocsMaterial;
use athame_tools::prettier::Prettier;
use athame_tools::vale::Vale;
use tracing::{info, Instrument};

use crate::deploy::{deploy_all, DeployStrategy, DeployTarget};
use crate::error::{CheckError, PipelineError, PipelineResult};
use crate::fanout::{run_checks, CheckTask, FanOutPolicy, TaskOutcome};
use crate::notify::{notify_best_effort, notify_on_failure, Notification, Notifier};
use crate::obs;
use crate::phase::{Phase, PipelineReport, PipelineRun};
use crate::site_image::{default_ghcr_username, published_message, SiteImage};

const PIPELINE: &str = "mkdocs-ci";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkdocsCiConfig {
    /// Site directory relative to the source root.
    pub site_path: String,
    pub image_name: String,
    pub tag: String,
    pub ghcr_username: String,
    pub deploy_strategy: DeployStrategy,
    pub fan_out: FanOutPolicy,
}

impl Default for MkdocsCiConfig {
    fn default() -> Self {
        Self {
            site_path: "fixtures/mkdocs-material".to_string(),
            image_name: "mkdocs-demo".to_string(),
            tag: "latest".to_string(),
            ghcr_username: default_ghcr_username(),
            deploy_strategy: DeployStrategy::default(),
            fan_out: FanOutPolicy::default(),
        }
    }
}

impl MkdocsCiConfig {
    pub fn from_env() -> Self {
        Self::default()
    }
}

pub struct MkdocsCi {
    engine: Arc<dyn ContainerEngine>,
    notifier: Arc<dyn Notifier>,
    source: HostDirectory,
    config: MkdocsCiConfig,
}

impl MkdocsCi {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        notifier: Arc<dyn Notifier>,
        source: HostDirectory,
        config: MkdocsCiConfig,
    ) -> Self {
        Self {
            engine,
            notifier,
            source,
            config,
        }
    }

    pub fn config(&self) -> &MkdocsCiConfig {
        &self.config
    }

    pub fn site_dir(&self) -> HostDirectory {
        self.source.directory(&self.config.site_path)
    }

    pub fn site_image(&self) -> SiteImage {
        SiteImage::new(
            &self.config.image_name,
            &self.config.tag,
            &self.config.ghcr_username,
        )
    }

    /// vale, prettier, markdownlint-cli2 and lychee over the site's docs.
    pub fn checks(&self) -> Vec<CheckTask> {
        let site = self.site_dir();
        vec![
            CheckTask::new("vale", Vale::default().check(&site, "docs")),
            CheckTask::new("prettier", Prettier::default().check(&site, "docs/**/*.md")),
            CheckTask::new(
                "markdownlint",
                Markdownlint::default().check(&site, "docs/**/*.md"),
            ),
            CheckTask::new("lychee", Lychee::default().check(&site, "docs")),
        ]
    }

    /// Run every check concurrently; the first failure is returned once all finish.
    pub async fn run_all_tests(&self) -> Result<Vec<TaskOutcome>, CheckError> {
        run_checks(Arc::clone(&self.engine), self.checks(), self.config.fan_out)
            .await
            .into_result()
    }

    pub fn build_spec(&self) -> ContainerSpec {
        MkdocsMaterial::default().build(&self.site_dir())
    }

    /// Build the site.
    pub async fn build(&self) -> EngineResult<HostDirectory> {
        MkdocsMaterial::default()
            .build_site(self.engine.as_ref(), &self.site_dir())
            .await
    }

    async fn publish_site(&self, site: &HostDirectory, token: &Secret) -> PipelineResult<String> {
        let image = self.site_image();
        let variants = image.variants(site);
        image
            .publish(self.engine.as_ref(), &variants, token)
            .await
            .map_err(PipelineError::publish_ghcr)
    }

    /// Build the site and publish it to GHCR. Returns the address with digest.
    pub async fn publish(&self, token: &Secret) -> PipelineResult<String> {
        let site = self.build().await.map_err(PipelineError::Build)?;
        self.publish_site(&site, token).await
    }

    /// Verify, build, publish, then deploy to `targets`.
    pub async fn lint_build_publish(
        &self,
        token: &Secret,
        targets: &[Box<dyn DeployTarget>],
    ) -> PipelineResult<PipelineReport> {
        let mut run = PipelineRun::start(PIPELINE);
        let span = obs::pipeline_span(PIPELINE, run.run_id());
        let result = self
            .stages(&mut run, token, targets)
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
            Notification::started("MkDocs CI/CD Started", "Starting tests..."),
        )
        .await;

        let verified = run
            .phase(Phase::Verify, async {
                self.run_all_tests().await.map_err(PipelineError::TestsFailed)
            })
            .await;
        notify_on_failure(notifier, "Tests Failed", verified).await?;
        notify_best_effort(
            notifier,
            Notification::succeeded("Tests Completed", "Tests passed. Building site..."),
        )
        .await;

        let built = run
            .phase(Phase::Build, async {
                self.build().await.map_err(PipelineError::Build)
            })
            .await;
        let site = notify_on_failure(notifier, "Image Publishing Failed", built).await?;

        let published = run
            .phase(Phase::Publish, self.publish_site(&site, token))
            .await;
        let address = notify_on_failure(notifier, "Image Publishing Failed", published).await?;
        run.set_address(&address);
        info!(address = %address, "site image published");
        notify_best_effort(
            notifier,
            Notification::succeeded("Image Publishing Completed", published_message(&address))
                .with_markdown(),
        )
        .await;

        if targets.is_empty() {
            return Ok(());
        }
        run.phase(Phase::Deploy, async {
            deploy_all(targets, &address, self.config.deploy_strategy, notifier)
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

    fn pipeline(engine: &ScriptedEngine) -> (MkdocsCi, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("fixtures/mkdocs-material/docs")).unwrap();
        let source = HostDirectory::from_path(dir.path()).unwrap();
        let config = MkdocsCiConfig {
            ghcr_username: "staticaland".into(),
            ..Default::default()
        };
        let ci = MkdocsCi::new(
            Arc::new(engine.clone()),
            Arc::new(DisabledNotifier),
            source,
            config,
        );
        (ci, dir)
    }

    #[test]
    fn checks_target_the_site_dir() {
        let engine = ScriptedEngine::new();
        let (ci, _dir) = pipeline(&engine);
        let names: Vec<_> = ci.checks().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["vale", "prettier", "markdownlint", "lychee"]);
        assert!(ci.site_dir().path().ends_with("fixtures/mkdocs-material"));
    }

    #[tokio::test]
    async fn publish_builds_then_pushes_two_platforms() {
        let engine = ScriptedEngine::new();
        let (ci, _dir) = pipeline(&engine);

        let addr = ci
            .publish(&Secret::new("GHCR_TOKEN", "ghp_x"))
            .await
            .unwrap();

        assert!(addr.starts_with("ghcr.io/staticaland/athame/mkdocs-demo:latest@sha256:"));
        let calls = engine.calls();
        assert_eq!(calls[0].kind, CallKind::ExportDirectory("/docs/site".into()));
        assert_eq!(
            calls[1].kind,
            CallKind::Publish {
                address: "ghcr.io/staticaland/athame/mkdocs-demo:latest".into(),
                variants: 2
            }
        );
    }

    #[tokio::test]
    async fn publish_failure_is_wrapped() {
        let engine = ScriptedEngine::new().fail_publish("denied: permission_denied");
        let (ci, _dir) = pipeline(&engine);
        let err = ci
            .publish(&Secret::new("GHCR_TOKEN", "ghp_x"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("failed to publish to GHCR: "));
        assert!(msg.contains("permission_denied"));
    }

    #[tokio::test]
    async fn publish_reports_build_failure_as_build() {
        let engine = ScriptedEngine::new()
            .fail_when("mkdocs build", "Config file 'mkdocs.yml' does not exist.");
        let (ci, _dir) = pipeline(&engine);
        let err = ci
            .publish(&Secret::new("GHCR_TOKEN", "ghp_x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Build(_)));
        assert!(err.to_string().starts_with("build failed: "));
        assert!(engine.publish_calls().is_empty());
    }
}
