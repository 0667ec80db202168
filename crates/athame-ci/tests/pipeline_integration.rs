//! End-to-end pipeline runs against the scripted engine and mock HTTP services.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use athame_ci::notify::NtfyNotifier;
use athame_ci::{
    CloudRunTarget, DeployStrategy, DeployTarget, FlyioTarget, MkdocsCi, MkdocsCiConfig,
    Notification, Notifier, NotifyError, Phase, PipelineError, RenderTarget,
};
use athame_engine::fakes::{ScriptedEngine, FAKE_DIGEST};
use athame_engine::{HostDirectory, Secret};
use athame_tools::ntfy::NtfyConfig;
use httpmock::prelude::*;

/// Keeps every notification it is handed.
#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct Fixture {
    engine: ScriptedEngine,
    _dir: tempfile::TempDir,
    source: HostDirectory,
}

impl Fixture {
    fn new(engine: ScriptedEngine) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("fixtures/mkdocs-material/docs")).unwrap();
        let source = HostDirectory::from_path(dir.path()).unwrap();
        Self {
            engine,
            _dir: dir,
            source,
        }
    }

    fn pipeline(&self, notifier: Arc<dyn Notifier>, strategy: DeployStrategy) -> MkdocsCi {
        let config = MkdocsCiConfig {
            ghcr_username: "staticaland".into(),
            deploy_strategy: strategy,
            ..Default::default()
        };
        MkdocsCi::new(
            Arc::new(self.engine.clone()),
            notifier,
            self.source.clone(),
            config,
        )
    }

    fn flyio(&self) -> Box<dyn DeployTarget> {
        Box::new(FlyioTarget::new(
            Arc::new(self.engine.clone()),
            "athame-docs",
            Secret::new("FLY_API_TOKEN", "fo1_test"),
        ))
    }

    fn cloud_run(&self) -> Box<dyn DeployTarget> {
        Box::new(CloudRunTarget::new(
            Arc::new(self.engine.clone()),
            "docs",
            "my-project",
            Secret::new("GCLOUD_SERVICE_ACCOUNT_KEY", "{}"),
        ))
    }
}

fn ghcr_token() -> Secret {
    Secret::new("GHCR_TOKEN", "ghp_test")
}

fn published_address() -> String {
    format!("ghcr.io/staticaland/athame/mkdocs-demo:latest@{FAKE_DIGEST}")
}

#[tokio::test]
async fn failing_check_stops_before_publish() {
    let fixture = Fixture::new(
        ScriptedEngine::new()
            .fail_when("vale", "docs/index.md:4:1: Vale.Spelling 'mkdcos'")
            .with_delay("lychee", Duration::from_millis(40)),
    );
    let notifier = RecordingNotifier::default();
    let ci = fixture.pipeline(Arc::new(notifier.clone()), DeployStrategy::Concurrent);

    let err = ci
        .lint_build_publish(&ghcr_token(), &[fixture.flyio()])
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::TestsFailed(_)));
    let msg = err.to_string();
    assert!(msg.starts_with("tests failed: vale: "), "{msg}");
    assert!(msg.contains("Vale.Spelling"));

    // Every check ran to completion, nothing was built or published.
    assert_eq!(fixture.engine.calls().len(), 4);
    assert_eq!(fixture.engine.calls_matching("lychee").len(), 1);
    assert!(fixture.engine.publish_calls().is_empty());
    assert!(fixture.engine.calls_matching("flyctl").is_empty());

    assert_eq!(notifier.titles(), ["MkDocs CI/CD Started", "Tests Failed"]);
}

#[tokio::test]
async fn phases_run_in_order_with_notifications() {
    let fixture = Fixture::new(ScriptedEngine::new());
    let notifier = RecordingNotifier::default();
    let ci = fixture.pipeline(Arc::new(notifier.clone()), DeployStrategy::Sequential);

    let report = ci
        .lint_build_publish(&ghcr_token(), &[fixture.flyio()])
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.pipeline, "mkdocs-ci");
    assert_eq!(report.address.as_deref(), Some(published_address().as_str()));
    let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
    assert_eq!(
        phases,
        [Phase::Verify, Phase::Build, Phase::Publish, Phase::Deploy]
    );
    assert_eq!(report.failed_count(), 0);

    assert_eq!(
        notifier.titles(),
        [
            "MkDocs CI/CD Started",
            "Tests Completed",
            "Image Publishing Completed",
            "Fly.io Deploy Completed",
        ]
    );
    let sent = notifier.sent.lock().unwrap();
    assert!(sent[2].markdown);
    assert!(sent[2].message.contains("docker run -p 8080:80 ghcr.io/staticaland/"));
    assert_eq!(
        sent[3].actions.as_deref(),
        Some("view, View Site, https://athame-docs.fly.dev")
    );
}

#[tokio::test]
async fn notification_failures_do_not_change_the_outcome() {
    let server = MockServer::start_async().await;
    let ntfy = server
        .mock_async(|when, then| {
            when.method(POST).path("/athame");
            then.status(500);
        })
        .await;

    let fixture = Fixture::new(ScriptedEngine::new());
    let notifier = NtfyNotifier::new(NtfyConfig::new(&server.base_url(), "athame")).unwrap();
    let ci = fixture.pipeline(Arc::new(notifier), DeployStrategy::Concurrent);

    let report = ci.lint_build_publish(&ghcr_token(), &[]).await.unwrap();

    assert!(report.success);
    assert!(report.phase(Phase::Deploy).is_none());
    // Started, Tests Completed, Image Publishing Completed.
    ntfy.assert_hits_async(3).await;
}

#[tokio::test]
async fn concurrent_deploy_attempts_every_target() {
    let fixture = Fixture::new(
        ScriptedEngine::new().fail_when("flyctl deploy", "Error: app not found"),
    );
    let notifier = RecordingNotifier::default();
    let ci = fixture.pipeline(Arc::new(notifier.clone()), DeployStrategy::Concurrent);

    let err = ci
        .lint_build_publish(&ghcr_token(), &[fixture.flyio(), fixture.cloud_run()])
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("fly.io deploy failed: "));
    assert_eq!(err.published_address(), Some(published_address().as_str()));
    assert_eq!(fixture.engine.calls_matching("gcloud run deploy").len(), 1);

    let titles = notifier.titles();
    assert!(titles.contains(&"Fly.io Deploy Failed".to_string()));
    assert!(titles.contains(&"Google Cloud Run Deploy Completed".to_string()));
}

#[tokio::test]
async fn sequential_deploy_stops_at_first_failure() {
    let fixture = Fixture::new(
        ScriptedEngine::new().fail_when("flyctl deploy", "Error: app not found"),
    );
    let ci = fixture.pipeline(Arc::new(RecordingNotifier::default()), DeployStrategy::Sequential);

    let err = ci
        .lint_build_publish(&ghcr_token(), &[fixture.flyio(), fixture.cloud_run()])
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Deploy { .. }));
    assert!(fixture.engine.calls_matching("gcloud run deploy").is_empty());
}

#[tokio::test]
async fn failed_publish_deploys_nothing() {
    let fixture = Fixture::new(ScriptedEngine::new().fail_publish("denied"));
    let notifier = RecordingNotifier::default();
    let ci = fixture.pipeline(Arc::new(notifier.clone()), DeployStrategy::Concurrent);

    let err = ci
        .lint_build_publish(&ghcr_token(), &[fixture.flyio()])
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Publish { .. }));
    assert!(err.to_string().starts_with("failed to publish to GHCR: "));
    assert_eq!(err.published_address(), None);
    assert!(fixture.engine.calls_matching("flyctl").is_empty());
    assert_eq!(
        notifier.titles(),
        [
            "MkDocs CI/CD Started",
            "Tests Completed",
            "Image Publishing Failed"
        ]
    );
}

#[tokio::test]
async fn render_receives_the_published_address() {
    let server = MockServer::start_async().await;
    let address = published_address();
    let hook = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/deploy/srv-docs")
                .query_param("key", "k3y")
                .query_param("imgURL", address.as_str());
            then.status(202);
        })
        .await;

    let fixture = Fixture::new(ScriptedEngine::new());
    let render = RenderTarget::new(
        Secret::new("RENDER_DEPLOY_HOOK_URL", server.url("/deploy/srv-docs?key=k3y")),
        "mkdocs-demo",
    )
    .unwrap()
    .pin_image(true);
    let notifier = RecordingNotifier::default();
    let ci = fixture.pipeline(Arc::new(notifier.clone()), DeployStrategy::Concurrent);

    let targets: Vec<Box<dyn DeployTarget>> = vec![Box::new(render), fixture.flyio()];
    ci.lint_build_publish(&ghcr_token(), &targets).await.unwrap();

    hook.assert_async().await;
    let fly = &fixture.engine.calls_matching("flyctl deploy")[0];
    let fly_toml = fly.spec.as_ref().unwrap().new_file("/fly.toml").unwrap();
    assert!(fly_toml.contains(&address));
    assert!(notifier
        .titles()
        .contains(&"Render Deploy Completed".to_string()));
}
