//! In-process [`ContainerEngine`] for tests.
//!
//! Records every call and answers from rules matched against the joined
//! command line of the spec's last exec.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::artifact::{HostDirectory, HostFile};
use crate::container::ContainerSpec;
use crate::engine::{ContainerEngine, RegistryAuth};
use crate::error::{EngineError, EngineResult};

/// What the engine was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Stdout,
    ExportDirectory(String),
    ExportFile(String),
    ExportTarball,
    Publish { address: String, variants: usize },
}

/// One recorded engine call.
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub kind: CallKind,
    pub image: String,
    pub execs: Vec<Vec<String>>,
    pub spec: Option<ContainerSpec>,
}

impl EngineCall {
    /// Last exec joined with spaces.
    pub fn command_line(&self) -> String {
        self.execs.last().map(|e| e.join(" ")).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
enum Reaction {
    Fail { exit_code: i32, stderr: String },
    Respond(String),
    Delay(Duration),
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    reaction: Reaction,
}

/// Deterministic fake engine.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    rules: Arc<Mutex<Vec<Rule>>>,
    calls: Arc<Mutex<Vec<EngineCall>>>,
    publish_error: Arc<Mutex<Option<String>>>,
}

/// Digest reported for every publish.
pub const FAKE_DIGEST: &str =
    "sha256:0f3e5b1c2d4a69788796a5b4c3d2e1f00112233445566778899aabbccddeeff0";

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_rule(self, needle: &str, reaction: Reaction) -> Self {
        self.rules
            .lock()
            .expect("rules lock")
            .push(Rule {
                needle: needle.to_string(),
                reaction,
            });
        self
    }

    /// Fail any exec whose command line contains `needle`.
    pub fn fail_when(self, needle: &str, stderr: &str) -> Self {
        self.add_rule(
            needle,
            Reaction::Fail {
                exit_code: 1,
                stderr: stderr.to_string(),
            },
        )
    }

    /// Answer `stdout` for any exec whose command line contains `needle`.
    pub fn respond_when(self, needle: &str, stdout: &str) -> Self {
        self.add_rule(needle, Reaction::Respond(stdout.to_string()))
    }

    /// Sleep before answering matching execs.
    pub fn with_delay(self, needle: &str, delay: Duration) -> Self {
        self.add_rule(needle, Reaction::Delay(delay))
    }

    /// Make every publish fail.
    pub fn fail_publish(self, reason: &str) -> Self {
        *self.publish_error.lock().expect("publish lock") = Some(reason.to_string());
        self
    }

    /// Calls recorded so far, in completion order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Recorded calls whose last exec contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.command_line().contains(needle))
            .collect()
    }

    pub fn publish_calls(&self) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c.kind, CallKind::Publish { .. }))
            .collect()
    }

    fn record(&self, kind: CallKind, spec: &ContainerSpec) {
        self.calls.lock().expect("calls lock").push(EngineCall {
            kind,
            image: spec.image().to_string(),
            execs: spec.execs().into_iter().map(|e| e.to_vec()).collect(),
            spec: Some(spec.clone()),
        });
    }

    async fn evaluate(&self, kind: CallKind, spec: &ContainerSpec) -> EngineResult<String> {
        let line = spec.last_exec().map(|e| e.join(" ")).unwrap_or_default();
        let matching: Vec<Reaction> = self
            .rules
            .lock()
            .expect("rules lock")
            .iter()
            .filter(|r| line.contains(&r.needle))
            .map(|r| r.reaction.clone())
            .collect();

        let mut stdout = String::new();
        let mut failure = None;
        for reaction in matching {
            match reaction {
                Reaction::Delay(d) => tokio::time::sleep(d).await,
                Reaction::Respond(s) => stdout = s,
                Reaction::Fail { exit_code, stderr } => {
                    failure.get_or_insert((exit_code, stderr));
                }
            }
        }

        self.record(kind, spec);

        if let Some((exit_code, stderr)) = failure {
            return Err(EngineError::ExecFailed {
                command: spec.last_exec().map(|e| e.to_vec()).unwrap_or_default(),
                exit_code,
                stdout: String::new(),
                stderr,
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ContainerEngine for ScriptedEngine {
    async fn stdout(&self, spec: &ContainerSpec) -> EngineResult<String> {
        self.evaluate(CallKind::Stdout, spec).await
    }

    async fn export_directory(
        &self,
        spec: &ContainerSpec,
        path: &str,
    ) -> EngineResult<HostDirectory> {
        self.evaluate(CallKind::ExportDirectory(path.to_string()), spec)
            .await?;
        Ok(HostDirectory::from_temp(tempfile::tempdir()?))
    }

    async fn export_file(&self, spec: &ContainerSpec, path: &str) -> EngineResult<HostFile> {
        let stdout = self
            .evaluate(CallKind::ExportFile(path.to_string()), spec)
            .await?;
        let name = path.rsplit('/').next().unwrap_or("file").to_string();
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(&name), stdout)?;
        Ok(HostFile::in_temp(dir, name))
    }

    async fn export_tarball(&self, spec: &ContainerSpec) -> EngineResult<HostFile> {
        self.evaluate(CallKind::ExportTarball, spec).await?;
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("image.tar"), b"")?;
        Ok(HostFile::in_temp(dir, "image.tar"))
    }

    async fn publish(
        &self,
        variants: &[ContainerSpec],
        address: &str,
        _auth: Option<&RegistryAuth>,
    ) -> EngineResult<String> {
        let kind = CallKind::Publish {
            address: address.to_string(),
            variants: variants.len(),
        };
        match variants.first() {
            Some(first) => self.record(kind, first),
            None => self.calls.lock().expect("calls lock").push(EngineCall {
                kind,
                image: String::new(),
                execs: Vec::new(),
                spec: None,
            }),
        }

        if let Some(reason) = self.publish_error.lock().expect("publish lock").clone() {
            return Err(EngineError::Publish {
                address: address.to_string(),
                reason,
            });
        }
        Ok(format!("{address}@{FAKE_DIGEST}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rules_match_last_exec() {
        let engine = ScriptedEngine::new()
            .respond_when("gcloud run services describe", "https://svc-abc.run.app\n")
            .fail_when("vale", "docs/index.md:1:1 error");

        let ok = ContainerSpec::from_image("gcloud")
            .with_exec(["gcloud", "run", "services", "describe", "svc"]);
        assert_eq!(engine.stdout(&ok).await.unwrap(), "https://svc-abc.run.app\n");

        let bad = ContainerSpec::from_image("vale").with_exec(["vale", "docs"]);
        let err = engine.stdout(&bad).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn publish_returns_address_with_digest() {
        let engine = ScriptedEngine::new();
        let spec = ContainerSpec::from_image("nginx");
        let addr = engine
            .publish(&[spec.clone(), spec], "ghcr.io/o/site:1", None)
            .await
            .unwrap();
        assert_eq!(addr, format!("ghcr.io/o/site:1@{FAKE_DIGEST}"));
        assert_eq!(
            engine.publish_calls()[0].kind,
            CallKind::Publish {
                address: "ghcr.io/o/site:1".into(),
                variants: 2
            }
        );
    }

    #[tokio::test]
    async fn publish_failure_is_scripted() {
        let engine = ScriptedEngine::new().fail_publish("denied");
        let err = engine
            .publish(&[ContainerSpec::from_image("nginx")], "ghcr.io/o/site:1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Publish { .. }));
    }
}
