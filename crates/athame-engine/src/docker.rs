//! [`ContainerEngine`] backed by the `docker` CLI.
//!
//! A spec is turned into a [`Plan`]: options fixed at container creation
//! (mounts, secret variables, network) and an ordered list of steps.
//!
//! - Specs with at most one exec and no copy steps run single-shot:
//!   `docker create` + `docker start -a`.
//! - Everything else starts a keep-alive container (`sleep infinity`) and is
//!   driven with `docker exec` / `docker cp`. Such images need `sleep`.
//!
//! Mounted directories are copied into the container before it starts, so
//! tools that write into their workdir never touch the host tree. Mounted
//! files, secrets and cache volumes are real mounts and never end up in a
//! committed image.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifact::{HostDirectory, HostFile};
use crate::container::{ContainerSpec, Op, ServiceSpec};
use crate::engine::{ContainerEngine, RegistryAuth};
use crate::error::{EngineError, EngineResult};
use crate::image::ImageRef;
use crate::secret::Secret;

/// Docker engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// CLI binary (`docker`, or a compatible one such as `podman`).
    pub cli: String,
    /// Per-command timeout in seconds, 0 disables it.
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        DockerConfig {
            cli: std::env::var("ATHAME_CONTAINER_CLI").unwrap_or_else(|_| "docker".to_string()),
            timeout_secs: std::env::var("ATHAME_EXEC_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}

impl DockerConfig {
    /// Create a config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(cli: &str) -> Self {
        DockerConfig {
            cli: cli.to_string(),
            timeout_secs: 0,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Output of one runtime CLI invocation.
#[derive(Debug, Clone)]
struct CliOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
    success: bool,
}

/// Working state an exec runs with.
#[derive(Debug, Clone, Default, PartialEq)]
struct ExecState {
    workdir: Option<String>,
    user: Option<String>,
    env: Vec<(String, String)>,
    expand: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
enum Step {
    Exec { argv: Vec<String>, state: ExecState },
    CopyDirectory { source: PathBuf, dest: String },
    CopyFile { source: PathBuf, dest: String },
    NewFile { dest: String, contents: String },
}

/// Image config applied by `docker commit`.
#[derive(Debug, Clone, Default)]
struct CommitConfig {
    workdir: Option<String>,
    user: Option<String>,
    env: Vec<(String, String)>,
    ports: Vec<u16>,
    labels: Vec<(String, String)>,
    entrypoint: Option<Vec<String>>,
}

/// A spec lowered to runtime operations.
#[derive(Debug, Default)]
struct Plan {
    image: String,
    platform: Option<String>,
    bind_flags: Vec<String>,
    secret_env: Vec<(String, Secret)>,
    secret_mounts: Vec<(String, Secret)>,
    mounted_dirs: Vec<(PathBuf, String)>,
    services: Vec<(String, ServiceSpec)>,
    steps: Vec<Step>,
    commit: CommitConfig,
}

fn resolve_path(workdir: Option<&str>, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }
    let base = workdir.unwrap_or("/");
    format!("{}/{}", base.trim_end_matches('/'), path)
}

impl Plan {
    fn from_spec(spec: &ContainerSpec) -> EngineResult<Self> {
        let mut plan = Plan {
            image: spec.image().to_string(),
            platform: spec.platform().map(|p| p.as_str().to_string()),
            ..Default::default()
        };
        let mut state = ExecState::default();

        for op in spec.ops() {
            match op {
                Op::Exec(argv) => {
                    if argv.is_empty() {
                        return Err(EngineError::InvalidSpec(format!(
                            "empty exec in container from {}",
                            spec.image()
                        )));
                    }
                    plan.steps.push(Step::Exec {
                        argv: argv.clone(),
                        state: state.clone(),
                    });
                }
                Op::Workdir(path) => {
                    let resolved = resolve_path(state.workdir.as_deref(), path);
                    state.workdir = Some(resolved.clone());
                    plan.commit.workdir = Some(resolved);
                }
                Op::Env {
                    name,
                    value,
                    expand,
                } => {
                    let target = if *expand {
                        &mut state.expand
                    } else {
                        &mut state.env
                    };
                    target.retain(|(k, _)| k != name);
                    target.push((name.clone(), value.clone()));
                    plan.commit.env.retain(|(k, _)| k != name);
                    plan.commit.env.push((name.clone(), value.clone()));
                }
                Op::SecretEnv { name, secret } => {
                    plan.secret_env.retain(|(k, _)| k != name);
                    plan.secret_env.push((name.clone(), secret.clone()));
                }
                Op::User(user) => {
                    state.user = Some(user.clone());
                    plan.commit.user = Some(user.clone());
                }
                Op::MountDirectory { path, source } => {
                    let dest = resolve_path(state.workdir.as_deref(), path);
                    plan.mounted_dirs
                        .push((source.path().to_path_buf(), dest));
                }
                Op::MountFile { path, source } => {
                    let dest = resolve_path(state.workdir.as_deref(), path);
                    plan.bind_flags.push("-v".to_string());
                    plan.bind_flags
                        .push(format!("{}:{}:ro", source.path().display(), dest));
                }
                Op::MountSecret { path, secret } => {
                    let dest = resolve_path(state.workdir.as_deref(), path);
                    plan.secret_mounts.push((dest, secret.clone()));
                }
                Op::MountCache { path, volume } => {
                    let dest = resolve_path(state.workdir.as_deref(), path);
                    plan.bind_flags.push("-v".to_string());
                    plan.bind_flags.push(format!("{volume}:{dest}"));
                }
                Op::CopyDirectory { path, source } => plan.steps.push(Step::CopyDirectory {
                    source: source.path().to_path_buf(),
                    dest: resolve_path(state.workdir.as_deref(), path),
                }),
                Op::CopyFile { path, source } => plan.steps.push(Step::CopyFile {
                    source: source.path().to_path_buf(),
                    dest: resolve_path(state.workdir.as_deref(), path),
                }),
                Op::NewFile { path, contents } => plan.steps.push(Step::NewFile {
                    dest: resolve_path(state.workdir.as_deref(), path),
                    contents: contents.clone(),
                }),
                Op::ExposePort(port) => plan.commit.ports.push(*port),
                Op::Label { name, value } => {
                    plan.commit.labels.retain(|(k, _)| k != name);
                    plan.commit.labels.push((name.clone(), value.clone()));
                }
                Op::Entrypoint(args) => plan.commit.entrypoint = Some(args.clone()),
                Op::ServiceBinding { alias, service } => {
                    plan.services.push((alias.clone(), (**service).clone()))
                }
            }
        }

        Ok(plan)
    }

    /// At most one exec and nothing that has to happen between execs.
    fn is_single_shot(&self) -> bool {
        let execs = self
            .steps
            .iter()
            .filter(|s| matches!(s, Step::Exec { .. }))
            .count();
        execs <= 1 && self.steps.iter().all(|s| matches!(s, Step::Exec { .. }))
    }

    fn final_workdir(&self) -> Option<&str> {
        self.commit.workdir.as_deref()
    }
}

/// Wrap an exec so `$VAR` references in expanded variables resolve in-container.
fn exec_argv(argv: &[String], state: &ExecState) -> Vec<String> {
    if state.expand.is_empty() {
        return argv.to_vec();
    }
    let exports = state
        .expand
        .iter()
        .map(|(k, v)| format!("export {k}=\"{}\"", v.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join("; ");
    let mut out = vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("{exports}; exec \"$@\""),
        "sh".to_string(),
    ];
    out.extend(argv.iter().cloned());
    out
}

fn exec_flags(state: &ExecState) -> Vec<String> {
    let mut flags = Vec::new();
    if let Some(workdir) = &state.workdir {
        flags.push("-w".to_string());
        flags.push(workdir.clone());
    }
    if let Some(user) = &state.user {
        flags.push("-u".to_string());
        flags.push(user.clone());
    }
    for (k, v) in &state.env {
        flags.push("-e".to_string());
        flags.push(format!("{k}={v}"));
    }
    flags
}

fn commit_changes(
    commit: &CommitConfig,
    original: &ImageConfig,
) -> EngineResult<Vec<String>> {
    let mut changes = Vec::new();
    if let Some(workdir) = &commit.workdir {
        changes.push(format!("WORKDIR {workdir}"));
    }
    if let Some(user) = &commit.user {
        changes.push(format!("USER {user}"));
    }
    for (k, v) in &commit.env {
        changes.push(format!("ENV {k}={}", serde_json::to_string(v)?));
    }
    for port in &commit.ports {
        changes.push(format!("EXPOSE {port}/tcp"));
    }
    for (k, v) in &commit.labels {
        changes.push(format!(
            "LABEL {}={}",
            serde_json::to_string(k)?,
            serde_json::to_string(v)?
        ));
    }
    // The snapshot container may have run with a placeholder command, so
    // entrypoint and cmd are always written explicitly.
    let (entrypoint, cmd) = match &commit.entrypoint {
        Some(ep) => (ep.clone(), Vec::new()),
        None => (
            original.entrypoint.clone().unwrap_or_default(),
            original.cmd.clone().unwrap_or_default(),
        ),
    };
    changes.push(format!("ENTRYPOINT {}", serde_json::to_string(&entrypoint)?));
    changes.push(format!("CMD {}", serde_json::to_string(&cmd)?));
    Ok(changes)
}

/// Subset of `docker image inspect` `.Config`.
#[derive(Debug, Clone, Default, Deserialize)]
struct ImageConfig {
    #[serde(rename = "Entrypoint")]
    entrypoint: Option<Vec<String>>,
    #[serde(rename = "Cmd")]
    cmd: Option<Vec<String>>,
}

fn digest_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(sha256:[a-f0-9]{64})").expect("static regex is valid"))
}

/// Last digest mentioned in push / manifest output.
fn parse_pushed_digest(output: &str) -> Option<String> {
    digest_re()
        .captures_iter(output)
        .last()
        .map(|c| c[1].to_string())
}

fn looks_like_pull_failure(stderr: &str) -> bool {
    let s = stderr.to_lowercase();
    s.contains("unable to find image")
        || s.contains("pull access denied")
        || s.contains("manifest unknown")
        || s.contains("not found: manifest")
        || s.contains("no matching manifest")
}

/// Resources created for one spec run.
#[derive(Default)]
struct Session {
    containers: Vec<String>,
    network: Option<String>,
    scratch: Vec<TempDir>,
}

/// Final action performed on a prepared container.
enum Finish {
    Stdout,
    Directory(String),
    File(String),
    Commit(String),
}

enum Finished {
    Stdout(String),
    Directory(HostDirectory),
    File(HostFile),
    Committed,
}

/// Container engine shelling out to the docker CLI.
pub struct DockerEngine {
    config: DockerConfig,
}

impl DockerEngine {
    pub fn new(config: DockerConfig) -> Self {
        DockerEngine { config }
    }

    /// Create an engine from environment variables
    pub fn from_env() -> Self {
        Self::new(DockerConfig::from_env())
    }

    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    /// Run one runtime CLI command.
    async fn cli(
        &self,
        args: &[String],
        env: &[(String, Secret)],
        stdin: Option<&str>,
    ) -> EngineResult<CliOutput> {
        debug!(cli = %self.config.cli, args = ?args, "container runtime call");

        let mut cmd = Command::new(&self.config.cli);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        for (name, secret) in env {
            cmd.env(name, secret.plaintext());
        }

        let mut child = cmd.spawn().map_err(|e| EngineError::RuntimeUnavailable {
            cli: self.config.cli.clone(),
            reason: e.to_string(),
        })?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes()).await?;
                drop(pipe);
            }
        }

        let output = if self.config.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| EngineError::Timeout {
                operation: format!("{} {}", self.config.cli, args.first().map(String::as_str).unwrap_or("")),
                timeout_secs: self.config.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(CliOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }

    /// Run a runtime command that must succeed.
    async fn cli_ok(&self, args: Vec<String>) -> EngineResult<CliOutput> {
        let out = self.cli(&args, &[], None).await?;
        if out.success {
            Ok(out)
        } else {
            let mut command = vec![self.config.cli.clone()];
            command.extend(args);
            Err(EngineError::ExecFailed {
                command,
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
            })
        }
    }

    async fn image_config(&self, image: &str) -> EngineResult<ImageConfig> {
        let out = self
            .cli(
                &[
                    "image".to_string(),
                    "inspect".to_string(),
                    "--format".to_string(),
                    "{{json .Config}}".to_string(),
                    image.to_string(),
                ],
                &[],
                None,
            )
            .await?;
        if !out.success {
            return Ok(ImageConfig::default());
        }
        Ok(serde_json::from_str(out.stdout.trim()).unwrap_or_default())
    }

    async fn start_services(&self, plan: &Plan, session: &mut Session) -> EngineResult<()> {
        if plan.services.is_empty() {
            return Ok(());
        }
        let network = format!("athame-net-{}", Uuid::new_v4().simple());
        self.cli_ok(vec!["network".into(), "create".into(), network.clone()])
            .await?;
        session.network = Some(network.clone());

        for (alias, service) in &plan.services {
            let service_plan = Plan::from_spec(&service.container)?;
            let mut args = vec![
                "run".to_string(),
                "-d".to_string(),
                "--network".to_string(),
                network.clone(),
                "--network-alias".to_string(),
                alias.clone(),
            ];
            if let Some(platform) = &service_plan.platform {
                args.push("--platform".into());
                args.push(platform.clone());
            }
            for (k, v) in &service_plan.commit.env {
                args.push("-e".into());
                args.push(format!("{k}={v}"));
            }
            for (name, _) in &service_plan.secret_env {
                args.push("-e".into());
                args.push(name.clone());
            }
            args.extend(service_plan.bind_flags.iter().cloned());
            args.push("--entrypoint".into());
            args.push(String::new());
            args.push(service_plan.image.clone());
            args.extend(service.args.iter().cloned());

            let out = self.cli(&args, &service_plan.secret_env, None).await?;
            if !out.success {
                if looks_like_pull_failure(&out.stderr) {
                    return Err(EngineError::ImagePull {
                        image: service_plan.image.clone(),
                        reason: out.stderr.trim().to_string(),
                    });
                }
                return Err(EngineError::ExecFailed {
                    command: service.args.clone(),
                    exit_code: out.exit_code,
                    stdout: out.stdout,
                    stderr: out.stderr,
                });
            }
            let id = out.stdout.trim().to_string();
            info!(alias = %alias, image = %service_plan.image, "service started");
            session.containers.push(id);
        }
        Ok(())
    }

    /// `docker create` the main container; returns its id.
    async fn create(&self, plan: &Plan, session: &mut Session) -> EngineResult<String> {
        let mut args = vec!["create".to_string()];
        if let Some(platform) = &plan.platform {
            args.push("--platform".into());
            args.push(platform.clone());
        }
        if let Some(network) = &session.network {
            args.push("--network".into());
            args.push(network.clone());
        }
        args.extend(plan.bind_flags.iter().cloned());

        if !plan.secret_mounts.is_empty() {
            let dir = tempfile::tempdir()?;
            for (i, (dest, secret)) in plan.secret_mounts.iter().enumerate() {
                let host = dir.path().join(format!("secret-{i}"));
                write_private(&host, secret.plaintext())?;
                args.push("-v".into());
                args.push(format!("{}:{}:ro", host.display(), dest));
            }
            session.scratch.push(dir);
        }
        for (name, _) in &plan.secret_env {
            args.push("-e".into());
            args.push(name.clone());
        }

        let single_exec = plan.steps.iter().find_map(|s| match s {
            Step::Exec { argv, state } => Some((argv, state)),
            _ => None,
        });

        if plan.is_single_shot() {
            if let Some((argv, state)) = single_exec {
                args.extend(exec_flags(state));
                args.push("--entrypoint".into());
                args.push(String::new());
                args.push(plan.image.clone());
                args.extend(exec_argv(argv, state));
            } else {
                args.push(plan.image.clone());
            }
        } else {
            args.push("--entrypoint".into());
            args.push("sleep".into());
            args.push(plan.image.clone());
            args.push("infinity".into());
        }

        let out = self.cli(&args, &plan.secret_env, None).await?;
        if !out.success {
            if looks_like_pull_failure(&out.stderr) {
                return Err(EngineError::ImagePull {
                    image: plan.image.clone(),
                    reason: out.stderr.trim().to_string(),
                });
            }
            return Err(EngineError::ExecFailed {
                command: vec![self.config.cli.clone(), "create".into(), plan.image.clone()],
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }
        let id = out.stdout.trim().to_string();
        session.containers.push(id.clone());
        Ok(id)
    }

    async fn copy_in(&self, id: &str, source: &Path, dest: &str, dir: bool) -> EngineResult<()> {
        let src = if dir {
            format!("{}/.", source.display())
        } else {
            source.display().to_string()
        };
        self.cli_ok(vec!["cp".into(), src, format!("{id}:{dest}")])
            .await?;
        Ok(())
    }

    async fn mkdir(&self, id: &str, path: &str, user: Option<&str>) -> EngineResult<()> {
        let mut args = vec!["exec".to_string()];
        if let Some(user) = user {
            args.push("-u".into());
            args.push(user.to_string());
        }
        args.push(id.to_string());
        args.extend(["mkdir".to_string(), "-p".to_string(), path.to_string()]);
        self.cli_ok(args).await?;
        Ok(())
    }

    /// Apply the plan to a fresh container; returns the container id and the
    /// stdout of the last exec.
    async fn prepare(&self, plan: &Plan, session: &mut Session) -> EngineResult<(String, String)> {
        self.start_services(plan, session).await?;
        let id = self.create(plan, session).await?;

        for (source, dest) in &plan.mounted_dirs {
            self.copy_in(&id, source, dest, true).await?;
        }

        if plan.is_single_shot() {
            let Some((argv, _)) = plan.steps.iter().find_map(|s| match s {
                Step::Exec { argv, state } => Some((argv, state)),
                _ => None,
            }) else {
                return Ok((id, String::new()));
            };
            let out = self
                .cli(&["start".to_string(), "-a".to_string(), id.clone()], &[], None)
                .await?;
            if !out.success {
                return Err(EngineError::ExecFailed {
                    command: argv.clone(),
                    exit_code: out.exit_code,
                    stdout: out.stdout,
                    stderr: out.stderr,
                });
            }
            return Ok((id, out.stdout));
        }

        self.cli_ok(vec!["start".into(), id.clone()]).await?;

        let mut last_stdout = String::new();
        let mut workdirs: HashSet<String> = HashSet::new();
        for step in &plan.steps {
            match step {
                Step::Exec { argv, state } => {
                    // `docker exec -w` does not create the directory.
                    if let Some(workdir) = &state.workdir {
                        if workdirs.insert(workdir.clone()) {
                            self.mkdir(&id, workdir, state.user.as_deref()).await?;
                        }
                    }
                    let mut args = vec!["exec".to_string()];
                    args.extend(exec_flags(state));
                    args.push(id.clone());
                    args.extend(exec_argv(argv, state));
                    debug!(command = ?argv, "exec");
                    let out = self.cli(&args, &[], None).await?;
                    if !out.success {
                        return Err(EngineError::ExecFailed {
                            command: argv.clone(),
                            exit_code: out.exit_code,
                            stdout: out.stdout,
                            stderr: out.stderr,
                        });
                    }
                    last_stdout = out.stdout;
                }
                Step::CopyDirectory { source, dest } => {
                    self.mkdir(&id, dest, None).await?;
                    self.copy_in(&id, source, dest, true).await?;
                }
                Step::CopyFile { source, dest } => {
                    self.mkdir(&id, parent_of(dest), None).await?;
                    self.copy_in(&id, source, dest, false).await?;
                }
                Step::NewFile { dest, contents } => {
                    let dir = tempfile::tempdir()?;
                    let host = dir.path().join("new-file");
                    std::fs::write(&host, contents)?;
                    self.mkdir(&id, parent_of(dest), None).await?;
                    self.copy_in(&id, &host, dest, false).await?;
                    session.scratch.push(dir);
                }
            }
        }

        Ok((id, last_stdout))
    }

    async fn commit(&self, id: &str, plan: &Plan, tag: &str) -> EngineResult<()> {
        let original = self.image_config(&plan.image).await?;
        let mut args = vec!["commit".to_string()];
        for change in commit_changes(&plan.commit, &original)? {
            args.push("--change".into());
            args.push(change);
        }
        args.push(id.to_string());
        args.push(tag.to_string());
        self.cli_ok(args).await?;
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec, finish: Finish) -> EngineResult<Finished> {
        let plan = Plan::from_spec(spec)?;
        let mut session = Session::default();
        let result = self.run_in(&plan, &mut session, finish).await;
        self.cleanup(session).await;
        result
    }

    async fn run_in(&self, plan: &Plan, session: &mut Session, finish: Finish) -> EngineResult<Finished> {
        let (id, stdout) = self.prepare(plan, session).await?;
        match finish {
            Finish::Stdout => Ok(Finished::Stdout(stdout)),
            Finish::Directory(path) => {
                let path = resolve_path(plan.final_workdir(), &path);
                let dir = tempfile::tempdir()?;
                self.cli(
                    &[
                        "cp".to_string(),
                        format!("{id}:{}/.", path.trim_end_matches('/')),
                        dir.path().display().to_string(),
                    ],
                    &[],
                    None,
                )
                .await
                .and_then(|out| {
                    if out.success {
                        Ok(())
                    } else {
                        Err(EngineError::Export {
                            path: path.clone(),
                            reason: out.stderr.trim().to_string(),
                        })
                    }
                })?;
                Ok(Finished::Directory(HostDirectory::from_temp(dir)))
            }
            Finish::File(path) => {
                let path = resolve_path(plan.final_workdir(), &path);
                let name = Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "file".to_string());
                let dir = tempfile::tempdir()?;
                let out = self
                    .cli(
                        &[
                            "cp".to_string(),
                            format!("{id}:{path}"),
                            dir.path().join(&name).display().to_string(),
                        ],
                        &[],
                        None,
                    )
                    .await?;
                if !out.success {
                    return Err(EngineError::Export {
                        path,
                        reason: out.stderr.trim().to_string(),
                    });
                }
                Ok(Finished::File(HostFile::in_temp(dir, name)))
            }
            Finish::Commit(tag) => {
                self.commit(&id, plan, &tag).await?;
                Ok(Finished::Committed)
            }
        }
    }

    async fn cleanup(&self, session: Session) {
        for id in session.containers.iter().rev() {
            if let Err(e) = self
                .cli(&["rm".to_string(), "-f".to_string(), id.clone()], &[], None)
                .await
            {
                warn!(container = %id, error = %e, "failed to remove container");
            }
        }
        if let Some(network) = session.network {
            if let Err(e) = self
                .cli(&["network".to_string(), "rm".to_string(), network.clone()], &[], None)
                .await
            {
                warn!(network = %network, error = %e, "failed to remove network");
            }
        }
    }

    async fn login(&self, auth: &RegistryAuth) -> EngineResult<()> {
        let args = vec![
            "login".to_string(),
            auth.registry.clone(),
            "-u".to_string(),
            auth.username.clone(),
            "--password-stdin".to_string(),
        ];
        let out = self.cli(&args, &[], Some(auth.secret.plaintext())).await?;
        if !out.success {
            return Err(EngineError::Auth {
                registry: auth.registry.clone(),
                reason: out.stderr.trim().to_string(),
            });
        }
        info!(registry = %auth.registry, username = %auth.username, "registry login succeeded");
        Ok(())
    }

    async fn push(&self, tag: &str, address: &str) -> EngineResult<String> {
        let out = self.cli(&["push".to_string(), tag.to_string()], &[], None).await?;
        if !out.success {
            return Err(EngineError::Publish {
                address: address.to_string(),
                reason: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout)
    }

    async fn remove_local_tags(&self, tags: &[String]) {
        for tag in tags {
            if let Err(e) = self.cli(&["rmi".to_string(), tag.clone()], &[], None).await {
                warn!(tag = %tag, error = %e, "failed to remove local tag");
            }
        }
    }

    /// Commit and push every variant, returning the digest of `address`.
    /// Every local tag created along the way is recorded in `local_tags`.
    async fn push_variants(
        &self,
        variants: &[ContainerSpec],
        address: &str,
        local_tags: &mut Vec<String>,
    ) -> EngineResult<String> {
        if let [variant] = variants {
            local_tags.push(address.to_string());
            self.run(variant, Finish::Commit(address.to_string())).await?;
            let output = self.push(address, address).await?;
            return parse_pushed_digest(&output).ok_or_else(|| EngineError::Publish {
                address: address.to_string(),
                reason: "registry did not report a digest".to_string(),
            });
        }

        for (i, variant) in variants.iter().enumerate() {
            let suffix = variant
                .platform()
                .map(|p| p.slug())
                .unwrap_or_else(|| format!("variant{i}"));
            let tag = format!("{address}-{suffix}");
            local_tags.push(tag.clone());
            self.run(variant, Finish::Commit(tag.clone())).await?;
            self.push(&tag, address).await?;
        }

        let mut create = vec![
            "manifest".to_string(),
            "create".to_string(),
            "--amend".to_string(),
            address.to_string(),
        ];
        create.extend(local_tags.iter().cloned());
        self.cli_ok(create).await.map_err(|e| EngineError::Publish {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let out = self
            .cli(
                &["manifest".to_string(), "push".to_string(), address.to_string()],
                &[],
                None,
            )
            .await?;
        if !out.success {
            return Err(EngineError::Publish {
                address: address.to_string(),
                reason: out.stderr.trim().to_string(),
            });
        }
        parse_pushed_digest(&out.stdout).ok_or_else(|| EngineError::Publish {
            address: address.to_string(),
            reason: "registry did not report a manifest digest".to_string(),
        })
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn stdout(&self, spec: &ContainerSpec) -> EngineResult<String> {
        match self.run(spec, Finish::Stdout).await? {
            Finished::Stdout(s) => Ok(s),
            _ => unreachable!("stdout run yields stdout"),
        }
    }

    async fn export_directory(
        &self,
        spec: &ContainerSpec,
        path: &str,
    ) -> EngineResult<HostDirectory> {
        match self.run(spec, Finish::Directory(path.to_string())).await? {
            Finished::Directory(d) => Ok(d),
            _ => unreachable!("directory export yields a directory"),
        }
    }

    async fn export_file(&self, spec: &ContainerSpec, path: &str) -> EngineResult<HostFile> {
        match self.run(spec, Finish::File(path.to_string())).await? {
            Finished::File(f) => Ok(f),
            _ => unreachable!("file export yields a file"),
        }
    }

    async fn export_tarball(&self, spec: &ContainerSpec) -> EngineResult<HostFile> {
        let tag = format!("athame-export-{}:latest", Uuid::new_v4().simple());
        self.run(spec, Finish::Commit(tag.clone())).await?;

        let dir = tempfile::tempdir()?;
        let tarball = dir.path().join("image.tar");
        let saved = self
            .cli_ok(vec![
                "save".into(),
                "-o".into(),
                tarball.display().to_string(),
                tag.clone(),
            ])
            .await;
        self.remove_local_tags(&[tag]).await;
        saved?;
        Ok(HostFile::in_temp(dir, "image.tar"))
    }

    async fn publish(
        &self,
        variants: &[ContainerSpec],
        address: &str,
        auth: Option<&RegistryAuth>,
    ) -> EngineResult<String> {
        if variants.is_empty() {
            return Err(EngineError::InvalidSpec(format!(
                "no container variants to publish to {address}"
            )));
        }
        let reference = ImageRef::parse(address)?;

        if let Some(auth) = auth {
            self.login(auth).await?;
        }

        let mut local_tags = Vec::new();
        let pushed = self.push_variants(variants, address, &mut local_tags).await;
        self.remove_local_tags(&local_tags).await;
        let digest = pushed?;
        info!(address = %address, digest = %digest, platforms = variants.len(), "image published");
        Ok(reference.with_digest(digest).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Platform;

    fn src() -> (TempDir, HostDirectory) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = HostDirectory::from_path(tmp.path()).unwrap();
        (tmp, dir)
    }

    #[test]
    fn single_exec_with_mount_is_single_shot() {
        let (_tmp, source) = src();
        let spec = ContainerSpec::from_image("jdkato/vale:v3.12.0")
            .without_entrypoint()
            .with_mounted_directory("/src", &source)
            .with_workdir("/src")
            .with_exec(["vale", "docs"]);
        let plan = Plan::from_spec(&spec).unwrap();
        assert!(plan.is_single_shot());
        assert_eq!(plan.mounted_dirs.len(), 1);
        assert_eq!(plan.mounted_dirs[0].1, "/src");
        assert_eq!(plan.commit.entrypoint, Some(vec![]));
    }

    #[test]
    fn copies_between_execs_need_keep_alive() {
        let (_tmp, source) = src();
        let spec = ContainerSpec::from_image("node:22")
            .with_workdir("/app")
            .with_file("package.json", &source.file("package.json"))
            .with_exec(["npm", "ci"])
            .with_directory("/app", &source)
            .with_exec(["npm", "run", "build"]);
        let plan = Plan::from_spec(&spec).unwrap();
        assert!(!plan.is_single_shot());
        match &plan.steps[0] {
            Step::CopyFile { dest, .. } => assert_eq!(dest, "/app/package.json"),
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn exec_state_tracks_env_workdir_and_user() {
        let spec = ContainerSpec::from_image("asdfvm/asdf")
            .with_user("root")
            .with_env_variable("A", "1")
            .with_workdir("/work")
            .with_workdir("sub")
            .with_env_variable("A", "2")
            .with_exec(["true"]);
        let plan = Plan::from_spec(&spec).unwrap();
        let Step::Exec { state, .. } = &plan.steps[0] else {
            panic!("expected exec");
        };
        assert_eq!(state.workdir.as_deref(), Some("/work/sub"));
        assert_eq!(state.user.as_deref(), Some("root"));
        assert_eq!(state.env, vec![("A".to_string(), "2".to_string())]);
        assert_eq!(
            exec_flags(state),
            vec!["-w", "/work/sub", "-u", "root", "-e", "A=2"]
        );
    }

    #[test]
    fn expanded_env_wraps_exec_in_shell() {
        let state = ExecState {
            expand: vec![(
                "PATH".to_string(),
                "/root/.local/share/mise/shims:$PATH".to_string(),
            )],
            ..Default::default()
        };
        let argv = exec_argv(&["ok".to_string(), "--help".to_string()], &state);
        assert_eq!(&argv[..2], ["sh", "-c"]);
        assert!(argv[2].starts_with("export PATH=\"/root/.local/share/mise/shims:$PATH\""));
        assert_eq!(&argv[3..], ["sh", "ok", "--help"]);
    }

    #[test]
    fn empty_exec_is_rejected() {
        let spec = ContainerSpec::from_image("alpine").with_exec(Vec::<String>::new());
        assert!(matches!(
            Plan::from_spec(&spec),
            Err(EngineError::InvalidSpec(_))
        ));
    }

    #[test]
    fn commit_changes_override_placeholder_command() {
        let spec = ContainerSpec::from_image("alpine")
            .with_platform(Platform::linux_amd64())
            .with_entrypoint(["/bin/app"])
            .with_exposed_port(80)
            .with_label("org.opencontainers.image.title", "site");
        let plan = Plan::from_spec(&spec).unwrap();
        let changes = commit_changes(&plan.commit, &ImageConfig::default()).unwrap();
        assert!(changes.contains(&"EXPOSE 80/tcp".to_string()));
        assert!(changes.contains(&"LABEL \"org.opencontainers.image.title\"=\"site\"".to_string()));
        assert!(changes.contains(&"ENTRYPOINT [\"/bin/app\"]".to_string()));
        assert!(changes.contains(&"CMD []".to_string()));
    }

    #[test]
    fn commit_keeps_original_entrypoint_when_unset() {
        let plan = Plan::from_spec(&ContainerSpec::from_image("nginx")).unwrap();
        let original = ImageConfig {
            entrypoint: Some(vec!["/docker-entrypoint.sh".to_string()]),
            cmd: Some(vec!["nginx".to_string(), "-g".to_string(), "daemon off;".to_string()]),
        };
        let changes = commit_changes(&plan.commit, &original).unwrap();
        assert!(changes.contains(&"ENTRYPOINT [\"/docker-entrypoint.sh\"]".to_string()));
        assert!(changes.contains(&"CMD [\"nginx\",\"-g\",\"daemon off;\"]".to_string()));
    }

    #[test]
    fn parses_digest_from_push_output() {
        let out = "The push refers to repository [ghcr.io/o/site]\n\
                   latest: digest: sha256:65645c7bb6a0661892a8b03b89d0743208a18dd2f3f17a54ef4b76fb8e2f2a10 size: 1570\n";
        assert_eq!(
            parse_pushed_digest(out).as_deref(),
            Some("sha256:65645c7bb6a0661892a8b03b89d0743208a18dd2f3f17a54ef4b76fb8e2f2a10")
        );
        assert_eq!(parse_pushed_digest("nothing here"), None);
    }

    #[test]
    fn detects_pull_failures() {
        assert!(looks_like_pull_failure(
            "Unable to find image 'nope:1' locally\nError response from daemon: manifest unknown"
        ));
        assert!(!looks_like_pull_failure("exit status 1"));
    }

    #[test]
    fn relative_paths_resolve_against_workdir() {
        assert_eq!(resolve_path(Some("/docs"), "site"), "/docs/site");
        assert_eq!(resolve_path(None, "site"), "/site");
        assert_eq!(resolve_path(Some("/docs"), "/abs"), "/abs");
        assert_eq!(parent_of("/fly.toml"), "/");
        assert_eq!(parent_of("/app/package.json"), "/app");
    }

    #[tokio::test]
    async fn missing_runtime_is_reported() {
        let engine = DockerEngine::new(DockerConfig::new("athame-no-such-container-cli"));
        let spec = ContainerSpec::from_image("alpine").with_exec(["true"]);
        let err = engine.stdout(&spec).await.unwrap_err();
        assert!(matches!(err, EngineError::RuntimeUnavailable { .. }));
    }

    /// Writes a stand-in runtime that logs its arguments and refuses to push arm64 tags.
    #[cfg(unix)]
    fn fake_runtime(dir: &Path) -> (String, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("calls.log");
        let script = dir.join("fake-docker");
        let body = format!(
            r#"#!/bin/sh
echo "$*" >> '{log}'
case "$1" in
  create) echo c0ffee ;;
  push)
    case "$*" in
      *arm64*) echo "denied: permission_denied" >&2; exit 1 ;;
      *) echo "latest: digest: sha256:{digest} size: 1" ;;
    esac ;;
esac
exit 0
"#,
            log = log.display(),
            digest = "ab".repeat(32),
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script.display().to_string(), log)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_multi_platform_push_removes_local_tags() {
        let tmp = tempfile::tempdir().unwrap();
        let (cli, log) = fake_runtime(tmp.path());
        let engine = DockerEngine::new(DockerConfig::new(&cli));
        let variants = [
            ContainerSpec::from_image("nginx").with_platform(Platform("linux/amd64".into())),
            ContainerSpec::from_image("nginx").with_platform(Platform("linux/arm64".into())),
        ];

        let err = engine
            .publish(&variants, "ghcr.io/o/site:1", None)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Publish { .. }), "{err}");
        let calls = std::fs::read_to_string(log).unwrap();
        assert!(calls.contains("rmi ghcr.io/o/site:1-linux-amd64"), "{calls}");
        assert!(calls.contains("rmi ghcr.io/o/site:1-linux-arm64"), "{calls}");
        assert!(!calls.contains("manifest"), "{calls}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn single_platform_publish_removes_its_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let (cli, log) = fake_runtime(tmp.path());
        let engine = DockerEngine::new(DockerConfig::new(&cli));
        let variants = [ContainerSpec::from_image("nginx")];

        let address = engine
            .publish(&variants, "ghcr.io/o/site:1", None)
            .await
            .unwrap();

        assert_eq!(address, format!("ghcr.io/o/site:1@sha256:{}", "ab".repeat(32)));
        let calls = std::fs::read_to_string(log).unwrap();
        assert!(calls.lines().any(|l| l == "rmi ghcr.io/o/site:1"), "{calls}");
    }
}
