//! Athame - containerized CI/CD tools
//!
//! The `athame` command runs tool modules and pipelines on the local
//! container runtime (`docker` by default, see `ATHAME_CONTAINER_CLI`).
//!
//! ## Commands
//!
//! - `mkdocs-ci`, `go-ci`, `miele-ci`: lint / build / publish / deploy pipelines
//! - `deploy`: deploy a published image to Fly.io, Cloud Run or Render
//! - `notify`: send an ntfy notification
//! - `exec`, `tools`: run any pinned tool image

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use athame_ci::demos::{
    GolangciLintDemo, LocalstackDemo, MkdocsMaterialDemo, DEFAULT_BUCKET, DEFAULT_SITE_PATH,
    DEFAULT_TERRAFORM_WORKDIR,
};
use athame_ci::repo::{Repo, DEFAULT_OUTPUT_FOLDER, DEFAULT_TEMPLATE};
use athame_ci::{
    deploy_all, AppriseNotifier, CloudRunTarget, DeployStrategy, DeployTarget, DisabledNotifier,
    FlyioTarget, GoCi, GoCiConfig, MieleCi, MieleCiConfig, MkdocsCi, MkdocsCiConfig, Notifier,
    NtfyNotifier, PipelineReport, RenderTarget, TaskOutcome,
};
use athame_engine::{ContainerEngine, DockerEngine, HostDirectory, HostFile, Secret};
use athame_tools::crane::Crane;
use athame_tools::gcloud::Gcloud;
use athame_tools::github_cli::GithubCli;
use athame_tools::mermaid::Mermaid;
use athame_tools::ntfy::{NtfyClient, NtfyConfig, SendOptions};
use athame_tools::release_please::ReleasePlease;
use athame_tools::renovate::{Renovate, DEFAULT_PLATFORM};
use athame_tools::trivy::{ScanOptions, Trivy};

#[derive(Parser)]
#[command(name = "athame")]
#[command(author = "Staticaland")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Containerized CI/CD tool modules and pipelines", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and reports
    #[arg(long, global = true)]
    json: bool,

    /// Do not send notifications
    #[arg(long, global = true)]
    no_notify: bool,

    /// Send notifications through Apprise to this service URL instead of ntfy
    #[arg(long, global = true, env = "APPRISE_SERVICE_URL", hide_env_values = true)]
    apprise_url: Option<String>,

    /// Where directories and files produced by a command are written
    #[arg(short, long, global = true, default_value = "athame-out")]
    output: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// MkDocs Material site pipeline
    MkdocsCi {
        #[command(flatten)]
        site: SiteArgs,

        #[command(subcommand)]
        action: MkdocsAction,
    },

    /// Go application pipeline
    GoCi {
        /// Go module root
        #[arg(long, default_value = ".")]
        source: PathBuf,

        #[command(subcommand)]
        action: GoAction,
    },

    /// Vite application pipeline
    MieleCi {
        /// Application root
        #[arg(long, default_value = "fixtures/miele-delay-start")]
        source: PathBuf,

        #[arg(long, default_value = "miele")]
        image_name: String,

        #[arg(long, default_value = "latest")]
        tag: String,

        #[arg(long, env = "ATHAME_GHCR_USERNAME")]
        ghcr_username: Option<String>,

        #[command(subcommand)]
        action: MieleAction,
    },

    /// Send a notification via ntfy
    Notify {
        message: String,

        #[arg(long)]
        title: Option<String>,

        /// urgent, high, default, low or min
        #[arg(long)]
        priority: Option<String>,

        /// Comma-separated tags or emoji shortcodes
        #[arg(long)]
        tags: Option<String>,

        #[arg(long)]
        markdown: bool,

        /// Action buttons, e.g. "view, Open, https://example.com"
        #[arg(long)]
        actions: Option<String>,

        /// Topic (default: ATHAME_NTFY_TOPIC or "athame")
        #[arg(long)]
        topic: Option<String>,
    },

    /// Deploy an already published image
    Deploy {
        #[command(subcommand)]
        target: DeployCommand,
    },

    /// Vulnerability scanning
    Trivy {
        #[command(subcommand)]
        action: TrivyAction,
    },

    /// Registry operations with crane
    Crane {
        #[command(subcommand)]
        action: CraneAction,
    },

    /// Google Cloud lookups
    Gcloud {
        #[command(subcommand)]
        action: GcloudAction,
    },

    /// Run Renovate against a repository
    Renovate {
        /// Repository, e.g. owner/repo
        project: String,

        #[arg(long, env = "RENOVATE_TOKEN", hide_env_values = true)]
        token: String,

        #[arg(long, default_value = DEFAULT_PLATFORM)]
        platform: String,
    },

    /// GitHub CLI
    Gh {
        #[command(subcommand)]
        action: GhAction,
    },

    /// Open or update release PRs and create releases
    ReleasePlease {
        #[arg(long, default_value = ".")]
        source: PathBuf,

        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: String,

        /// Repository URL, e.g. https://github.com/owner/repo
        #[arg(long)]
        repo_url: String,
    },

    /// Render a Mermaid diagram
    Mermaid {
        #[arg(long, default_value = ".")]
        source: PathBuf,

        /// Input file relative to the source directory
        input: String,

        /// Output file relative to the source directory (format from extension)
        #[arg(default_value = "diagram.svg")]
        target: String,
    },

    /// Run a command in a tool's base container
    Exec {
        /// Tool name (see `athame tools`)
        tool: String,

        /// Mount this directory at /src and run there
        #[arg(long)]
        source: Option<PathBuf>,

        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// List tools and their pinned images
    Tools,

    /// Repository chores
    Repo {
        #[arg(long, default_value = ".")]
        source: PathBuf,

        #[command(subcommand)]
        action: RepoAction,
    },

    /// Demonstrations
    Demo {
        #[command(subcommand)]
        action: DemoAction,
    },
}

#[derive(Args)]
struct SiteArgs {
    /// Repository root
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// Site directory below the repository root
    #[arg(long, default_value = "fixtures/mkdocs-material")]
    site_path: String,

    #[arg(long, default_value = "mkdocs-demo")]
    image_name: String,

    #[arg(long, default_value = "latest")]
    tag: String,

    #[arg(long, env = "ATHAME_GHCR_USERNAME")]
    ghcr_username: Option<String>,
}

#[derive(Args)]
struct GhcrArgs {
    /// GitHub token for GHCR (e.g. from `gh auth token`)
    #[arg(long, env = "GHCR_TOKEN", hide_env_values = true)]
    ghcr_token: String,
}

impl GhcrArgs {
    fn secret(&self) -> Secret {
        Secret::new("GHCR_TOKEN", &self.ghcr_token)
    }
}

#[derive(Subcommand)]
enum MkdocsAction {
    /// Run vale, prettier, markdownlint and lychee concurrently
    Test,
    /// Build the site into --output
    Build,
    /// Build and publish the site image to GHCR
    Publish {
        #[command(flatten)]
        ghcr: GhcrArgs,
    },
    /// Test, build, publish and deploy
    Run {
        #[command(flatten)]
        ghcr: GhcrArgs,

        #[command(flatten)]
        deploy: DeployArgs,

        /// Stop remaining checks as soon as one fails
        #[arg(long)]
        fail_fast: bool,
    },
}

#[derive(Subcommand)]
enum GoAction {
    /// golangci-lint
    Lint,
    /// gosec
    Gosec,
    /// Lint and gosec concurrently
    Test,
    /// Build and publish to ttl.sh
    Build {
        #[command(flatten)]
        image: GoImageArgs,
    },
    /// Test, then build and publish
    Run {
        #[command(flatten)]
        image: GoImageArgs,
    },
}

#[derive(Args)]
struct GoImageArgs {
    #[arg(long, default_value = "app")]
    binary_name: String,

    #[arg(long, default_value = "myapp")]
    image_name: String,
}

#[derive(Subcommand)]
enum MieleAction {
    /// Build the dist directory into --output
    Build,
    /// Build, scan and publish to GHCR
    Publish {
        #[command(flatten)]
        ghcr: GhcrArgs,
    },
    /// Publish, then deploy to Fly.io
    Deploy {
        #[command(flatten)]
        ghcr: GhcrArgs,

        #[arg(long)]
        flyio_app: String,

        #[arg(long, env = "FLY_API_TOKEN", hide_env_values = true)]
        flyio_token: String,

        #[arg(long, default_value = "arn")]
        flyio_region: String,
    },
}

/// Deploy targets for `mkdocs-ci run`. A target is used when its
/// credentials are given.
#[derive(Args)]
struct DeployArgs {
    /// Render deploy hook URL
    #[arg(long, env = "RENDER_DEPLOY_HOOK_URL", hide_env_values = true)]
    render_hook: Option<String>,

    /// Deploy the published address to Render instead of the service's image
    #[arg(long)]
    render_pin_image: bool,

    #[arg(long)]
    flyio_app: Option<String>,

    #[arg(long, env = "FLY_API_TOKEN", hide_env_values = true)]
    flyio_token: Option<String>,

    #[arg(long, default_value = "arn")]
    flyio_region: String,

    #[arg(long)]
    gcloud_service: Option<String>,

    #[arg(long)]
    gcloud_project: Option<String>,

    #[arg(long, default_value = "us-central1")]
    gcloud_region: String,

    /// Service account key (JSON)
    #[arg(long, env = "GCLOUD_SERVICE_ACCOUNT_KEY", hide_env_values = true)]
    gcloud_key: Option<String>,

    #[arg(long)]
    gcloud_allow_unauthenticated: bool,

    #[arg(long, default_value = "ghcr")]
    artifact_registry_repo: String,

    #[arg(long, default_value = "europe-north2")]
    artifact_registry_region: String,

    /// sequential or concurrent
    #[arg(long, default_value = "concurrent")]
    strategy: DeployStrategy,
}

impl DeployArgs {
    fn targets(
        &self,
        engine: &Arc<dyn ContainerEngine>,
        site_name: &str,
    ) -> Result<Vec<Box<dyn DeployTarget>>> {
        let mut targets: Vec<Box<dyn DeployTarget>> = Vec::new();

        if let Some(hook) = &self.render_hook {
            let render = RenderTarget::new(Secret::new("RENDER_DEPLOY_HOOK_URL", hook), site_name)
                .context("Failed to create Render client")?
                .pin_image(self.render_pin_image);
            targets.push(Box::new(render));
        }

        if let (Some(app), Some(token)) = (&self.flyio_app, &self.flyio_token) {
            targets.push(Box::new(
                FlyioTarget::new(Arc::clone(engine), app, Secret::new("FLY_API_TOKEN", token))
                    .with_region(&self.flyio_region),
            ));
        }

        if let (Some(key), Some(service), Some(project)) =
            (&self.gcloud_key, &self.gcloud_service, &self.gcloud_project)
        {
            targets.push(Box::new(
                CloudRunTarget::new(
                    Arc::clone(engine),
                    service,
                    project,
                    Secret::new("GCLOUD_SERVICE_ACCOUNT_KEY", key),
                )
                .with_region(&self.gcloud_region)
                .allow_unauthenticated(self.gcloud_allow_unauthenticated)
                .with_artifact_registry(
                    &self.artifact_registry_repo,
                    &self.artifact_registry_region,
                ),
            ));
        }

        Ok(targets)
    }
}

#[derive(Subcommand)]
enum DeployCommand {
    /// Deploy to Fly.io
    Flyio {
        image: String,

        #[arg(long)]
        app: String,

        #[arg(long, env = "FLY_API_TOKEN", hide_env_values = true)]
        token: String,

        #[arg(long, default_value = "arn")]
        region: String,

        #[arg(long, default_value_t = 80)]
        internal_port: u16,
    },
    /// Deploy to Google Cloud Run
    CloudRun {
        image: String,

        #[arg(long)]
        service: String,

        #[arg(long)]
        project: String,

        #[arg(long, default_value = "us-central1")]
        region: String,

        #[arg(long, env = "GCLOUD_SERVICE_ACCOUNT_KEY", hide_env_values = true)]
        key: String,

        #[arg(long)]
        allow_unauthenticated: bool,

        #[arg(long, default_value = "ghcr")]
        artifact_registry_repo: String,

        #[arg(long, default_value = "europe-north2")]
        artifact_registry_region: String,
    },
    /// Trigger a Render deploy hook
    Render {
        /// Image to deploy; the service's configured image when omitted
        image: Option<String>,

        /// Render service name (for the site URL)
        #[arg(long, default_value = "mkdocs-demo")]
        service_name: String,

        #[arg(long, env = "RENDER_DEPLOY_HOOK_URL", hide_env_values = true)]
        hook: String,
    },
}

#[derive(Subcommand)]
enum TrivyAction {
    /// Scan a remote image
    Image {
        reference: String,

        #[arg(long, default_value = "UNKNOWN,LOW,MEDIUM,HIGH,CRITICAL")]
        severity: String,

        /// Exit code when vulnerabilities are found
        #[arg(long, default_value_t = 0)]
        exit_code: i32,

        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[derive(Subcommand)]
enum CraneAction {
    /// List tags in a repository
    Ls { repository: String },
    /// Digest of an image
    Digest { image: String },
    /// Manifest of an image
    Manifest { image: String },
    /// Config blob of an image
    Config { image: String },
    /// Validate that an image is well formed
    Validate { image: String },
    /// Copy an image between registries
    Copy {
        source: String,
        destination: String,

        /// Docker config.json with registry credentials
        #[arg(long)]
        docker_config: Option<PathBuf>,
    },
    /// Tag a remote image
    Tag {
        image: String,
        tag: String,

        /// Docker config.json with registry credentials
        #[arg(long)]
        docker_config: Option<PathBuf>,
    },
    /// Export an image's filesystem as a tarball into --output
    Export { image: String },
}

#[derive(Subcommand)]
enum GcloudAction {
    /// Print the URL of a Cloud Run service
    ServiceUrl {
        service: String,

        #[arg(long)]
        project: String,

        #[arg(long, default_value = "us-central1")]
        region: String,

        #[arg(long, env = "GCLOUD_SERVICE_ACCOUNT_KEY", hide_env_values = true)]
        key: Option<String>,
    },
}

#[derive(Subcommand)]
enum GhAction {
    /// List repositories of the authenticated user
    Repos {
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: String,

        #[arg(short, long, default_value_t = 30)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum RepoAction {
    /// terraform init + plan in fixtures/terraform
    TerraformPlan,
    /// Generate README.md for fixtures/terraform into --output
    TerraformDocs,
    /// Render a boilerplate template into --output
    Boilerplate {
        #[arg(long, default_value = DEFAULT_TEMPLATE)]
        template: String,

        #[arg(long, default_value = DEFAULT_OUTPUT_FOLDER)]
        output_folder: String,
    },
}

#[derive(Subcommand)]
enum DemoAction {
    /// Query LocalStack's health endpoint
    LocalstackHealth,
    /// Create an S3 bucket in LocalStack
    CreateBucket {
        #[arg(default_value = DEFAULT_BUCKET)]
        bucket: String,
    },
    /// terraform-local apply against LocalStack
    TerraformApply {
        #[arg(long, default_value = ".")]
        source: PathBuf,

        #[arg(long, default_value = DEFAULT_TERRAFORM_WORKDIR)]
        workdir: String,
    },
    /// Build an MkDocs Material site into --output
    MkdocsSite {
        #[arg(long, default_value = ".")]
        source: PathBuf,

        #[arg(long, default_value = DEFAULT_SITE_PATH)]
        site_path: String,
    },
    /// golangci-lint on a Go module
    GolangciLint {
        #[arg(long, default_value = "fixtures/hello-world-cli")]
        source: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    athame_ci::init_tracing(cli.json, level);

    let engine: Arc<dyn ContainerEngine> = Arc::new(DockerEngine::from_env());
    let notifier = build_notifier(&cli, &engine)?;
    let output = cli.output.as_path();

    match cli.command {
        Commands::MkdocsCi { site, action } => {
            cmd_mkdocs(engine, notifier, site, action, output, cli.json).await
        }
        Commands::GoCi { source, action } => cmd_go(engine, &source, action, cli.json).await,
        Commands::MieleCi {
            source,
            image_name,
            tag,
            ghcr_username,
            action,
        } => {
            let mut config = MieleCiConfig::from_env();
            config.image_name = image_name;
            config.tag = tag;
            if let Some(user) = ghcr_username {
                config.ghcr_username = user;
            }
            cmd_miele(engine, notifier, &source, config, action, output, cli.json).await
        }
        Commands::Notify {
            message,
            title,
            priority,
            tags,
            markdown,
            actions,
            topic,
        } => {
            let opts = SendOptions {
                title,
                priority,
                tags,
                markdown,
                actions,
            };
            cmd_notify(&message, &opts, topic).await
        }
        Commands::Deploy { target } => cmd_deploy(engine, notifier, target).await,
        Commands::Trivy { action } => match action {
            TrivyAction::Image {
                reference,
                severity,
                exit_code,
                format,
            } => {
                let opts = ScanOptions {
                    severity,
                    exit_code,
                    format,
                };
                let report = Trivy::default()
                    .scan_image(engine.as_ref(), &reference, &opts)
                    .await
                    .context("trivy scan failed")?;
                print!("{report}");
                Ok(())
            }
        },
        Commands::Crane { action } => cmd_crane(engine.as_ref(), action, output).await,
        Commands::Gcloud { action } => match action {
            GcloudAction::ServiceUrl {
                service,
                project,
                region,
                key,
            } => {
                let key = key.map(|k| Secret::new("GCLOUD_SERVICE_ACCOUNT_KEY", k));
                let url = Gcloud::default()
                    .service_url(engine.as_ref(), &service, &project, &region, key.as_ref())
                    .await?;
                println!("{url}");
                Ok(())
            }
        },
        Commands::Renovate {
            project,
            token,
            platform,
        } => {
            let out = Renovate::default()
                .run(
                    engine.as_ref(),
                    &project,
                    &Secret::new("RENOVATE_TOKEN", token),
                    &platform,
                )
                .await
                .context("renovate failed")?;
            print!("{out}");
            Ok(())
        }
        Commands::Gh { action } => match action {
            GhAction::Repos { token, limit } => {
                let out = GithubCli::default()
                    .list_repos(engine.as_ref(), &Secret::new("GITHUB_TOKEN", token), limit)
                    .await?;
                print!("{out}");
                Ok(())
            }
        },
        Commands::ReleasePlease {
            source,
            token,
            repo_url,
        } => {
            let spec = ReleasePlease::default().manifest(
                &host_dir(&source)?,
                &Secret::new("GITHUB_TOKEN", token),
                &repo_url,
            );
            print!("{}", engine.stdout(&spec).await?);
            Ok(())
        }
        Commands::Mermaid {
            source,
            input,
            target,
        } => {
            let file = Mermaid::default()
                .render(engine.as_ref(), &host_dir(&source)?, &input, &target)
                .await?;
            save_file(&file, output)
        }
        Commands::Exec { tool, source, args } => cmd_exec(engine.as_ref(), &tool, source, args).await,
        Commands::Tools => {
            for tool in athame_tools::catalog() {
                println!("{:<18} {}", tool.name(), tool.base().image());
            }
            Ok(())
        }
        Commands::Repo { source, action } => {
            cmd_repo(Repo::new(engine, host_dir(&source)?), action, output).await
        }
        Commands::Demo { action } => cmd_demo(engine, action, output).await,
    }
}

fn build_notifier(cli: &Cli, engine: &Arc<dyn ContainerEngine>) -> Result<Arc<dyn Notifier>> {
    if cli.no_notify {
        return Ok(Arc::new(DisabledNotifier));
    }
    if let Some(url) = &cli.apprise_url {
        return Ok(Arc::new(AppriseNotifier::new(
            Arc::clone(engine),
            Secret::new("APPRISE_SERVICE_URL", url),
        )));
    }
    let ntfy = NtfyNotifier::from_env().context("Failed to create ntfy client")?;
    Ok(Arc::new(ntfy))
}

fn host_dir(path: &Path) -> Result<HostDirectory> {
    HostDirectory::from_path(path).with_context(|| format!("Cannot use {}", path.display()))
}

fn save_directory(dir: &HostDirectory, output: &Path) -> Result<()> {
    dir.export(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn save_file(file: &HostFile, output: &Path) -> Result<()> {
    let dest = if output.is_dir() || output.extension().is_none() {
        output.join(file.file_name())
    } else {
        output.to_path_buf()
    };
    file.export(&dest)
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    println!("Wrote {}", dest.display());
    Ok(())
}

fn print_outcomes(outcomes: &[TaskOutcome], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
        return Ok(());
    }
    for outcome in outcomes {
        let status = if outcome.success { "✓" } else { "✗" };
        println!("{} {} ({} ms)", status, outcome.name, outcome.duration_ms);
    }
    Ok(())
}

fn print_report(report: &PipelineReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("Pipeline: {} ({})", report.pipeline, report.run_id);
    for phase in &report.phases {
        let status = if phase.success { "✓" } else { "✗" };
        println!("  {} {} ({} ms)", status, phase.phase, phase.duration_ms);
    }
    println!(
        "Phases: {} passed, {} failed in {} ms",
        report.passed_count(),
        report.failed_count(),
        report.duration_ms
    );
    if let Some(address) = &report.address {
        println!("{address}");
    }
    Ok(())
}

async fn cmd_mkdocs(
    engine: Arc<dyn ContainerEngine>,
    notifier: Arc<dyn Notifier>,
    site: SiteArgs,
    action: MkdocsAction,
    output: &Path,
    json: bool,
) -> Result<()> {
    let mut config = MkdocsCiConfig::from_env();
    config.site_path = site.site_path;
    config.image_name = site.image_name;
    config.tag = site.tag;
    if let Some(user) = site.ghcr_username {
        config.ghcr_username = user;
    }
    if let MkdocsAction::Run {
        fail_fast, deploy, ..
    } = &action
    {
        config.fan_out.fail_fast = *fail_fast;
        config.deploy_strategy = deploy.strategy;
    }
    let image_name = config.image_name.clone();
    let ci = MkdocsCi::new(Arc::clone(&engine), notifier, host_dir(&site.source)?, config);

    match action {
        MkdocsAction::Test => {
            let outcomes = ci.run_all_tests().await.context("tests failed")?;
            print_outcomes(&outcomes, json)
        }
        MkdocsAction::Build => {
            let site = ci.build().await.context("site build failed")?;
            save_directory(&site, output)
        }
        MkdocsAction::Publish { ghcr } => {
            let address = ci.publish(&ghcr.secret()).await?;
            println!("{address}");
            Ok(())
        }
        MkdocsAction::Run { ghcr, deploy, .. } => {
            let targets = deploy.targets(&engine, &image_name)?;
            info!(targets = targets.len(), "deploy targets configured");
            let report = ci.lint_build_publish(&ghcr.secret(), &targets).await?;
            print_report(&report, json)
        }
    }
}

async fn cmd_go(
    engine: Arc<dyn ContainerEngine>,
    source: &Path,
    action: GoAction,
    json: bool,
) -> Result<()> {
    let source = host_dir(source)?;
    let image_config = |image: GoImageArgs| GoCiConfig {
        binary_name: image.binary_name,
        image_name: image.image_name,
        ..Default::default()
    };

    match action {
        GoAction::Lint => {
            let ci = GoCi::new(engine, GoCiConfig::default());
            print!("{}", ci.lint(&source).await.context("golangci-lint failed")?);
            Ok(())
        }
        GoAction::Gosec => {
            let ci = GoCi::new(engine, GoCiConfig::default());
            print!("{}", ci.gosec(&source).await.context("gosec failed")?);
            Ok(())
        }
        GoAction::Test => {
            let ci = GoCi::new(engine, GoCiConfig::default());
            let outcomes = ci.run_all_tests(&source).await.context("tests failed")?;
            print_outcomes(&outcomes, json)
        }
        GoAction::Build { image } => {
            let ci = GoCi::new(engine, image_config(image));
            println!("{}", ci.build(&source).await?);
            Ok(())
        }
        GoAction::Run { image } => {
            let ci = GoCi::new(engine, image_config(image));
            let report = ci.lint_and_build(&source).await?;
            print_report(&report, json)
        }
    }
}

async fn cmd_miele(
    engine: Arc<dyn ContainerEngine>,
    notifier: Arc<dyn Notifier>,
    source: &Path,
    config: MieleCiConfig,
    action: MieleAction,
    output: &Path,
    json: bool,
) -> Result<()> {
    let ci = MieleCi::new(Arc::clone(&engine), notifier, host_dir(source)?, config);

    match action {
        MieleAction::Build => {
            let dist = ci.build().await.context("build failed")?;
            save_directory(&dist, output)
        }
        MieleAction::Publish { ghcr } => {
            println!("{}", ci.publish(&ghcr.secret()).await?);
            Ok(())
        }
        MieleAction::Deploy {
            ghcr,
            flyio_app,
            flyio_token,
            flyio_region,
        } => {
            let fly = FlyioTarget::new(engine, flyio_app, Secret::new("FLY_API_TOKEN", flyio_token))
                .with_region(flyio_region);
            let report = ci.deploy(&ghcr.secret(), fly).await?;
            print_report(&report, json)
        }
    }
}

async fn cmd_notify(message: &str, opts: &SendOptions, topic: Option<String>) -> Result<()> {
    let client = NtfyClient::new(NtfyConfig::from_env()).context("Failed to create ntfy client")?;
    let topic = topic.unwrap_or_else(|| client.config().topic.clone());
    let out = client.send(&topic, message, opts).await?;
    println!("{out}");
    Ok(())
}

async fn cmd_deploy(
    engine: Arc<dyn ContainerEngine>,
    notifier: Arc<dyn Notifier>,
    command: DeployCommand,
) -> Result<()> {
    let (target, image): (Box<dyn DeployTarget>, String) = match command {
        DeployCommand::Flyio {
            image,
            app,
            token,
            region,
            internal_port,
        } => (
            Box::new(
                FlyioTarget::new(engine, app, Secret::new("FLY_API_TOKEN", token))
                    .with_region(region)
                    .with_internal_port(internal_port),
            ),
            image,
        ),
        DeployCommand::CloudRun {
            image,
            service,
            project,
            region,
            key,
            allow_unauthenticated,
            artifact_registry_repo,
            artifact_registry_region,
        } => (
            Box::new(
                CloudRunTarget::new(
                    engine,
                    service,
                    project,
                    Secret::new("GCLOUD_SERVICE_ACCOUNT_KEY", key),
                )
                .with_region(region)
                .allow_unauthenticated(allow_unauthenticated)
                .with_artifact_registry(artifact_registry_repo, artifact_registry_region),
            ),
            image,
        ),
        DeployCommand::Render {
            image,
            service_name,
            hook,
        } => {
            let render = RenderTarget::new(Secret::new("RENDER_DEPLOY_HOOK_URL", hook), service_name)
                .context("Failed to create Render client")?
                .pin_image(image.is_some());
            (Box::new(render), image.unwrap_or_default())
        }
    };

    let outcomes = deploy_all(
        std::slice::from_ref(&target),
        &image,
        DeployStrategy::Sequential,
        notifier.as_ref(),
    )
    .await?;
    for outcome in outcomes {
        print!("{}", outcome.output);
        println!("{}: {}", outcome.target, outcome.url);
    }
    Ok(())
}

async fn cmd_crane(engine: &dyn ContainerEngine, action: CraneAction, output: &Path) -> Result<()> {
    let crane = Crane::default();
    let docker_config = |path: Option<PathBuf>| -> Result<Option<Secret>> {
        path.map(|p| Secret::from_file("docker-config", &p))
            .transpose()
            .context("Failed to read docker config")
    };

    let out = match action {
        CraneAction::Ls { repository } => crane.list(engine, &repository).await?,
        CraneAction::Digest { image } => crane.digest(engine, &image).await?,
        CraneAction::Manifest { image } => crane.manifest(engine, &image).await?,
        CraneAction::Config { image } => crane.config(engine, &image).await?,
        CraneAction::Validate { image } => crane.validate(engine, &image).await?,
        CraneAction::Copy {
            source,
            destination,
            docker_config: path,
        } => {
            let auth = docker_config(path)?;
            crane
                .copy(engine, &source, &destination, auth.as_ref())
                .await?
        }
        CraneAction::Tag {
            image,
            tag,
            docker_config: path,
        } => {
            let auth = docker_config(path)?;
            crane.tag(engine, &image, &tag, auth.as_ref()).await?
        }
        CraneAction::Export { image } => {
            let tarball = crane.export(engine, &image).await?;
            return save_file(&tarball, output);
        }
    };
    print!("{out}");
    Ok(())
}

async fn cmd_exec(
    engine: &dyn ContainerEngine,
    name: &str,
    source: Option<PathBuf>,
    args: Vec<String>,
) -> Result<()> {
    let tool = athame_tools::find(name)
        .with_context(|| format!("Unknown tool: {name} (see `athame tools`)"))?;
    let mut spec = tool.base();
    if let Some(source) = source {
        spec = spec
            .with_mounted_directory("/src", &host_dir(&source)?)
            .with_workdir("/src");
    }
    print!("{}", engine.stdout(&spec.with_exec(args)).await?);
    Ok(())
}

async fn cmd_repo(repo: Repo, action: RepoAction, output: &Path) -> Result<()> {
    match action {
        RepoAction::TerraformPlan => {
            print!("{}", repo.terraform_plan().await.context("terraform plan failed")?);
            Ok(())
        }
        RepoAction::TerraformDocs => {
            let dir = repo.terraform_docs().await.context("terraform-docs failed")?;
            save_directory(&dir, output)
        }
        RepoAction::Boilerplate {
            template,
            output_folder,
        } => {
            let dir = repo
                .boilerplate(&template, &output_folder)
                .await
                .context("boilerplate failed")?;
            save_directory(&dir, output)
        }
    }
}

async fn cmd_demo(engine: Arc<dyn ContainerEngine>, action: DemoAction, output: &Path) -> Result<()> {
    match action {
        DemoAction::LocalstackHealth => {
            println!("{}", LocalstackDemo::new(engine).test_localstack().await?);
            Ok(())
        }
        DemoAction::CreateBucket { bucket } => {
            print!("{}", LocalstackDemo::new(engine).create_bucket(&bucket).await?);
            Ok(())
        }
        DemoAction::TerraformApply { source, workdir } => {
            let out = LocalstackDemo::new(engine)
                .terraform_apply(&host_dir(&source)?, &workdir)
                .await?;
            print!("{out}");
            Ok(())
        }
        DemoAction::MkdocsSite { source, site_path } => {
            let site = MkdocsMaterialDemo::new(engine)
                .build_site(&host_dir(&source)?, &site_path)
                .await?;
            save_directory(&site, output)
        }
        DemoAction::GolangciLint { source } => {
            print!("{}", GolangciLintDemo::new(engine).lint(&host_dir(&source)?).await?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn mkdocs_run_parses_deploy_targets() {
        let cli = Cli::try_parse_from([
            "athame",
            "--no-notify",
            "mkdocs-ci",
            "run",
            "--ghcr-token",
            "ghp_x",
            "--flyio-app",
            "docs",
            "--flyio-token",
            "fo1_x",
            "--strategy",
            "sequential",
        ])
        .unwrap();

        let Commands::MkdocsCi {
            action: MkdocsAction::Run { deploy, .. },
            ..
        } = cli.command
        else {
            panic!("expected mkdocs-ci run");
        };
        assert_eq!(deploy.strategy, DeployStrategy::Sequential);

        let engine: Arc<dyn ContainerEngine> =
            Arc::new(athame_engine::fakes::ScriptedEngine::new());
        let targets = deploy.targets(&engine, "mkdocs-demo").unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name(), "Fly.io");
    }

    #[test]
    fn exec_keeps_hyphenated_args() {
        let cli = Cli::try_parse_from(["athame", "exec", "crane", "crane", "ls", "--help"]).unwrap();
        let Commands::Exec { tool, args, .. } = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(tool, "crane");
        assert_eq!(args, ["crane", "ls", "--help"]);
    }

    #[test]
    fn files_land_inside_directory_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("image.tar");
        std::fs::write(&src, b"tar").unwrap();
        let file = HostFile::from_path(&src).unwrap();

        let out = dir.path().join("out");
        save_file(&file, &out).unwrap();
        assert!(out.join("image.tar").is_file());
    }
}
