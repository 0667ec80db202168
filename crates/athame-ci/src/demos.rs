//! Small demonstrations of tool modules working together.

use std::sync::Arc;

use athame_engine::{ContainerEngine, EngineResult, HostDirectory};
use athame_tools::alpine::Alpine;
use athame_tools::aws_cli::AwsCli;
use athame_tools::golangci_lint::GolangciLint;
use athame_tools::localstack::{Localstack, LOCALSTACK_ALIAS, LOCALSTACK_PORT};
use athame_tools::mkdocs_material::MkdocsMaterial;
use athame_tools::terraform::Terraform;

pub const DEFAULT_BUCKET: &str = "demo-bucket";
pub const DEFAULT_TERRAFORM_WORKDIR: &str = "fixtures/terraform-localstack";
pub const DEFAULT_SITE_PATH: &str = "fixtures/mkdocs-material";

fn localstack_endpoint() -> String {
    format!("http://{LOCALSTACK_ALIAS}:{LOCALSTACK_PORT}")
}

/// LocalStack as a service dependency.
pub struct LocalstackDemo {
    engine: Arc<dyn ContainerEngine>,
}

impl LocalstackDemo {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Query LocalStack's health endpoint from a bound container.
    pub async fn test_localstack(&self) -> EngineResult<String> {
        let spec = Alpine::default()
            .with_packages(["curl"])
            .with_service_binding(LOCALSTACK_ALIAS, Localstack::default().run())
            .with_exec([
                "curl".to_string(),
                "-s".to_string(),
                format!("{}/_localstack/health", localstack_endpoint()),
            ]);
        self.engine.stdout(&spec).await
    }

    pub async fn create_bucket(&self, bucket: &str) -> EngineResult<String> {
        let spec = AwsCli::default()
            .localstack()
            .with_service_binding(LOCALSTACK_ALIAS, Localstack::default().run())
            .with_exec(["aws".to_string(), "s3".to_string(), "mb".to_string(), format!("s3://{bucket}")]);
        self.engine.stdout(&spec).await
    }

    /// `tflocal init` + `tflocal apply` in `source/workdir` against LocalStack.
    pub async fn terraform_apply(
        &self,
        source: &HostDirectory,
        workdir: &str,
    ) -> EngineResult<String> {
        // S3_HOSTNAME makes terraform-local use path-style bucket URLs.
        let spec = Terraform::default()
            .terraform_local()
            .with_service_binding(LOCALSTACK_ALIAS, Localstack::default().run())
            .with_env_variable("AWS_ENDPOINT_URL", localstack_endpoint())
            .with_env_variable("S3_HOSTNAME", LOCALSTACK_ALIAS)
            .with_mounted_directory("/work", source)
            .with_workdir(format!("/work/{}", workdir.trim_matches('/')))
            .with_exec(["tflocal", "init"])
            .with_exec(["tflocal", "apply", "-auto-approve"]);
        self.engine.stdout(&spec).await
    }
}

pub struct MkdocsMaterialDemo {
    engine: Arc<dyn ContainerEngine>,
}

impl MkdocsMaterialDemo {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    pub async fn build_site(
        &self,
        source: &HostDirectory,
        site_path: &str,
    ) -> EngineResult<HostDirectory> {
        MkdocsMaterial::default()
            .build_site(self.engine.as_ref(), &source.directory(site_path))
            .await
    }
}

pub struct GolangciLintDemo {
    engine: Arc<dyn ContainerEngine>,
}

impl GolangciLintDemo {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    pub async fn lint(&self, source: &HostDirectory) -> EngineResult<String> {
        self.engine
            .stdout(&GolangciLint::default().lint(source, &[]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athame_engine::fakes::ScriptedEngine;

    #[tokio::test]
    async fn health_check_binds_localstack() {
        let engine = ScriptedEngine::new().respond_when("_localstack/health", r#"{"services":{}}"#);
        let out = LocalstackDemo::new(Arc::new(engine.clone()))
            .test_localstack()
            .await
            .unwrap();
        assert_eq!(out, r#"{"services":{}}"#);

        let call = &engine.calls()[0];
        assert_eq!(call.command_line(), "curl -s http://localstack:4566/_localstack/health");
        let spec = call.spec.as_ref().unwrap();
        let services = spec.services();
        assert_eq!(services[0].0, "localstack");
        assert_eq!(services[0].1.exposed_ports(), vec![4566]);
    }

    #[tokio::test]
    async fn create_bucket_uses_s3_uri() {
        let engine = ScriptedEngine::new();
        LocalstackDemo::new(Arc::new(engine.clone()))
            .create_bucket(DEFAULT_BUCKET)
            .await
            .unwrap();
        assert_eq!(engine.calls()[0].command_line(), "aws s3 mb s3://demo-bucket");
    }

    #[tokio::test]
    async fn terraform_apply_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let source = HostDirectory::from_path(dir.path()).unwrap();
        let engine = ScriptedEngine::new();
        LocalstackDemo::new(Arc::new(engine.clone()))
            .terraform_apply(&source, DEFAULT_TERRAFORM_WORKDIR)
            .await
            .unwrap();

        let call = &engine.calls()[0];
        assert_eq!(call.command_line(), "tflocal apply -auto-approve");
        assert_eq!(
            call.spec.as_ref().unwrap().workdir(),
            Some("/work/fixtures/terraform-localstack")
        );
    }

    #[tokio::test]
    async fn golangci_demo_lints_current_module() {
        let dir = tempfile::tempdir().unwrap();
        let source = HostDirectory::from_path(dir.path()).unwrap();
        let engine = ScriptedEngine::new();
        GolangciLintDemo::new(Arc::new(engine.clone()))
            .lint(&source)
            .await
            .unwrap();
        assert_eq!(engine.calls()[0].command_line(), "golangci-lint run");
    }
}
