//! Repository chores: terraform plan/docs and boilerplate scaffolding.

use std::sync::Arc;

use athame_engine::{ContainerEngine, ContainerSpec, EngineError, EngineResult, HostDirectory};
use athame_tools::boilerplate::Boilerplate;
use athame_tools::terraform::Terraform;
use athame_tools::terraform_docs::TerraformDocs;
use athame_tools::ToolImage;

pub const TERRAFORM_DIR: &str = "fixtures/terraform";
pub const DEFAULT_TEMPLATE: &str =
    "https://github.com/gruntwork-io/boilerplate.git#main:examples/for-learning-and-testing/terraform";
pub const DEFAULT_OUTPUT_FOLDER: &str = "output";

const TEMPLATE_CHECKOUT: &str = "/tmp/template";
const BOILERPLATE_WORKDIR: &str = "/tmp/work";

/// A git template reference: `<url>[#<ref>][:<subpath>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub url: String,
    pub reference: Option<String>,
    pub subpath: Option<String>,
}

impl TemplateSource {
    pub fn parse(src: &str) -> EngineResult<Self> {
        let (url, fragment) = match src.split_once('#') {
            Some((url, fragment)) => (url, Some(fragment)),
            None => (src, None),
        };
        if url.is_empty() {
            return Err(EngineError::InvalidSpec(format!(
                "template source has no URL: {src}"
            )));
        }

        let (reference, subpath) = match fragment {
            Some(f) => match f.split_once(':') {
                Some((r, p)) => (r, Some(p)),
                None => (f, None),
            },
            None => ("", None),
        };

        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Ok(Self {
            url: url.to_string(),
            reference: non_empty(reference),
            subpath: subpath.and_then(|p| non_empty(p.trim_matches('/'))),
        })
    }

    /// `git clone` of the template into `dest`.
    fn clone_command(&self, dest: &str) -> Vec<String> {
        let mut args = vec![
            "git".to_string(),
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
        ];
        if let Some(r) = &self.reference {
            args.push("--branch".to_string());
            args.push(r.clone());
        }
        args.push(self.url.clone());
        args.push(dest.to_string());
        args
    }

    fn template_path(&self, checkout: &str) -> String {
        match &self.subpath {
            Some(p) => format!("{checkout}/{p}"),
            None => checkout.to_string(),
        }
    }
}

pub struct Repo {
    engine: Arc<dyn ContainerEngine>,
    src: HostDirectory,
}

impl Repo {
    pub fn new(engine: Arc<dyn ContainerEngine>, src: HostDirectory) -> Self {
        Self { engine, src }
    }

    fn terraform_dir(&self) -> HostDirectory {
        self.src.directory(TERRAFORM_DIR)
    }

    pub async fn terraform_plan(&self) -> EngineResult<String> {
        let spec = Terraform::default()
            .base()
            .with_mounted_directory("/src", &self.terraform_dir())
            .with_workdir("/src")
            .with_exec(["terraform", "init"])
            .with_exec(["terraform", "plan"]);
        self.engine.stdout(&spec).await
    }

    /// The terraform directory with a generated `README.md`.
    pub async fn terraform_docs(&self) -> EngineResult<HostDirectory> {
        let spec = TerraformDocs::default()
            .base()
            .with_mounted_directory("/src", &self.terraform_dir())
            .with_workdir("/src")
            .with_exec(["sh", "-c", "terraform-docs markdown . > README.md"]);
        self.engine.export_directory(&spec, "/src").await
    }

    pub fn boilerplate_spec(&self, template: &TemplateSource, output_folder: &str) -> ContainerSpec {
        let template_path = template.template_path(TEMPLATE_CHECKOUT);
        Boilerplate::default()
            .base()
            .with_exec(template.clone_command(TEMPLATE_CHECKOUT))
            .with_workdir(BOILERPLATE_WORKDIR)
            .with_exec([
                "boilerplate",
                "--template-url",
                template_path.as_str(),
                "--output-folder",
                output_folder,
                "--var",
                "ServerName=MyServer",
                "--non-interactive",
            ])
    }

    /// Render `template_src` into `output_folder` and return it.
    pub async fn boilerplate(
        &self,
        template_src: &str,
        output_folder: &str,
    ) -> EngineResult<HostDirectory> {
        let template = TemplateSource::parse(template_src)?;
        let spec = self.boilerplate_spec(&template, output_folder);
        self.engine
            .export_directory(&spec, &format!("{BOILERPLATE_WORKDIR}/{output_folder}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athame_engine::fakes::{CallKind, ScriptedEngine};

    #[test]
    fn parses_ref_and_subpath() {
        let t = TemplateSource::parse(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(t.url, "https://github.com/gruntwork-io/boilerplate.git");
        assert_eq!(t.reference.as_deref(), Some("main"));
        assert_eq!(
            t.subpath.as_deref(),
            Some("examples/for-learning-and-testing/terraform")
        );

        let bare = TemplateSource::parse("https://example.com/t.git").unwrap();
        assert_eq!(bare.reference, None);
        assert_eq!(bare.template_path("/tmp/template"), "/tmp/template");

        assert!(TemplateSource::parse("#main").is_err());
    }

    #[test]
    fn clone_pins_the_branch() {
        let t = TemplateSource::parse("https://example.com/t.git#v1.2.0").unwrap();
        assert_eq!(
            t.clone_command("/tmp/template").join(" "),
            "git clone --depth 1 --branch v1.2.0 https://example.com/t.git /tmp/template"
        );
    }

    #[tokio::test]
    async fn boilerplate_exports_output_folder() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let repo = Repo::new(
            Arc::new(engine.clone()),
            HostDirectory::from_path(dir.path()).unwrap(),
        );

        repo.boilerplate(DEFAULT_TEMPLATE, DEFAULT_OUTPUT_FOLDER)
            .await
            .unwrap();
        let call = &engine.calls()[0];
        assert_eq!(call.kind, CallKind::ExportDirectory("/tmp/work/output".into()));
        assert!(call.command_line().contains(
            "--template-url /tmp/template/examples/for-learning-and-testing/terraform"
        ));
    }

    #[tokio::test]
    async fn terraform_docs_writes_readme() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let repo = Repo::new(
            Arc::new(engine.clone()),
            HostDirectory::from_path(dir.path()).unwrap(),
        );
        repo.terraform_docs().await.unwrap();
        let call = &engine.calls()[0];
        assert_eq!(call.kind, CallKind::ExportDirectory("/src".into()));
        assert_eq!(call.command_line(), "sh -c terraform-docs markdown . > README.md");
    }
}
