//! Material for MkDocs site builder.

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult, HostDirectory};

use crate::ToolImage;

/// Where the built site ends up inside the container.
pub const SITE_DIR: &str = "/docs/site";

pinned_tool!(
    MkdocsMaterial,
    "squidfunk/mkdocs-material",
    "9.6.22@sha256:f5c556a6d30ce0c1c0df10e3c38c79bbcafdaea4b1c1be366809d0d4f6f9d57f"
);

impl MkdocsMaterial {
    /// `mkdocs build` over `source` (the directory holding `mkdocs.yml`).
    /// The output is at [`SITE_DIR`].
    pub fn build(&self, source: &HostDirectory) -> ContainerSpec {
        self.base()
            .with_mounted_directory("/docs", source)
            .with_workdir("/docs")
            .with_exec(["mkdocs", "build"])
    }

    /// Build and export the site directory.
    pub async fn build_site(
        &self,
        engine: &dyn ContainerEngine,
        source: &HostDirectory,
    ) -> EngineResult<HostDirectory> {
        engine.export_directory(&self.build(source), SITE_DIR).await
    }
}

impl ToolImage for MkdocsMaterial {
    fn name(&self) -> &'static str {
        "mkdocs-material"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athame_engine::fakes::{CallKind, ScriptedEngine};

    #[tokio::test]
    async fn build_site_exports_site_dir() {
        let src = tempfile::tempdir().unwrap();
        let source = HostDirectory::from_path(src.path()).unwrap();
        let engine = ScriptedEngine::new();

        MkdocsMaterial::default()
            .build_site(&engine, &source)
            .await
            .unwrap();

        let call = &engine.calls()[0];
        assert_eq!(call.kind, CallKind::ExportDirectory("/docs/site".into()));
        assert_eq!(call.command_line(), "mkdocs build");
    }
}
