//! Mermaid diagram renderer.

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult, HostDirectory, HostFile};

use crate::ToolImage;

pinned_tool!(
    Mermaid,
    "minlag/mermaid-cli",
    "11.12.0@sha256:bad64c9d9ad917c8dfbe9d9e9c162b96f6615ff019b37058638d16eb27ce7783"
);

impl Mermaid {
    /// `mmdc -i <input> -o <output>` with `source` mounted at `/data`.
    pub fn render_spec(&self, source: &HostDirectory, input: &str, output: &str) -> ContainerSpec {
        self.base()
            .with_mounted_directory("/data", source)
            .with_workdir("/data")
            .with_exec(["mmdc", "-i", input, "-o", output])
    }

    /// Render a diagram and export the output file.
    pub async fn render(
        &self,
        engine: &dyn ContainerEngine,
        source: &HostDirectory,
        input: &str,
        output: &str,
    ) -> EngineResult<HostFile> {
        let path = format!("/data/{output}");
        engine
            .export_file(&self.render_spec(source, input, output), &path)
            .await
    }
}

impl ToolImage for Mermaid {
    fn name(&self) -> &'static str {
        "mermaid"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
