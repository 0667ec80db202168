//! asdf version manager image.

use athame_engine::ContainerSpec;

use crate::ToolImage;

pinned_tool!(
    Asdf,
    "asdfvm/asdf",
    "alpine-v0.17.0@sha256:9744fdf066a668d477186560e2680f87bc935d6f1f17d020c00db83e1006d187"
);

impl Asdf {
    /// Add a plugin, install `version` and make it the active one.
    pub fn install_plugin(&self, plugin: &str, url: &str, version: &str) -> ContainerSpec {
        self.base()
            .with_exec(["asdf", "plugin", "add", plugin, url])
            .with_exec(["asdf", "install", plugin, version])
            .with_exec(["asdf", "set", plugin, version])
    }
}

impl ToolImage for Asdf {
    fn name(&self) -> &'static str {
        "asdf"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
