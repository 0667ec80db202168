//! Gruntwork boilerplate, installed through asdf.

use athame_engine::ContainerSpec;

use crate::asdf::Asdf;
use crate::ToolImage;

pub const DEFAULT_VERSION: &str = "0.10.1";
const PLUGIN_URL: &str = "https://github.com/gruntwork-io/asdf-boilerplate.git";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boilerplate {
    version: String,
    asdf: Asdf,
}

impl Boilerplate {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            asdf: Asdf::default(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for Boilerplate {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION)
    }
}

impl ToolImage for Boilerplate {
    fn name(&self) -> &'static str {
        "boilerplate"
    }

    /// git and ssh are installed as root, the plugin as the `asdf` user.
    fn base(&self) -> ContainerSpec {
        self.asdf
            .base()
            .with_user("root")
            .with_exec(["apk", "add", "--no-cache", "git", "openssh-client"])
            .with_user("asdf")
            .with_exec(["asdf", "plugin", "add", "boilerplate", PLUGIN_URL])
            .with_exec(["asdf", "install", "boilerplate", self.version.as_str()])
            .with_exec(["asdf", "set", "boilerplate", self.version.as_str()])
    }
}
