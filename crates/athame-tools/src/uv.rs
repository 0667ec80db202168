//! uv Python package manager.

use athame_engine::ContainerSpec;

use crate::ToolImage;

pinned_tool!(
    Uv,
    "ghcr.io/astral-sh/uv",
    "0.9.7-alpine3.22@sha256:ce2e7e691797f9bd2ee1b15fe59d272cb26d9662eda746e0fc1542c74a558064"
);

impl Uv {
    /// `uv tool install <name><version>`; `version` is a specifier such as
    /// `==1.2.0`, empty for latest.
    pub fn tool_install(&self, name: &str, version: &str) -> ContainerSpec {
        self.base()
            .with_exec(["uv", "tool", "install", format!("{name}{version}").as_str()])
    }
}

impl ToolImage for Uv {
    fn name(&self) -> &'static str {
        "uv"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_specifier_is_appended() {
        let spec = Uv::default().tool_install("ruff", "==0.14.0");
        assert_eq!(spec.last_exec().unwrap(), ["uv", "tool", "install", "ruff==0.14.0"]);
        let latest = Uv::default().tool_install("ruff", "");
        assert_eq!(latest.last_exec().unwrap()[3], "ruff");
    }
}
