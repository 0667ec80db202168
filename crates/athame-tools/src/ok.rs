//! `ok` (oslokommune/ok) installed with mise.

use athame_engine::ContainerSpec;

use crate::mise::Mise;
use crate::ToolImage;

const SHIMS: &str = "/root/.local/share/mise/shims";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OkCli {
    mise: Mise,
}

impl ToolImage for OkCli {
    fn name(&self) -> &'static str {
        "ok"
    }

    fn base(&self) -> ContainerSpec {
        self.mise
            .base()
            .with_exec(["mise", "use", "--global", "ubi:oslokommune/ok"])
            .with_expanded_env_variable("PATH", format!("{SHIMS}:$PATH"))
    }
}
