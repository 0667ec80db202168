//! HTTPie command line HTTP client.

use athame_engine::ContainerSpec;

use crate::ToolImage;

pinned_tool!(Httpie, "alpine/httpie", "3.2.4@sha256:cd81ee5ddd4970cc3175fddf1fdfad8df909a473eb5f82547e37ab510ed62fc5");

impl ToolImage for Httpie {
    fn name(&self) -> &'static str {
        "httpie"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
