//! mise, installed from the Arch repositories.

use athame_engine::ContainerSpec;

use crate::archlinux::Archlinux;
use crate::ToolImage;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mise {
    archlinux: Archlinux,
}

impl Mise {
    /// Use a specific Arch Linux image tag.
    pub fn new(image_tag: impl Into<String>) -> Self {
        Self {
            archlinux: Archlinux::new(image_tag),
        }
    }
}

impl ToolImage for Mise {
    fn name(&self) -> &'static str {
        "mise"
    }

    fn base(&self) -> ContainerSpec {
        self.archlinux.with_packages(["mise"])
    }
}
