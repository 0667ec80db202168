//! Arch Linux base image.

use athame_engine::ContainerSpec;

use crate::ToolImage;

pinned_tool!(
    Archlinux,
    "archlinux/archlinux",
    "base-20251019.0.437072@sha256:4524236733437ff1f35531147aa444b32f674d9f328aebe06d3511be575c80a3"
);

impl Archlinux {
    /// Base container with extra packages installed (`pacman -Sy --noconfirm`).
    pub fn with_packages<I, S>(&self, packages: I) -> ContainerSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec!["pacman".to_string(), "-Sy".to_string(), "--noconfirm".to_string()];
        args.extend(packages.into_iter().map(Into::into));
        self.base().with_exec(args)
    }
}

impl ToolImage for Archlinux {
    fn name(&self) -> &'static str {
        "archlinux"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
