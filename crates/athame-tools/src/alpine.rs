//! Alpine Linux base image.

use athame_engine::ContainerSpec;

use crate::ToolImage;

pinned_tool!(
    /// `alpine` with `apk` for adding packages.
    Alpine,
    "alpine",
    "3.22.2@sha256:4b7ce07002c69e8f3d704a9c5d6fd3053be500b7f1c69fc0d80990c2ad8dd412"
);

impl Alpine {
    /// Base container with extra packages installed (`apk add --no-cache`).
    pub fn with_packages<I, S>(&self, packages: I) -> ContainerSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec!["apk".to_string(), "add".to_string(), "--no-cache".to_string()];
        args.extend(packages.into_iter().map(Into::into));
        self.base().with_exec(args)
    }
}

impl ToolImage for Alpine {
    fn name(&self) -> &'static str {
        "alpine"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_packages_runs_apk() {
        let spec = Alpine::default().with_packages(["curl", "git"]);
        assert_eq!(
            spec.last_exec().unwrap(),
            ["apk", "add", "--no-cache", "curl", "git"]
        );
        assert!(spec.image().starts_with("alpine:3.22.2@sha256:"));
    }
}
