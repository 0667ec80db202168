//! Athame Tools - one module per wrapped command line tool
//!
//! Each module pins a container image (`tag@digest`), exposes a `base()`
//! container with the entrypoint cleared, and a handful of methods that run
//! one fixed command. Tools that talk HTTP directly (`ntfy`, `render`) do not
//! need a container at all.

use athame_engine::ContainerSpec;

/// Declares the image-tag holder shared by every pinned tool.
macro_rules! pinned_tool {
    ($(#[$meta:meta])* $ty:ident, $repository:literal, $tag:literal) => {
        /// Image repository.
        pub const IMAGE_REPOSITORY: &str = $repository;

        /// Pinned default image tag.
        pub const DEFAULT_IMAGE_TAG: &str = $tag;

        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $ty {
            image_tag: String,
        }

        impl $ty {
            pub fn new(image_tag: impl Into<String>) -> Self {
                Self {
                    image_tag: image_tag.into(),
                }
            }

            pub fn image_tag(&self) -> &str {
                &self.image_tag
            }

            /// Full image reference.
            pub fn image(&self) -> String {
                format!("{}:{}", IMAGE_REPOSITORY, self.image_tag)
            }

            fn pinned(&self) -> athame_engine::ContainerSpec {
                athame_engine::ContainerSpec::from_image(self.image()).without_entrypoint()
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new(DEFAULT_IMAGE_TAG)
            }
        }
    };
}

pub mod alpine;
pub mod apprise;
pub mod archlinux;
pub mod asdf;
pub mod aws_cli;
pub mod boilerplate;
pub mod crane;
pub mod error;
pub mod flyio;
pub mod gcloud;
pub mod github_cli;
pub mod golangci_lint;
pub mod gosec;
pub mod httpie;
pub mod localstack;
pub mod lychee;
pub mod markdownlint;
pub mod mermaid;
pub mod mise;
pub mod mkdocs_material;
pub mod node;
pub mod ntfy;
pub mod ok;
pub mod oras;
pub mod prettier;
pub mod release_please;
pub mod render;
pub mod renovate;
pub mod terraform;
pub mod terraform_docs;
pub mod trivy;
pub mod uv;
pub mod vale;

pub use error::{ToolError, ToolResult};

/// A tool that can hand out its base container.
pub trait ToolImage: Send + Sync {
    /// Name used on the command line (`athame exec <name>`).
    fn name(&self) -> &'static str;

    /// Base container: pinned image, entrypoint cleared, tool installed.
    fn base(&self) -> ContainerSpec;
}

/// Every container-backed tool with its default configuration.
pub fn catalog() -> Vec<Box<dyn ToolImage>> {
    vec![
        Box::new(alpine::Alpine::default()),
        Box::new(apprise::Apprise::default()),
        Box::new(archlinux::Archlinux::default()),
        Box::new(asdf::Asdf::default()),
        Box::new(aws_cli::AwsCli::default()),
        Box::new(boilerplate::Boilerplate::default()),
        Box::new(crane::Crane::default()),
        Box::new(flyio::Flyio::default()),
        Box::new(gcloud::Gcloud::default()),
        Box::new(github_cli::GithubCli::default()),
        Box::new(golangci_lint::GolangciLint::default()),
        Box::new(gosec::Gosec::default()),
        Box::new(httpie::Httpie::default()),
        Box::new(localstack::Localstack::default()),
        Box::new(lychee::Lychee::default()),
        Box::new(markdownlint::Markdownlint::default()),
        Box::new(mermaid::Mermaid::default()),
        Box::new(mise::Mise::default()),
        Box::new(mkdocs_material::MkdocsMaterial::default()),
        Box::new(node::Node::default()),
        Box::new(ok::OkCli::default()),
        Box::new(oras::Oras::default()),
        Box::new(prettier::Prettier::default()),
        Box::new(release_please::ReleasePlease::default()),
        Box::new(renovate::Renovate::default()),
        Box::new(terraform::Terraform::default()),
        Box::new(terraform_docs::TerraformDocs::default()),
        Box::new(trivy::Trivy::default()),
        Box::new(uv::Uv::default()),
        Box::new(vale::Vale::default()),
    ]
}

/// Look a tool up by name.
pub fn find(name: &str) -> Option<Box<dyn ToolImage>> {
    catalog().into_iter().find(|t| t.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use athame_engine::{ImageRef, Op};
    use std::collections::HashSet;

    #[test]
    fn catalog_names_are_unique() {
        let names: Vec<_> = catalog().iter().map(|t| t.name()).collect();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(names.len(), unique.len());
    }

    #[test]
    fn every_base_image_is_a_valid_reference() {
        for tool in catalog() {
            let base = tool.base();
            assert!(
                ImageRef::parse(base.image()).is_ok(),
                "{} has unparsable image {}",
                tool.name(),
                base.image()
            );
        }
    }

    #[test]
    fn pinned_images_clear_the_entrypoint() {
        let base = vale::Vale::default().base();
        assert!(matches!(base.ops().first(), Some(Op::Entrypoint(e)) if e.is_empty()));
    }

    #[test]
    fn find_by_name() {
        assert!(find("crane").is_some());
        assert!(find("nope").is_none());
    }
}
