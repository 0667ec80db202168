//! HashiCorp Terraform.

use athame_engine::ContainerSpec;

use crate::ToolImage;

pinned_tool!(
    Terraform,
    "hashicorp/terraform",
    "1.13.4@sha256:eebc943e69008b6d6d986800087164274d8c92d83db8d53fb9baa4ccff309884"
);

impl Terraform {
    /// Terraform plus `terraform-local` (`tflocal`) for LocalStack.
    pub fn terraform_local(&self) -> ContainerSpec {
        self.base()
            .with_exec(["apk", "add", "--no-cache", "py3-pip"])
            .with_exec([
                "pip",
                "install",
                "--break-system-packages",
                "terraform-local",
            ])
    }
}

impl ToolImage for Terraform {
    fn name(&self) -> &'static str {
        "terraform"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
