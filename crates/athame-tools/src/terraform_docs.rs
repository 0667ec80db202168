//! terraform-docs Markdown generator.

use athame_engine::ContainerSpec;

use crate::ToolImage;

pinned_tool!(TerraformDocs, "quay.io/terraform-docs/terraform-docs", "0.20.0@sha256:37329e2dc2518e7f719a986a3954b10771c3fe000f50f83fd4d98d489df2eae2");

impl ToolImage for TerraformDocs {
    fn name(&self) -> &'static str {
        "terraform-docs"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
