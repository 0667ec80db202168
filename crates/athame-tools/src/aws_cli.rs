//! AWS CLI image.

use athame_engine::ContainerSpec;

use crate::localstack::{LOCALSTACK_ALIAS, LOCALSTACK_PORT};
use crate::ToolImage;

pinned_tool!(
    AwsCli,
    "amazon/aws-cli",
    "2.31.26@sha256:cf1851fa3162c35009b2dc6d2df2797e5b0e9723fe546f545c9fa34a3dc03477"
);

impl AwsCli {
    /// Base container pointed at a LocalStack service bound as `localstack`,
    /// with LocalStack's test credentials.
    pub fn localstack(&self) -> ContainerSpec {
        self.base()
            .with_env_variable("AWS_ACCESS_KEY_ID", "test")
            .with_env_variable("AWS_SECRET_ACCESS_KEY", "test")
            .with_env_variable("AWS_DEFAULT_REGION", "us-east-1")
            .with_env_variable(
                "AWS_ENDPOINT_URL",
                format!("http://{LOCALSTACK_ALIAS}:{LOCALSTACK_PORT}"),
            )
    }
}

impl ToolImage for AwsCli {
    fn name(&self) -> &'static str {
        "aws-cli"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}
