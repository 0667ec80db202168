//! Trivy vulnerability scanner.

use athame_engine::{ContainerEngine, ContainerSpec, EngineResult};

use crate::ToolImage;

/// Named volume holding the vulnerability database between runs.
pub const CACHE_VOLUME: &str = "trivy-db-cache";

pinned_tool!(
    Trivy,
    "aquasec/trivy",
    "0.67.2@sha256:e2b22eac59c02003d8749f5b8d9bd073b62e30fefaef5b7c8371204e0a4b0c08"
);

/// Scan options shared by image and container scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Comma-separated severities to report.
    pub severity: String,
    /// Exit code when findings are reported; 0 never fails the scan.
    pub exit_code: i32,
    /// `table`, `json`, `sarif`, ...
    pub format: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            severity: "UNKNOWN,LOW,MEDIUM,HIGH,CRITICAL".to_string(),
            exit_code: 0,
            format: "table".to_string(),
        }
    }
}

impl ScanOptions {
    fn args(&self) -> Vec<String> {
        vec![
            "trivy".to_string(),
            "image".to_string(),
            "--quiet".to_string(),
            "--severity".to_string(),
            self.severity.clone(),
            "--exit-code".to_string(),
            self.exit_code.to_string(),
            "--format".to_string(),
            self.format.clone(),
        ]
    }
}

impl Trivy {
    /// Scan a registry image reference.
    pub async fn scan_image(
        &self,
        engine: &dyn ContainerEngine,
        image_ref: &str,
        opts: &ScanOptions,
    ) -> EngineResult<String> {
        let mut args = opts.args();
        args.push(image_ref.to_string());
        engine.stdout(&self.base().with_exec(args)).await
    }

    /// Snapshot `container` as a tarball and scan it under `/scan/<name>`.
    pub async fn scan_container(
        &self,
        engine: &dyn ContainerEngine,
        container: &ContainerSpec,
        name: &str,
        opts: &ScanOptions,
    ) -> EngineResult<String> {
        let tarball = engine.export_tarball(container).await?;
        let path = format!("/scan/{name}");
        let mut args = opts.args();
        args.push("--input".to_string());
        args.push(path.clone());
        engine
            .stdout(&self.base().with_mounted_file(path, &tarball).with_exec(args))
            .await
    }
}

impl ToolImage for Trivy {
    fn name(&self) -> &'static str {
        "trivy"
    }

    /// The database cache is always mounted.
    fn base(&self) -> ContainerSpec {
        self.pinned()
            .with_mounted_cache("/root/.cache/trivy", CACHE_VOLUME)
    }
}
