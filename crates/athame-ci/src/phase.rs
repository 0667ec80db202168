//! Pipeline phases and the run report.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::obs;

/// Phases in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Verify,
    Build,
    Scan,
    Publish,
    Deploy,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Verify => "verify",
            Phase::Build => "build",
            Phase::Scan => "scan",
            Phase::Publish => "publish",
            Phase::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub success: bool,
    pub duration_ms: u64,
    /// Error text for failed phases.
    pub error: Option<String>,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub phases: Vec<PhaseRecord>,
    /// Published image address, when the run got that far.
    pub address: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn passed_count(&self) -> usize {
        self.phases.iter().filter(|p| p.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.phases.iter().filter(|p| !p.success).count()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// Tracks the phases of a run as they happen.
#[derive(Debug)]
pub struct PipelineRun {
    run_id: String,
    pipeline: String,
    started_at: DateTime<Utc>,
    started: Instant,
    phases: Vec<PhaseRecord>,
    address: Option<String>,
}

impl PipelineRun {
    pub fn start(pipeline: &str) -> Self {
        let run_id = Uuid::new_v4().to_string();
        obs::emit_pipeline_started(pipeline, &run_id);
        Self {
            run_id,
            pipeline: pipeline.to_string(),
            started_at: Utc::now(),
            started: Instant::now(),
            phases: Vec::new(),
            address: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Run `work` as `phase`.
    ///
    /// Refuses to start a phase that is not strictly after the last one, or
    /// any phase once a previous one failed.
    pub async fn phase<T, F>(&mut self, phase: Phase, work: F) -> PipelineResult<T>
    where
        F: Future<Output = PipelineResult<T>>,
    {
        if let Some(last) = self.phases.last() {
            if !last.success || phase <= last.phase {
                return Err(PipelineError::PhaseOrder {
                    phase: phase.to_string(),
                    after: last.phase.to_string(),
                });
            }
        }

        obs::emit_phase_started(phase);
        let start = Instant::now();
        let result = work.await;
        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_phase_finished(phase, duration_ms, result.is_ok());

        self.phases.push(PhaseRecord {
            phase,
            success: result.is_ok(),
            duration_ms,
            error: result.as_ref().err().map(|e| e.to_string()),
        });
        result
    }

    pub fn set_address(&mut self, address: &str) {
        self.address = Some(address.to_string());
    }

    /// Close the run: a report on success, `result`'s error otherwise.
    pub fn finish(self, result: PipelineResult<()>) -> PipelineResult<PipelineReport> {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let success = result.is_ok();
        obs::emit_pipeline_finished(&self.run_id, duration_ms, self.phases.len(), success);
        result?;
        Ok(PipelineReport {
            run_id: self.run_id,
            pipeline: self.pipeline,
            started_at: self.started_at,
            phases: self.phases,
            address: self.address,
            success,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn phases_record_in_order() {
        let mut run = PipelineRun::start("test");
        run.phase(Phase::Verify, async { Ok(()) }).await.unwrap();
        let addr = run
            .phase(Phase::Publish, async { Ok("ghcr.io/o/i:1".to_string()) })
            .await
            .unwrap();
        run.set_address(&addr);

        let report = run.finish(Ok(())).unwrap();
        assert_eq!(report.passed_count(), 2);
        assert_eq!(report.failed_count(), 0);
        assert!(report.phase(Phase::Build).is_none());
        assert_eq!(report.address.as_deref(), Some("ghcr.io/o/i:1"));
    }

    #[tokio::test]
    async fn no_phase_after_failure() {
        let mut run = PipelineRun::start("test");
        let err = run
            .phase(Phase::Verify, async {
                Err::<(), _>(PipelineError::Build(athame_engine::EngineError::InvalidSpec(
                    "no source".into(),
                )))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Build(_)));

        let again = run.phase(Phase::Build, async { Ok(()) }).await;
        assert!(matches!(again, Err(PipelineError::PhaseOrder { .. })));
    }

    #[tokio::test]
    async fn phases_cannot_go_backwards() {
        let mut run = PipelineRun::start("test");
        run.phase(Phase::Build, async { Ok(()) }).await.unwrap();
        let err = run.phase(Phase::Verify, async { Ok(()) }).await.unwrap_err();
        assert_eq!(err.to_string(), "phase verify cannot run after build");
    }

    #[test]
    fn phase_ordering() {
        assert!(Phase::Verify < Phase::Build);
        assert!(Phase::Scan < Phase::Publish);
        assert!(Phase::Publish < Phase::Deploy);
        assert_eq!(serde_json::to_string(&Phase::Scan).unwrap(), "\"scan\"");
    }
}
