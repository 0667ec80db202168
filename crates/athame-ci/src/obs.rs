//! Structured events for pipeline lifecycles.
//!
//! Every pipeline run is wrapped in a `athame.pipeline` span carrying
//! `pipeline` and `run_id`; phases and notifications log inside it.

use tracing::{info, warn, Span};

use crate::phase::Phase;

/// Span tagging every log line of one pipeline run.
///
/// Attach it with [`tracing::Instrument::instrument`] so it follows the
/// future across await points.
pub fn pipeline_span(pipeline: &str, run_id: &str) -> Span {
    tracing::info_span!("athame.pipeline", pipeline = %pipeline, run_id = %run_id)
}

pub fn emit_pipeline_started(pipeline: &str, run_id: &str) {
    info!(event = "pipeline.started", pipeline = %pipeline, run_id = %run_id);
}

pub fn emit_pipeline_finished(run_id: &str, duration_ms: u64, phases: usize, success: bool) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        phases = phases,
        success = success,
    );
}

pub fn emit_phase_started(phase: Phase) {
    info!(event = "phase.started", phase = %phase);
}

pub fn emit_phase_finished(phase: Phase, duration_ms: u64, success: bool) {
    info!(
        event = "phase.finished",
        phase = %phase,
        duration_ms = duration_ms,
        success = success,
    );
}

/// A check inside a fan-out finished.
pub fn emit_task_finished(task: &str, duration_ms: u64, success: bool) {
    info!(event = "task.finished", task = %task, duration_ms = duration_ms, success = success);
}

/// Notification delivery failed; the pipeline carries on.
pub fn emit_notification_failed(title: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "notification.failed",
        title = %title,
        "Failed to send notification '{}': {}",
        title,
        error
    );
}

pub fn emit_deploy_finished(target: &str, url: Option<&str>, success: bool) {
    info!(event = "deploy.finished", target = %target, url = ?url, success = success);
}
