//! Concurrent checks with join-all semantics.
//!
//! Every task runs to completion (unless [`FanOutPolicy::fail_fast`] is
//! set) and the first failure by completion time is reported after the
//! whole set has finished.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use athame_engine::{ContainerEngine, ContainerSpec};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::CheckError;
use crate::obs;

/// One named check.
#[derive(Debug, Clone)]
pub struct CheckTask {
    pub name: String,
    pub spec: ContainerSpec,
}

impl CheckTask {
    pub fn new(name: impl Into<String>, spec: ContainerSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutPolicy {
    /// Abort the remaining tasks as soon as one fails.
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskOutcome {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub output: String,
    pub error: Option<String>,
}

/// Result of a fan-out: outcomes in completion order.
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub outcomes: Vec<TaskOutcome>,
    first_error: Option<CheckError>,
}

impl FanOutReport {
    pub fn first_error(&self) -> Option<&CheckError> {
        self.first_error.as_ref()
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    pub fn outcome(&self, name: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn into_result(self) -> Result<Vec<TaskOutcome>, CheckError> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.outcomes),
        }
    }
}

/// Run `tasks` concurrently on `engine` and wait for all of them.
pub async fn run_checks(
    engine: Arc<dyn ContainerEngine>,
    tasks: Vec<CheckTask>,
    policy: FanOutPolicy,
) -> FanOutReport {
    let names: Vec<String> = tasks.iter().map(|t| t.name.clone()).collect();
    let mut join_set = JoinSet::new();
    let mut ids = HashMap::new();

    for (idx, task) in tasks.into_iter().enumerate() {
        let engine = Arc::clone(&engine);
        let handle = join_set.spawn(async move {
            let start = Instant::now();
            let result = engine.stdout(&task.spec).await;
            (idx, start.elapsed().as_millis() as u64, result)
        });
        ids.insert(handle.id(), idx);
    }

    let mut report = FanOutReport::default();
    let mut finished = vec![false; names.len()];

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, duration_ms, result)) => {
                finished[idx] = true;
                let name = names[idx].clone();
                obs::emit_task_finished(&name, duration_ms, result.is_ok());
                match result {
                    Ok(output) => report.outcomes.push(TaskOutcome {
                        name,
                        success: true,
                        duration_ms,
                        output,
                        error: None,
                    }),
                    Err(e) => {
                        report.outcomes.push(TaskOutcome {
                            name: name.clone(),
                            success: false,
                            duration_ms,
                            output: String::new(),
                            error: Some(e.to_string()),
                        });
                        if report.first_error.is_none() {
                            report.first_error = Some(CheckError::Failed {
                                task: name,
                                source: e,
                            });
                            if policy.fail_fast {
                                debug!("aborting remaining checks");
                                join_set.abort_all();
                            }
                        }
                    }
                }
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                let Some(&idx) = ids.get(&e.id()) else {
                    continue;
                };
                finished[idx] = true;
                let name = names[idx].clone();
                report.outcomes.push(TaskOutcome {
                    name: name.clone(),
                    success: false,
                    duration_ms: 0,
                    output: String::new(),
                    error: Some(e.to_string()),
                });
                report.first_error.get_or_insert(CheckError::Aborted {
                    task: name,
                    reason: e.to_string(),
                });
            }
        }
    }

    for (idx, name) in names.into_iter().enumerate() {
        if !finished[idx] {
            report.outcomes.push(TaskOutcome {
                name,
                success: false,
                duration_ms: 0,
                output: String::new(),
                error: Some("cancelled".to_string()),
            });
        }
    }

    report
}

/// Drive `futures` concurrently to completion.
///
/// Returns the successful values in completion order, or the first error
/// by completion time once every future has finished.
pub async fn join_all_first_error<I, F, T, E>(futures: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let mut pending: FuturesUnordered<F> = futures.into_iter().collect();
    let mut values = Vec::new();
    let mut first_error = None;

    while let Some(result) = pending.next().await {
        match result {
            Ok(v) => values.push(v),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athame_engine::fakes::ScriptedEngine;
    use std::time::Duration;

    fn task(name: &str) -> CheckTask {
        CheckTask::new(name, ContainerSpec::from_image("alpine").with_exec([name, "run"]))
    }

    #[tokio::test]
    async fn all_tasks_run_when_one_fails() {
        let engine = ScriptedEngine::new()
            .fail_when("vale", "spelling")
            .with_delay("lychee", Duration::from_millis(30));
        let tasks = vec![task("vale"), task("prettier"), task("markdownlint"), task("lychee")];

        let report = run_checks(Arc::new(engine.clone()), tasks, FanOutPolicy::default()).await;

        assert_eq!(engine.calls().len(), 4);
        assert_eq!(report.passed_count(), 3);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.first_error().map(|e| e.task()), Some("vale"));
        assert!(report.outcome("lychee").unwrap().success);
    }

    #[tokio::test]
    async fn first_error_is_earliest_to_complete() {
        let engine = ScriptedEngine::new()
            .fail_when("slow", "slow failure")
            .with_delay("slow", Duration::from_millis(60))
            .fail_when("quick", "quick failure");
        let tasks = vec![task("slow"), task("quick")];

        let report = run_checks(Arc::new(engine), tasks, FanOutPolicy::default()).await;

        assert_eq!(report.failed_count(), 2);
        let err = report.into_result().unwrap_err();
        assert_eq!(err.task(), "quick");
        assert!(err.to_string().contains("quick failure"));
    }

    #[tokio::test]
    async fn fail_fast_cancels_the_rest() {
        let engine = ScriptedEngine::new()
            .fail_when("quick", "boom")
            .with_delay("slow", Duration::from_secs(5));
        let tasks = vec![task("slow"), task("quick")];

        let report = run_checks(
            Arc::new(engine.clone()),
            tasks,
            FanOutPolicy { fail_fast: true },
        )
        .await;

        assert_eq!(report.first_error().map(|e| e.task()), Some("quick"));
        let slow = report.outcome("slow").unwrap();
        assert_eq!(slow.error.as_deref(), Some("cancelled"));
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn empty_fan_out_succeeds() {
        let report = run_checks(
            Arc::new(ScriptedEngine::new()),
            Vec::new(),
            FanOutPolicy::default(),
        )
        .await;
        assert!(report.into_result().unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_all_waits_for_every_future() {
        type Fut = std::pin::Pin<Box<dyn Future<Output = Result<i32, String>>>>;
        let mut futures: Vec<Fut> = Vec::new();
        futures.push(Box::pin(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(1)
        }));
        futures.push(Box::pin(async { Err("second".to_string()) }));
        futures.push(Box::pin(async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Err("third".to_string())
        }));

        assert_eq!(join_all_first_error(futures).await, Err("second".to_string()));

        let ok: Result<Vec<i32>, String> =
            join_all_first_error((1..=2).map(|i| async move { Ok(i) })).await;
        assert_eq!(ok.unwrap().len(), 2);
    }
}
