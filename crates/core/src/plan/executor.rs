use super::dag::ExecutionGraph;
use super::step_executor::{RunContext, StepExecutor};
use crate::config::ExecutorConfig;
use crate::error::PlanResult;
use crate::events::{EventLog, EventType};
use crate::store::ResultStore;
use crate::tool::ToolExecutor;
use crate::types::{ExecutionReport, Plan, RunId, Statistics, Step, StepId, StepResult};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::watch;

/// Sender half of an external abort signal
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<watch::Sender<bool>>);

impl AbortHandle {
    /// Ask the running plan to stop dispatching new levels
    pub fn abort(&self) {
        self.0.send_replace(true);
    }
}

/// Receiver half of an external abort signal
#[derive(Debug, Clone)]
pub struct AbortSignal(watch::Receiver<bool>);

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }
}

/// Create a connected abort handle and signal
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle(Arc::new(tx)), AbortSignal(rx))
}

/// Plan executor that runs a plan level by level
pub struct PlanExecutor {
    step_executor: StepExecutor,
    event_log: Option<Arc<dyn EventLog>>,
}

impl PlanExecutor {
    pub fn new(tools: Arc<dyn ToolExecutor>) -> Self {
        Self::with_config(tools, ExecutorConfig::default())
    }

    pub fn with_config(tools: Arc<dyn ToolExecutor>, config: ExecutorConfig) -> Self {
        let step_executor =
            StepExecutor::new(tools, config.default_timeout(), config.max_concurrency);

        Self {
            step_executor,
            event_log: None,
        }
    }

    /// Report lifecycle events of every run to `event_log`
    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Parse a JSON plan and execute it
    pub async fn execute_json(&self, input: &str) -> PlanResult<ExecutionReport> {
        let plan = Plan::from_json(input)?;
        self.execute_plan(&plan).await
    }

    /// Execute a plan and return the outcome of every step.
    ///
    /// Only structural problems with the plan are returned as errors, and
    /// those are detected before any step runs.
    pub async fn execute_plan(&self, plan: &Plan) -> PlanResult<ExecutionReport> {
        self.run(plan, None).await
    }

    /// Like [`execute_plan`](Self::execute_plan), but stops dispatching new
    /// levels once `abort` fires. Steps that never started are skipped.
    pub async fn execute_plan_with_abort(
        &self,
        plan: &Plan,
        abort: AbortSignal,
    ) -> PlanResult<ExecutionReport> {
        self.run(plan, Some(abort)).await
    }

    async fn run(&self, plan: &Plan, abort: Option<AbortSignal>) -> PlanResult<ExecutionReport> {
        let graph = ExecutionGraph::from_plan(plan)?;

        let run_id = RunId::new();
        let ctx = RunContext {
            run_id,
            plan_id: plan.plan_id.clone(),
            event_log: self.event_log.clone(),
        };
        let start = std::time::Instant::now();

        tracing::info!(
            "Starting plan execution: plan_id={}, run_id={}, steps={}, levels={}",
            plan.plan_id,
            run_id,
            plan.steps.len(),
            graph.levels().len()
        );

        ctx.emit(EventType::PlanStarted {
            step_count: plan.steps.len(),
            execution_graph: graph.levels().to_vec(),
        })
        .await;

        let steps: HashMap<&StepId, &Step> = plan.steps.iter().map(|s| (&s.id, s)).collect();
        let mut store = ResultStore::new();

        for (level_idx, level) in graph.levels().iter().enumerate() {
            if abort.as_ref().is_some_and(AbortSignal::is_aborted) {
                self.abort_remaining(&ctx, &graph, level_idx, &mut store).await;
                break;
            }

            tracing::info!(
                "Dispatching level {} of plan {}: {:?}",
                level_idx,
                plan.plan_id,
                level.iter().map(StepId::as_str).collect::<Vec<_>>()
            );

            // Every dependency sits in an earlier level, so all reads of the
            // store below see terminal results only
            let outcomes = join_all(
                level
                    .iter()
                    .filter_map(|id| steps.get(id))
                    .map(|step| self.step_executor.execute(&ctx, step, level_idx, &store)),
            )
            .await;

            for (id, result) in level.iter().zip(outcomes) {
                store.record(id.clone(), result);
            }
        }

        let results: BTreeMap<StepId, StepResult> = store.into_results().into_iter().collect();
        let statistics = Statistics::from_results(results.values());
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Plan execution completed: plan_id={}, run_id={}, successful={}, failed={}, skipped={}",
            plan.plan_id,
            run_id,
            statistics.successful,
            statistics.failed,
            statistics.skipped
        );

        ctx.emit(EventType::PlanCompleted {
            statistics,
            duration_ms,
        })
        .await;

        Ok(ExecutionReport {
            results,
            execution_graph: graph.into_levels(),
            statistics,
        })
    }

    /// Mark every step from `from_level` onwards as skipped
    async fn abort_remaining(
        &self,
        ctx: &RunContext,
        graph: &ExecutionGraph,
        from_level: usize,
        store: &mut ResultStore,
    ) {
        let skipped: Vec<StepId> = graph.levels()[from_level..]
            .iter()
            .flatten()
            .cloned()
            .collect();

        tracing::warn!(
            "Plan {} aborted before level {}, skipping {} step(s)",
            ctx.plan_id,
            from_level,
            skipped.len()
        );

        for id in &skipped {
            store.record(id.clone(), StepResult::skipped(Some("plan aborted".to_string())));
        }

        ctx.emit(EventType::PlanAborted {
            skipped_steps: skipped,
        })
        .await;
    }
}
