use super::condition;
use super::substitution::substitute_args;
use crate::error::StepError;
use crate::events::{Event, EventLog, EventType};
use crate::store::ResultStore;
use crate::tool::ToolExecutor;
use crate::types::{RunId, Step, StepResult};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Identity of the run a step belongs to, plus where to report its events
#[derive(Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub plan_id: String,
    pub event_log: Option<Arc<dyn EventLog>>,
}

impl RunContext {
    /// Append an event if a log is attached. Failures are logged and dropped.
    pub async fn emit(&self, event_type: EventType) {
        let Some(event_log) = &self.event_log else {
            return;
        };

        let event = Event::new(self.run_id, self.plan_id.clone(), event_type);
        if let Err(e) = event_log.append(event).await {
            tracing::warn!("Failed to append event for run {}: {:#}", self.run_id, e);
        }
    }
}

/// Runs a single step: gate, substitute, call the tool under a timeout
pub struct StepExecutor {
    tools: Arc<dyn ToolExecutor>,
    default_timeout: Duration,
    limiter: Option<Arc<Semaphore>>,
}

impl StepExecutor {
    pub fn new(
        tools: Arc<dyn ToolExecutor>,
        default_timeout: Duration,
        max_concurrency: Option<usize>,
    ) -> Self {
        Self {
            tools,
            default_timeout,
            limiter: max_concurrency.map(|max| Arc::new(Semaphore::new(max))),
        }
    }

    /// Execute a step whose dependencies are all terminal in `store`.
    /// Always produces a terminal result.
    pub async fn execute(
        &self,
        ctx: &RunContext,
        step: &Step,
        level: usize,
        store: &ResultStore,
    ) -> StepResult {
        if let Some(expr) = &step.condition {
            match condition::evaluate(expr, store) {
                Ok(true) => {
                    tracing::debug!("Condition for step {} passed: {}", step.id, expr);
                }
                Ok(false) => {
                    tracing::info!("Skipping step {}: condition is false", step.id);
                    ctx.emit(EventType::StepSkipped {
                        step_id: step.id.clone(),
                        reason: format!("condition evaluated to false: {}", expr),
                    })
                    .await;
                    return StepResult::skipped(None);
                }
                Err(e) => {
                    let reason = format!("condition could not be evaluated: {}", e);
                    tracing::warn!("Skipping step {}: {}", step.id, reason);
                    ctx.emit(EventType::StepSkipped {
                        step_id: step.id.clone(),
                        reason: reason.clone(),
                    })
                    .await;
                    return StepResult::skipped(Some(reason));
                }
            }
        }

        let args = substitute_args(&step.args, store);
        let step_timeout = step.timeout_duration().unwrap_or(self.default_timeout);

        // Held until the tool call finishes
        let _permit = match &self.limiter {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        };

        tracing::info!("Executing step {} with tool {}", step.id, step.tool);
        ctx.emit(EventType::StepStarted {
            step_id: step.id.clone(),
            tool: step.tool.clone(),
            level,
        })
        .await;

        let started_at = Utc::now();
        let start = std::time::Instant::now();

        let outcome = match timeout(
            step_timeout,
            self.tools.execute_tool(&step.tool, args, Some(step_timeout)),
        )
        .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StepError::Tool(e)),
            Err(_) => Err(StepError::Timeout(step_timeout)),
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                tracing::info!("Step {} succeeded in {}ms", step.id, duration_ms);
                ctx.emit(EventType::StepCompleted {
                    step_id: step.id.clone(),
                    duration_ms,
                })
                .await;
                StepResult::success(value, started_at)
            }
            Err(e) => {
                let error = e.to_string();
                if e.is_timeout() {
                    tracing::warn!("Step {} timed out after {:?}", step.id, step_timeout);
                } else {
                    tracing::warn!("Step {} failed: {}", step.id, error);
                }
                ctx.emit(EventType::StepFailed {
                    step_id: step.id.clone(),
                    error: error.clone(),
                    timed_out: e.is_timeout(),
                })
                .await;
                StepResult::failed(error, started_at)
            }
        }
    }
}
