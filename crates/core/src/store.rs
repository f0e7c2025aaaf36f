// Per-execution table of terminal step outcomes

use crate::types::{StepId, StepResult, StepStatus};
use serde_json::Value;
use std::collections::HashMap;

/// Prefix every resolvable reference must start with
pub const RESULTS_PREFIX: &str = "results";

/// Append-only store of terminal step results for a single plan execution
#[derive(Debug, Default)]
pub struct ResultStore {
    results: HashMap<StepId, StepResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the terminal outcome of a step. The first terminal record wins;
    /// later writes for the same step are ignored.
    pub fn record(&mut self, step_id: StepId, result: StepResult) -> bool {
        if !result.status.is_terminal() {
            tracing::warn!("Ignoring non-terminal result for step {}", step_id);
            return false;
        }

        if self.results.contains_key(&step_id) {
            tracing::warn!("Step {} already has a terminal result, ignoring", step_id);
            return false;
        }

        self.results.insert(step_id, result);
        true
    }

    pub fn get_result(&self, step_id: &StepId) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    pub fn contains(&self, step_id: &StepId) -> bool {
        self.results.contains_key(step_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Resolve a dotted reference of the form `results.<step_id>.<field...>`.
    ///
    /// `results.<step_id>` alone yields the whole result payload. Segments
    /// index objects by key and arrays by position. Returns `None` when the
    /// step has no terminal result yet or any segment is missing.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.trim().split('.');

        if segments.next() != Some(RESULTS_PREFIX) {
            return None;
        }

        let step_id = segments.next().filter(|s| !s.is_empty())?;
        let result = self.results.get(&StepId::from(step_id))?;

        // Skipped and failed steps carry no payload to resolve into
        if result.status != StepStatus::Success {
            return None;
        }

        let mut current = &result.result;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    pub fn into_results(self) -> HashMap<StepId, StepResult> {
        self.results
    }
}
