use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::PlanError;

/// Unique identifier for one plan execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a step, unique within its plan
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle state of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

/// A named DAG of tool-invocation steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default = "generate_plan_id")]
    pub plan_id: String,
    pub steps: Vec<Step>,
}

fn generate_plan_id() -> String {
    Uuid::new_v4().to_string()
}

impl Plan {
    pub fn new(plan_id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            plan_id: plan_id.into(),
            steps,
        }
    }

    /// Parse a plan from its JSON input form
    pub fn from_json(input: &str) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }
}

/// One tool invocation node of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl Step {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: StepId::new(id),
            tool: tool.into(),
            args: serde_json::Map::new(),
            depends_on: Vec::new(),
            condition: None,
            timeout: None,
        }
    }

    /// Builder-style helpers, mostly used to assemble plans in code
    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = args {
            self.args = map;
        }
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(|d| StepId::new(d)).collect();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// The declared timeout as a `Duration`, if it is a valid one
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Outcome record of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl StepResult {
    pub fn pending() -> Self {
        Self {
            status: StepStatus::Pending,
            result: serde_json::Value::Null,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn success(result: serde_json::Value, started_at: DateTime<Utc>) -> Self {
        Self {
            status: StepStatus::Success,
            result,
            error: None,
            started_at: Some(started_at),
            ended_at: Some(Utc::now()),
        }
    }

    pub fn failed(error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            status: StepStatus::Failed,
            result: serde_json::Value::Null,
            error: Some(error.into()),
            started_at: Some(started_at),
            ended_at: Some(Utc::now()),
        }
    }

    /// A skip carries an error only when it explains something other than a
    /// plain false condition
    pub fn skipped(reason: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            status: StepStatus::Skipped,
            result: serde_json::Value::Null,
            error: reason,
            started_at: Some(now),
            ended_at: Some(now),
        }
    }
}

/// Counts of terminal states across a plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Statistics {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a StepResult>) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.total += 1;
            match result.status {
                StepStatus::Success => stats.successful += 1,
                StepStatus::Failed => stats.failed += 1,
                StepStatus::Skipped => stats.skipped += 1,
                StepStatus::Pending | StepStatus::Running => {}
            }
        }
        stats
    }
}

/// Everything a caller gets back from one plan execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub results: BTreeMap<StepId, StepResult>,
    pub execution_graph: Vec<Vec<StepId>>,
    pub statistics: Statistics,
}

impl ExecutionReport {
    pub fn status(&self, id: &str) -> Option<StepStatus> {
        self.results.get(&StepId::from(id)).map(|r| r.status)
    }

    pub fn result(&self, id: &str) -> Option<&StepResult> {
        self.results.get(&StepId::from(id))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
