//! Error types for plan compilation and step execution.

use std::time::Duration;

/// Result type for plan-level operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Structural problems with a plan. These are the only errors that escape
/// `execute_plan`, and they are raised before any step runs.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Two steps share an id.
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    /// A `depends_on` entry names a step that is not in the plan.
    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    /// A step timeout is negative, not a finite number, or too large to represent.
    #[error("Step {step} has an invalid timeout: {value}")]
    InvalidTimeout { step: String, value: f64 },

    /// The dependency relation is not acyclic.
    #[error("Plan contains circular dependencies between steps: {}", .steps.join(", "))]
    Cycle { steps: Vec<String> },

    /// The plan input was not valid JSON for the plan format.
    #[error("Invalid plan document: {0}")]
    Parse(#[from] serde_json::Error),
}

impl PlanError {
    /// Whether this error came from graph validation rather than parsing.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Parse(_))
    }
}

/// Why a step ended up `failed`. Never returned to callers, only recorded.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("timeout: step did not finish within {0:?}")]
    Timeout(Duration),

    #[error("{0:#}")]
    Tool(anyhow::Error),
}

impl StepError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Why a condition could not be evaluated. The step is skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("Invalid condition syntax: {0}")]
    Parse(String),

    #[error("Unresolved reference: {0}")]
    Unresolved(String),

    #[error("Type error: {0}")]
    Type(String),
}
