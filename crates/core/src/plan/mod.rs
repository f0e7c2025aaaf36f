pub mod condition;
pub mod dag;
pub mod executor;
pub mod step_executor;
pub mod substitution;

pub use dag::{compile, ExecutionGraph};
pub use executor::{abort_pair, AbortHandle, AbortSignal, PlanExecutor};
pub use step_executor::{RunContext, StepExecutor};
pub use substitution::substitute;
