// Plan executor: runs dependency graphs of tool calls level by level

pub mod config;
pub mod error;
pub mod events;
pub mod plan;
pub mod store;
pub mod tool;
pub mod types;

pub use config::ExecutorConfig;
pub use error::{ConditionError, PlanError, PlanResult, StepError};
pub use events::{Event, EventLog, EventType, MemoryEventLog};
pub use plan::{abort_pair, compile, AbortHandle, AbortSignal, ExecutionGraph, PlanExecutor};
pub use store::ResultStore;
pub use tool::{Tool, ToolDefinition, ToolExecutor, ToolRegistry};
pub use types::*;
