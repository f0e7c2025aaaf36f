//! Runs a JSON plan against tools that only echo their arguments.
//!
//! ```text
//! cargo run --example run_plan -- plan.json --config planrunner.toml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use planrunner_core::{ExecutorConfig, PlanExecutor, Tool, ToolDefinition, ToolRegistry};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "run_plan")]
#[command(about = "Execute a plan with echoing stand-in tools", long_about = None)]
struct Args {
    /// Path to the plan JSON document
    plan: PathBuf,

    /// Path to executor configuration
    #[arg(short, long, default_value = "planrunner.toml")]
    config: PathBuf,
}

/// Stand-in tool that reports what it was asked to do
struct EchoTool {
    name: &'static str,
}

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: format!("Echoes the arguments of a {} call", self.name),
            parameters: json!({"type": "object"}),
        }
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let summary = args
            .values()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");

        Ok(json!({
            "output": format!("{}: {}", self.name, summary),
            "success": true,
            "args": args,
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "planrunner_core=info".into()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = ExecutorConfig::load(&args.config)?;
    let input = std::fs::read_to_string(&args.plan)
        .with_context(|| format!("Failed to read plan {}", args.plan.display()))?;

    let mut tools = ToolRegistry::new();
    for name in ["shell_exec", "message", "file_read"] {
        tools.register(Arc::new(EchoTool { name }));
    }

    let executor = PlanExecutor::with_config(Arc::new(tools), config);
    let report = executor.execute_json(&input).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
