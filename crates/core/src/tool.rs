// Tool capability consumed by the plan executor

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// The single capability the executor needs from its host: run a named tool
/// with arguments. The executor enforces the timeout itself; it is passed
/// along so implementations can bound their own work.
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute_tool(
        &self,
        tool: &str,
        args: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

/// One named tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, args: Map<String, Value>) -> Result<Value>;
}

/// Dispatches tool calls by name to registered implementations
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its definition's name, replacing any previous one
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!("Replacing previously registered tool: {}", name);
        }
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

#[async_trait::async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute_tool(
        &self,
        tool: &str,
        args: Map<String, Value>,
        _timeout: Option<Duration>,
    ) -> Result<Value> {
        let handler = self
            .tools
            .get(tool)
            .ok_or_else(|| anyhow!("unknown tool: {}", tool))?;

        handler.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait::async_trait]
    impl Tool for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Returns its arguments".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
            Ok(Value::Object(args))
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl Tool for Broken {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "broken".to_string(),
                description: "Always fails".to_string(),
                parameters: Value::Null,
            }
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<Value> {
            Err(anyhow!("disk on fire"))
        }
    }

    #[tokio::test]
    async fn test_dispatches_by_name() {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(Echo))
            .with_tool(Arc::new(Broken));

        let mut args = Map::new();
        args.insert("x".to_string(), json!(1));

        let result = registry.execute_tool("echo", args, None).await.unwrap();
        assert_eq!(result, json!({"x": 1}));

        let err = registry
            .execute_tool("broken", Map::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[tokio::test]
    async fn test_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute_tool("shell_exec", Map::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: shell_exec");
    }

    #[test]
    fn test_definitions_sorted() {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(Echo))
            .with_tool(Arc::new(Broken));

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["broken", "echo"]);
        assert!(registry.get("echo").is_some());
    }
}
