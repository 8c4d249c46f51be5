use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::interfaces::tools::{Tool, ToolContext};

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Returns false when a tool with the same name is already registered.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) -> bool {
        let mut tools = self.tools.write().await;
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return false;
        }
        tools.insert(name, tool);
        true
    }

    pub async fn get_tool(&self, tool_name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(tool_name).cloned()
    }

    pub async fn list_all_tools(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Function definitions in the shape the assistant configuration expects.
    pub async fn definitions(&self) -> Vec<Value> {
        let tools = self.tools.read().await;
        let mut defs: Vec<(String, Value)> = tools
            .values()
            .map(|tool| {
                (
                    tool.name().to_string(),
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name(),
                            "description": tool.description(),
                            "parameters": tool.parameters(),
                        }
                    }),
                )
            })
            .collect();
        defs.sort_by(|a, b| a.0.cmp(&b.0));
        defs.into_iter().map(|(_, def)| def).collect()
    }

    /// Runs a tool call and always produces an output string, so a failing
    /// tool never aborts the surrounding run.
    pub async fn dispatch(&self, name: &str, raw_arguments: &str, ctx: &ToolContext) -> String {
        let Some(tool) = self.get_tool(name).await else {
            tracing::warn!(tool = name, "assistant requested an unknown tool");
            return format!("Unknown tool: {name}");
        };
        let args: Value = if raw_arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(raw_arguments) {
                Ok(value) => value,
                Err(err) => return format!("Invalid arguments for {name}: {err}"),
            }
        };
        match tool.execute(args, ctx).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(tool = name, error = %err, "tool call failed");
                format!("Error: {err}")
            }
        }
    }
}
