//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::task_tools::{GetFullPaperTextHandler, GetTaskStatusHandler};
use crate::tasks::TaskManager;

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "get_task_status")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: serde_json::Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// Registry for all MCP tools
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Create a registry with the conversion and polling tools bound to `manager`
    pub fn for_tasks(manager: TaskManager) -> Self {
        let mut registry = Self::default();

        registry.register(Tool {
            name: "get_full_paper_text".to_string(),
            description: "Start converting an arXiv paper's PDF to Markdown. Returns a task_id \
                immediately; conversion takes 5-15 seconds. Poll get_task_status with the \
                task_id until status is 'succeeded' (result holds the text) or 'failed'."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "paper_id": {
                        "type": "string",
                        "description": "arXiv identifier (e.g., '2301.12345', 'arXiv:2301.12345v2', 'math.GT/0104020') or abs/pdf URL"
                    }
                },
                "required": ["paper_id"]
            }),
            handler: Arc::new(GetFullPaperTextHandler {
                manager: manager.clone(),
            }),
        });

        registry.register(Tool {
            name: "get_task_status".to_string(),
            description: "Check a paper conversion task. Status is one of pending, running, \
                succeeded or failed; succeeded tasks carry the Markdown in 'result', failed \
                tasks carry 'error' with a kind (fetch_failed, conversion_error, timeout)."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "task_id": {
                        "type": "string",
                        "description": "Task ID returned by get_full_paper_text"
                    }
                },
                "required": ["task_id"]
            }),
            handler: Arc::new(GetTaskStatusHandler { manager }),
        });

        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// All tools, ordered by name
    pub fn all(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, String> {
        let tool = self
            .get(name)
            .ok_or_else(|| format!("Tool '{}' not found", name))?;

        tool.handler.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::PdfMarkdownConverter;
    use crate::sources::MockSource;
    use crate::store::MemoryStore;
    use crate::tasks::TaskManagerConfig;

    fn registry() -> ToolRegistry {
        ToolRegistry::for_tasks(TaskManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockSource::new()),
            Arc::new(PdfMarkdownConverter::new()),
            TaskManagerConfig::default(),
        ))
    }

    #[test]
    fn test_task_tools_are_registered() {
        let registry = registry();
        let names: Vec<&str> = registry.all().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["get_full_paper_text", "get_task_status"]);

        let schema = &registry.get("get_task_status").unwrap().input_schema;
        assert_eq!(schema["required"][0], "task_id");
    }
}
