//! Tool handlers for starting and polling conversion tasks.

use serde_json::{json, Value};

use super::tools::ToolHandler;
use crate::tasks::{TaskManager, TaskManagerError};

fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing '{}' parameter", name))
}

/// Handler for `get_full_paper_text`: creates a task and returns its ID
#[derive(Debug)]
pub struct GetFullPaperTextHandler {
    pub manager: TaskManager,
}

#[async_trait::async_trait]
impl ToolHandler for GetFullPaperTextHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let paper_id = required_str(&args, "paper_id")?;

        let task_id = self
            .manager
            .create(paper_id)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "task_id": task_id,
            "status": "pending",
            "message": format!(
                "Conversion of {} started. Call get_task_status with this task_id until the status is 'succeeded' or 'failed'.",
                paper_id.trim()
            ),
        }))
    }
}

/// Handler for `get_task_status`: returns the task view
#[derive(Debug)]
pub struct GetTaskStatusHandler {
    pub manager: TaskManager,
}

#[async_trait::async_trait]
impl ToolHandler for GetTaskStatusHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let task_id = required_str(&args, "task_id")?.trim();

        match self.manager.get_status(task_id).await {
            Ok(view) => serde_json::to_value(view).map_err(|e| e.to_string()),
            Err(TaskManagerError::NotFound(id)) => Err(format!("Task not found: {}", id)),
            Err(e) => Err(e.to_string()),
        }
    }
}
