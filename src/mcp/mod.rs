//! MCP (Model Context Protocol) implementation.
//!
//! Exposes the task manager as two tools: `get_full_paper_text` starts a
//! conversion and returns a task ID, `get_task_status` polls it.

pub mod server;
mod task_tools;
mod tools;

pub use server::McpServer;
pub use task_tools::{GetFullPaperTextHandler, GetTaskStatusHandler};
pub use tools::{Tool, ToolHandler, ToolRegistry};
