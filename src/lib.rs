//! # arxiv-fulltext
//!
//! An MCP server that turns arXiv papers into Markdown as pollable
//! background tasks.
//!
//! Converting a paper takes several seconds, so a request only creates a
//! task and returns its ID. A background job fetches the PDF through a
//! rate-limited, single-flight client, converts it, and records the result
//! or a structured error on the task. Clients poll until the task reaches a
//! terminal state.
//!
//! ## Architecture
//!
//! - [`models`]: task record, lifecycle and paper metadata
//! - [`store`]: task persistence (in-memory or Redis)
//! - [`sources`]: upstream document retrieval (arXiv)
//! - [`convert`]: PDF to Markdown conversion
//! - [`tasks`]: task manager orchestrating the above
//! - [`mcp`]: MCP tools and server
//! - [`utils`]: HTTP client, rate gate, retry and PDF helpers
//! - [`config`]: configuration management
//! - [`ui`]: CLI terminal output

pub mod config;
pub mod convert;
pub mod mcp;
pub mod models;
pub mod sources;
pub mod store;
pub mod tasks;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use models::{Task, TaskStatus, TaskView};
pub use store::{MemoryStore, TaskStore};
pub use tasks::{TaskManager, TaskManagerConfig, TaskManagerError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
