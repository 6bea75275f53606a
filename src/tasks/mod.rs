//! Asynchronous conversion tasks.
//!
//! [`TaskManager`] hands back a task ID as soon as the pending record is
//! stored, runs fetch + convert in the background, and answers status polls
//! from the store. It depends only on the [`TaskStore`](crate::store::TaskStore),
//! [`DocumentSource`](crate::sources::DocumentSource) and
//! [`Converter`](crate::convert::Converter) traits.

mod manager;

pub use manager::{TaskManager, TaskManagerConfig};

use crate::store::StoreError;

/// Errors returned to callers of the task manager
#[derive(Debug, thiserror::Error)]
pub enum TaskManagerError {
    /// The request could not be accepted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No live task has this ID
    #[error("Task not found: {0}")]
    NotFound(String),

    /// The store kept failing after retries
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TaskManagerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => TaskManagerError::NotFound(id),
            other => TaskManagerError::Store(other),
        }
    }
}
