//! Task persistence.
//!
//! [`TaskStore`] is the single interface the task manager talks to. Two
//! backends implement it:
//!
//! - [`MemoryStore`]: process memory behind a mutex, lost on restart
//! - [`RedisStore`]: records serialized as JSON in Redis, surviving restarts
//!   (requires the `redis-backend` feature)
//!
//! Both expire records at their `ttl_deadline`, so abandoned tasks do not
//! accumulate.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;

use async_trait::async_trait;

use crate::models::{Task, TransitionError};
use crate::utils::{Retryable, TransientError};

/// Mutation applied to a stored task as one atomic step.
///
/// May be invoked more than once when an optimistic backend has to retry.
pub type TaskMutator<'a> = &'a (dyn Fn(&mut Task) -> Result<(), TransitionError> + Send + Sync);

/// Key-value persistence for task records
#[async_trait]
pub trait TaskStore: Send + Sync + std::fmt::Debug {
    /// Backend name for logs ("memory", "redis")
    fn backend(&self) -> &str;

    /// Insert or replace a record
    async fn put(&self, task: &Task) -> Result<(), StoreError>;

    /// Fetch a record; expired records are reported as not found
    async fn get(&self, id: &str) -> Result<Task, StoreError>;

    /// Apply `mutator` atomically and return the updated record.
    ///
    /// A concurrent reader observes either the record before or after the
    /// mutation, never a partial write. If the mutator fails nothing is written.
    async fn update(&self, id: &str, mutator: TaskMutator<'_>) -> Result<Task, StoreError>;

    /// Remove every record past its TTL deadline, returning how many were removed
    async fn delete_expired(&self) -> Result<usize, StoreError>;
}

/// Errors surfaced by task stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unknown (or expired) task ID
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Backend transiently unreachable; retry with backoff
    #[error("Task store unavailable: {0}")]
    Unavailable(String),

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend rejected the operation
    #[error("Task store error: {0}")]
    Backend(String),

    /// Mutator refused the change
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl Retryable for StoreError {
    fn transient(&self) -> Option<TransientError> {
        match self {
            StoreError::Unavailable(_) => Some(TransientError::Unavailable),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(format!("JSON: {}", err))
    }
}

/// Encode a record for a text-based backend
pub fn encode_record(task: &Task) -> Result<String, StoreError> {
    Ok(serde_json::to_string(task)?)
}

/// Decode a record written by [`encode_record`]
pub fn decode_record(raw: &str) -> Result<Task, StoreError> {
    Ok(serde_json::from_str(raw)?)
}
