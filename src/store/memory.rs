//! In-process task store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{StoreError, TaskMutator, TaskStore};
use crate::models::Task;

/// Volatile store: a map guarded by one mutex.
///
/// Every read-modify-write happens under the lock, which makes `update`
/// atomic per record. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Mutex<HashMap<String, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Task>>, StoreError> {
        self.tasks
            .lock()
            .map_err(|_| StoreError::Backend("task map lock poisoned".to_string()))
    }

    /// Number of records held, expired ones included
    pub fn len(&self) -> usize {
        self.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn put(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.lock()?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Task, StoreError> {
        let tasks = self.lock()?;
        match tasks.get(id) {
            Some(task) if !task.is_expired(Utc::now()) => Ok(task.clone()),
            _ => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn update(&self, id: &str, mutator: TaskMutator<'_>) -> Result<Task, StoreError> {
        let mut tasks = self.lock()?;
        let task = tasks
            .get_mut(id)
            .filter(|task| !task.is_expired(Utc::now()))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        // Mutate a copy so a rejected transition leaves the record untouched
        let mut updated = task.clone();
        mutator(&mut updated)?;
        *task = updated.clone();
        Ok(updated)
    }

    async fn delete_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut tasks = self.lock()?;
        let before = tasks.len();
        tasks.retain(|_, task| !task.is_expired(now));
        Ok(before - tasks.len())
    }
}
