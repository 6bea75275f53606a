use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use super::TaskManagerError;
use crate::convert::Converter;
use crate::models::{Task, TaskError, TaskView};
use crate::sources::DocumentSource;
use crate::store::TaskStore;
use crate::utils::{with_retry, RetryConfig};

/// Runtime knobs for the task manager
#[derive(Debug, Clone, Copy)]
pub struct TaskManagerConfig {
    /// How long a record lives after creation
    pub ttl: Duration,
    /// Deadline for fetch + convert of one task
    pub job_timeout: Duration,
    /// Jobs allowed to run at once; the rest wait as `pending`
    pub max_concurrent_jobs: usize,
    /// Backoff for `store_unavailable` errors
    pub store_retry: RetryConfig,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            job_timeout: Duration::from_secs(120),
            max_concurrent_jobs: 4,
            store_retry: RetryConfig::default()
                .max_attempts(4)
                .initial_delay(Duration::from_millis(100))
                .max_delay(Duration::from_secs(2)),
        }
    }
}

impl TaskManagerConfig {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs.max(1);
        self
    }

    pub fn store_retry(mut self, retry: RetryConfig) -> Self {
        self.store_retry = retry;
        self
    }
}

/// Creates conversion tasks, runs them in the background and answers polls.
///
/// Cheap to clone; clones share the same jobs and store.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TaskStore>,
    source: Arc<dyn DocumentSource>,
    converter: Arc<dyn Converter>,
    config: TaskManagerConfig,
    jobs: Arc<Semaphore>,
    in_flight: Mutex<HashMap<String, AbortHandle>>,
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("store", &self.inner.store.backend())
            .field("source", &self.inner.source.id())
            .field("converter", &self.inner.converter.name())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl TaskManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        source: Arc<dyn DocumentSource>,
        converter: Arc<dyn Converter>,
        config: TaskManagerConfig,
    ) -> Self {
        let permits = config.max_concurrent_jobs.max(1);
        Self {
            inner: Arc::new(Inner {
                store,
                source,
                converter,
                config,
                jobs: Arc::new(Semaphore::new(permits)),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.inner.store
    }

    /// Register a conversion of `input_ref` and return its task ID.
    ///
    /// Returns once the `pending` record is stored; the fetch and conversion
    /// run in a background job. Fetch or conversion failures never surface
    /// here, they end up in the task's `error`.
    pub async fn create(&self, input_ref: &str) -> Result<String, TaskManagerError> {
        let input_ref = input_ref.trim();
        if input_ref.is_empty() {
            return Err(TaskManagerError::InvalidInput(
                "paper_id must not be empty".to_string(),
            ));
        }

        let ttl = chrono::Duration::from_std(self.inner.config.ttl)
            .map_err(|e| TaskManagerError::InvalidInput(format!("task TTL out of range: {}", e)))?;
        let task = Task::new(input_ref, ttl);

        let store = &self.inner.store;
        with_retry(self.inner.config.store_retry, || store.put(&task)).await?;
        info!(task_id = %task.id, paper_id = %input_ref, "Task created");

        self.spawn_job(task.id.clone(), input_ref.to_string());
        Ok(task.id)
    }

    /// Current view of a task. Never mutates the record.
    pub async fn get_status(&self, task_id: &str) -> Result<TaskView, TaskManagerError> {
        let store = &self.inner.store;
        let task = with_retry(self.inner.config.store_retry, || store.get(task_id)).await?;
        Ok(task.view())
    }

    /// Number of jobs spawned by this manager that have not finished
    pub fn in_flight(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .map(|jobs| jobs.len())
            .unwrap_or(0)
    }

    /// Remove expired records now
    pub async fn purge_expired(&self) -> Result<usize, TaskManagerError> {
        let removed = self.inner.store.delete_expired().await?;
        if removed > 0 {
            info!("Purged {} expired task(s) from {} store", removed, self.inner.store.backend());
        }
        Ok(removed)
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until the handle is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.purge_expired().await {
                    warn!("Expiry sweep failed: {}", e);
                }
            }
        })
    }

    /// Abort every in-flight job.
    ///
    /// Aborted tasks keep whatever status they had; with a durable store a
    /// `running` record stays behind until its TTL reclaims it.
    pub fn shutdown(&self) {
        let handles: Vec<(String, AbortHandle)> = match self.inner.in_flight.lock() {
            Ok(mut jobs) => jobs.drain().collect(),
            Err(_) => return,
        };
        for (task_id, handle) in handles {
            debug!(task_id = %task_id, "Aborting job");
            handle.abort();
        }
    }

    fn spawn_job(&self, task_id: String, input_ref: String) {
        let inner = Arc::clone(&self.inner);

        // Hold the registry lock across spawn so the job cannot deregister
        // itself before it is registered.
        let mut jobs = match self.inner.in_flight.lock() {
            Ok(jobs) => jobs,
            Err(poisoned) => poisoned.into_inner(),
        };
        if jobs.contains_key(&task_id) {
            warn!(task_id = %task_id, "Job already in flight, not spawning another");
            return;
        }

        let id = task_id.clone();
        let handle = tokio::spawn(async move {
            // Deregisters on completion, panic or abort alike
            let registration = Registration {
                inner: Arc::clone(&inner),
                task_id: id,
            };
            inner.run_job(&registration.task_id, &input_ref).await;
        });
        jobs.insert(task_id, handle.abort_handle());
    }
}

/// Entry in the in-flight registry, removed when dropped
struct Registration {
    inner: Arc<Inner>,
    task_id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut jobs = match self.inner.in_flight.lock() {
            Ok(jobs) => jobs,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.remove(&self.task_id);
    }
}

impl Inner {
    async fn run_job(&self, task_id: &str, input_ref: &str) {
        let Ok(_permit) = Arc::clone(&self.jobs).acquire_owned().await else {
            return;
        };

        let retry = self.config.store_retry;
        // Retried writes may find their own earlier, unacknowledged commit
        let start = |task: &mut Task| task.resume_start();
        if let Err(e) = with_retry(retry, || self.store.update(task_id, &start)).await {
            error!(task_id = %task_id, "Could not mark task running: {}", e);
            return;
        }
        info!(task_id = %task_id, paper_id = %input_ref, "Task running");

        let outcome = match tokio::time::timeout(self.config.job_timeout, self.execute(input_ref)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::timeout(format!(
                "job exceeded {}s deadline",
                self.config.job_timeout.as_secs_f64()
            ))),
        };

        let finish = |task: &mut Task| task.settle(&outcome);

        // Status and result/error land in one atomic update
        match with_retry(retry, || self.store.update(task_id, &finish)).await {
            Ok(task) => match &outcome {
                Ok(text) => info!(
                    task_id = %task_id,
                    chars = text.len(),
                    "Task succeeded"
                ),
                Err(err) => info!(task_id = %task_id, status = %task.status, "Task failed: {}", err),
            },
            Err(e) => {
                error!(
                    task_id = %task_id,
                    "Lost final write, record left {}: {}",
                    if outcome.is_ok() { "without result" } else { "without error" },
                    e
                );
            }
        }
    }

    async fn execute(&self, input_ref: &str) -> Result<String, TaskError> {
        let document = self
            .source
            .fetch(input_ref)
            .await
            .map_err(|e| TaskError::fetch_failed(e.to_string()))?;
        debug!(
            paper_id = %document.paper_id,
            bytes = document.bytes.len(),
            "Fetched document, converting with {}",
            self.converter.name()
        );

        let converter = Arc::clone(&self.converter);
        tokio::task::spawn_blocking(move || converter.convert(&document))
            .await
            .map_err(|e| TaskError::conversion(format!("converter crashed: {}", e)))?
            .map_err(|e| TaskError::conversion(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::PdfMarkdownConverter;
    use crate::models::{TaskErrorKind, TaskStatus};
    use crate::sources::{FetchError, FetchedDocument, MockSource};
    use crate::store::MemoryStore;
    use crate::utils::pdf::tests::sample_pdf;

    fn manager_with(source: Arc<MockSource>, config: TaskManagerConfig) -> TaskManager {
        TaskManager::new(
            Arc::new(MemoryStore::new()),
            source,
            Arc::new(PdfMarkdownConverter::new()),
            config,
        )
    }

    async fn wait_terminal(manager: &TaskManager, task_id: &str) -> TaskView {
        for _ in 0..500 {
            let view = manager.get_status(task_id).await.unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never finished", task_id);
    }

    #[tokio::test]
    async fn test_create_returns_pending_task() {
        let source = Arc::new(MockSource::new());
        source.add_pdf("2301.12345", "Paper", sample_pdf(&["Body"]));
        let manager = manager_with(source, TaskManagerConfig::default());

        let id = manager.create("2301.12345").await.unwrap();
        let view = manager.get_status(&id).await.unwrap();

        assert!(matches!(view.status, TaskStatus::Pending | TaskStatus::Running));
        assert_eq!(view.paper_id, "2301.12345");
        assert!(view.result.is_none());
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn test_successful_conversion() {
        let source = Arc::new(MockSource::new());
        source.add_pdf("2301.12345", "Attention Again", sample_pdf(&["We propose"]));
        let manager = manager_with(source, TaskManagerConfig::default());

        let id = manager.create("2301.12345").await.unwrap();
        let view = wait_terminal(&manager, &id).await;

        assert_eq!(view.status, TaskStatus::Succeeded);
        let text = view.result.unwrap();
        assert!(text.starts_with("# Attention Again"));
        assert!(text.contains("We propose"));
        assert!(view.error.is_none());
        assert!(view.started_at.is_some());
        assert!(view.completed_at.is_some());
        assert_eq!(manager.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_not_found_fails_without_retry() {
        let source = Arc::new(MockSource::new());
        let manager = manager_with(Arc::clone(&source), TaskManagerConfig::default());

        let id = manager.create("2301.99999").await.unwrap();
        let view = wait_terminal(&manager, &id).await;

        assert_eq!(view.status, TaskStatus::Failed);
        let error = view.error.unwrap();
        assert_eq!(error.kind, TaskErrorKind::FetchFailed);
        assert!(error.message.contains("not found"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_unconvertible_document_fails_with_conversion_error() {
        let source = Arc::new(MockSource::new());
        source.add_pdf("2301.12345", "Paper", b"<html>not a pdf</html>".to_vec());
        let manager = manager_with(source, TaskManagerConfig::default());

        let id = manager.create("2301.12345").await.unwrap();
        let view = wait_terminal(&manager, &id).await;

        assert_eq!(view.status, TaskStatus::Failed);
        assert_eq!(view.error.unwrap().kind, TaskErrorKind::ConversionError);
        assert!(view.result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_deadline() {
        let source = Arc::new(MockSource::new());
        source.add_pdf("2301.12345", "Paper", sample_pdf(&["Body"]));
        source.set_delay(Duration::from_secs(600));
        let config = TaskManagerConfig::default().job_timeout(Duration::from_secs(5));
        let manager = manager_with(source, config);

        let id = manager.create("2301.12345").await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let view = manager.get_status(&id).await.unwrap();
        assert_eq!(view.status, TaskStatus::Failed);
        assert_eq!(view.error.unwrap().kind, TaskErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excess_jobs_wait_as_pending() {
        let source = Arc::new(MockSource::new());
        source.add_pdf("2301.00001", "One", sample_pdf(&["One"]));
        source.add_pdf("2301.00002", "Two", sample_pdf(&["Two"]));
        source.set_delay(Duration::from_secs(30));
        let config = TaskManagerConfig::default()
            .max_concurrent_jobs(1)
            .job_timeout(Duration::from_secs(300));
        let manager = manager_with(source, config);

        let first = manager.create("2301.00001").await.unwrap();
        let second = manager.create("2301.00002").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut statuses = vec![
            manager.get_status(&first).await.unwrap().status,
            manager.get_status(&second).await.unwrap().status,
        ];
        statuses.sort_by_key(|s| s.as_str());
        assert_eq!(statuses, vec![TaskStatus::Pending, TaskStatus::Running]);
        assert_eq!(manager.in_flight(), 2);

        manager.shutdown();
        assert_eq!(manager.in_flight(), 0);
    }

    #[derive(Debug)]
    struct PanickingSource;

    #[async_trait::async_trait]
    impl DocumentSource for PanickingSource {
        fn id(&self) -> &str {
            "panicking"
        }

        async fn fetch(&self, _id: &str) -> Result<FetchedDocument, FetchError> {
            panic!("source blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_job_leaves_registry() {
        let manager = TaskManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(PanickingSource),
            Arc::new(PdfMarkdownConverter::new()),
            TaskManagerConfig::default(),
        );

        let id = manager.create("2301.12345").await.unwrap();
        for _ in 0..500 {
            if manager.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.in_flight(), 0);
        assert_eq!(manager.get_status(&id).await.unwrap().status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_terminal_view_is_stable() {
        let source = Arc::new(MockSource::new());
        source.add_pdf("2301.12345", "Paper", sample_pdf(&["Body"]));
        let manager = manager_with(source, TaskManagerConfig::default());

        let id = manager.create("2301.12345").await.unwrap();
        let first = wait_terminal(&manager, &id).await;
        for _ in 0..5 {
            assert_eq!(manager.get_status(&id).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_invalid_and_unknown_ids() {
        let manager = manager_with(Arc::new(MockSource::new()), TaskManagerConfig::default());

        assert!(matches!(
            manager.create("   ").await,
            Err(TaskManagerError::InvalidInput(_))
        ));
        assert!(matches!(
            manager.get_status("no-such-task").await,
            Err(TaskManagerError::NotFound(ref id)) if id == "no-such-task"
        ));
    }

    #[tokio::test]
    async fn test_far_future_ttl_does_not_panic() {
        let source = Arc::new(MockSource::new());
        source.add_pdf("2301.12345", "Paper", sample_pdf(&["Body"]));
        // Past chrono's last representable year
        let config = TaskManagerConfig::default().ttl(Duration::from_secs(10_000_000_000_000));
        let manager = manager_with(source, config);

        let id = manager.create("2301.12345").await.unwrap();
        assert_eq!(wait_terminal(&manager, &id).await.status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let manager = manager_with(Arc::new(MockSource::new()), TaskManagerConfig::default());
        let stale = Task::new("2301.12345", chrono::Duration::seconds(-1));
        manager.store().put(&stale).await.unwrap();

        assert_eq!(manager.purge_expired().await.unwrap(), 1);
        assert_eq!(manager.purge_expired().await.unwrap(), 0);
    }
}
