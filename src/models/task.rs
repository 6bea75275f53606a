//! Conversion task record and its lifecycle.
//!
//! A task moves strictly forward through
//! `pending -> running -> {succeeded | failed}`. The transition methods on
//! [`Task`] are the only way the status changes, and each terminal
//! transition writes the status together with its result or error so a
//! stored record is never observed half-finished.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Returns true for `succeeded` and `failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward transition
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage of the job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Upstream retrieval exhausted retries or was rejected as not found / bad id
    FetchFailed,
    /// Document was fetched but could not be converted
    ConversionError,
    /// The overall job deadline elapsed
    Timeout,
}

impl TaskErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskErrorKind::FetchFailed => "fetch_failed",
            TaskErrorKind::ConversionError => "conversion_error",
            TaskErrorKind::Timeout => "timeout",
        }
    }
}

/// Terminal failure recorded on a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::FetchFailed,
            message: message.into(),
        }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::ConversionError,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::Timeout,
            message: message.into(),
        }
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transition for task {task_id}: {from} -> {to}")]
pub struct TransitionError {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// A background conversion task as persisted in a task store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    /// Identifier of the source document (an arXiv ID)
    pub input_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// After this instant the record may be purged regardless of status
    pub ttl_deadline: DateTime<Utc>,
}

impl Task {
    /// Create a new `pending` task with a fresh random ID
    pub fn new(input_ref: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            input_ref: input_ref.into(),
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            ttl_deadline: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    fn check(&self, to: TaskStatus) -> Result<(), TransitionError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransitionError {
                task_id: self.id.clone(),
                from: self.status,
                to,
            })
        }
    }

    /// `pending -> running`
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.check(TaskStatus::Running)?;
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> succeeded`, storing the converted text
    pub fn succeed(&mut self, result: String) -> Result<(), TransitionError> {
        self.check(TaskStatus::Succeeded)?;
        self.status = TaskStatus::Succeeded;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> failed`, storing the failure
    pub fn fail(&mut self, error: TaskError) -> Result<(), TransitionError> {
        self.check(TaskStatus::Failed)?;
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.result = None;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// [`start`](Self::start) that accepts a task already `running`.
    ///
    /// A store write whose acknowledgement was lost is retried with this.
    pub fn resume_start(&mut self) -> Result<(), TransitionError> {
        if self.status == TaskStatus::Running {
            return Ok(());
        }
        self.start()
    }

    /// Record `outcome` as the terminal state.
    ///
    /// Settling a task that already holds the very same outcome is a no-op,
    /// so `completed_at` keeps its first value. Any other terminal task is
    /// rejected.
    pub fn settle(&mut self, outcome: &Result<String, TaskError>) -> Result<(), TransitionError> {
        match outcome {
            Ok(text) if self.status == TaskStatus::Succeeded && self.result.as_ref() == Some(text) => {
                Ok(())
            }
            Err(err) if self.status == TaskStatus::Failed && self.error.as_ref() == Some(err) => {
                Ok(())
            }
            Ok(text) => self.succeed(text.clone()),
            Err(err) => self.fail(err.clone()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ttl_deadline
    }

    /// Seconds left until the TTL deadline, clamped to at least one
    pub fn ttl_remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.ttl_deadline - now).num_seconds().max(1) as u64
    }

    /// Read-only view handed to pollers
    pub fn view(&self) -> TaskView {
        TaskView {
            task_id: self.id.clone(),
            paper_id: self.input_ref.clone(),
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Sanitized task state returned by status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: String,
    pub paper_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new("2301.12345", Duration::hours(1))
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.result.is_none());
        assert!(task.error.is_none());
        assert!(task.completed_at.is_none());
        assert!(task.ttl_deadline > task.created_at);
        assert!(Uuid::parse_str(&task.id).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(task().id, task().id);
    }

    #[test]
    fn test_success_path() {
        let mut task = task();
        task.start().unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());

        task.succeed("# Paper".to_string()).unwrap();
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.result.as_deref(), Some("# Paper"));
        assert!(task.error.is_none());
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_failure_path() {
        let mut task = task();
        task.start().unwrap();
        task.fail(TaskError::fetch_failed("Paper not found"))
            .unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.result.is_none());
        assert_eq!(task.error.as_ref().unwrap().kind, TaskErrorKind::FetchFailed);
    }

    #[test]
    fn test_cannot_skip_running() {
        let mut task = task();
        let err = task.succeed("text".to_string()).unwrap_err();
        assert_eq!(err.from, TaskStatus::Pending);
        assert_eq!(err.to, TaskStatus::Succeeded);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_terminal_status_never_changes() {
        let mut task = task();
        task.start().unwrap();
        task.succeed("text".to_string()).unwrap();
        let completed_at = task.completed_at;

        assert!(task.fail(TaskError::timeout("late")).is_err());
        assert!(task.succeed("other".to_string()).is_err());
        assert!(task.start().is_err());

        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.result.as_deref(), Some("text"));
        assert_eq!(task.completed_at, completed_at);
    }

    #[test]
    fn test_resume_start_accepts_running() {
        let mut task = task();
        task.resume_start().unwrap();
        let started_at = task.started_at;
        task.resume_start().unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.started_at, started_at);

        task.succeed("text".to_string()).unwrap();
        assert!(task.resume_start().is_err());
    }

    #[test]
    fn test_settle_twice_with_same_outcome() {
        let mut task = task();
        task.start().unwrap();
        let outcome = Ok("# Paper".to_string());
        task.settle(&outcome).unwrap();
        let completed_at = task.completed_at;

        task.settle(&outcome).unwrap();
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.completed_at, completed_at);

        assert!(task.settle(&Ok("other".to_string())).is_err());
        assert!(task.settle(&Err(TaskError::timeout("late"))).is_err());
        assert_eq!(task.result.as_deref(), Some("# Paper"));
    }

    #[test]
    fn test_settle_failure_is_idempotent() {
        let mut task = task();
        task.start().unwrap();
        let outcome = Err(TaskError::fetch_failed("Paper not found"));
        task.settle(&outcome).unwrap();
        task.settle(&outcome).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.settle(&Err(TaskError::timeout("late"))).is_err());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let task = Task::new("2301.12345", Duration::MAX);
        assert_eq!(task.ttl_deadline, DateTime::<Utc>::MAX_UTC);
        assert!(!task.is_expired(task.created_at));
    }

    #[test]
    fn test_transition_table() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
    }

    #[test]
    fn test_expiry() {
        let task = Task::new("2301.12345", Duration::seconds(10));
        assert!(!task.is_expired(task.created_at));
        assert!(task.is_expired(task.created_at + Duration::seconds(10)));
        assert_eq!(task.ttl_remaining_secs(task.created_at), 10);
        assert_eq!(task.ttl_remaining_secs(task.created_at + Duration::hours(1)), 1);
    }

    #[test]
    fn test_serialization_shape() {
        let mut task = task();
        task.start().unwrap();
        task.fail(TaskError::conversion("File is not a PDF")).unwrap();

        let json = serde_json::to_value(task.view()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "conversion_error");
        assert_eq!(json["error"]["message"], "File is not a PDF");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_record_survives_serde() {
        let mut task = task();
        task.start().unwrap();
        task.succeed("body".to_string()).unwrap();

        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn test_error_display() {
        let err = TaskError::timeout("job exceeded 120s");
        assert_eq!(err.to_string(), "timeout: job exceeded 120s");
    }
}
