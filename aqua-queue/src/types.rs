use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// Priority levels for queue jobs.
///
/// Jobs are processed in priority order: High (1) before Normal (2).
/// Within the same priority, jobs are processed in FIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    High,
    Normal,
}

impl JobPriority {
    pub fn as_i32(&self) -> i32 {
        match self {
            JobPriority::High => 1,
            JobPriority::Normal => 2,
        }
    }

    pub fn from_i32(val: i32) -> Self {
        match val {
            1 => JobPriority::High,
            _ => JobPriority::Normal,
        }
    }
}

/// Job status lifecycle: Pending -> Processing -> Completed/Failed.
///
/// A retried job re-enters Pending with a future `next_run_at`; Failed is
/// only written once the attempt budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A job to be enqueued, carrying a serializable payload.
///
/// The payload is stored as JSON in SQLite and deserialized back when the
/// executor hands it to the [`JobHandler`](crate::JobHandler). Job ids
/// are the dedup key: enqueueing an id that already exists is a no-op,
/// so callers wanting idempotent re-enqueue supply a stable id via
/// [`with_id`](Self::with_id).
#[derive(Debug, Clone)]
pub struct QueueJob<P> {
    pub id: String,
    pub priority: JobPriority,
    pub payload: P,
    /// Hold the job back this long before it becomes runnable
    pub delay: Option<Duration>,
    /// Per-job wall-clock timeout, overriding the queue default
    pub timeout: Option<Duration>,
}

impl<P> QueueJob<P>
where
    P: Serialize + DeserializeOwned + Send,
{
    /// Create a job with a generated UUID and Normal priority.
    pub fn new(payload: P) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            priority: JobPriority::Normal,
            payload,
            delay: None,
            timeout: None,
        }
    }

    /// Set a stable id (the dedup key) for this job.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result returned by a job handler after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl JobResult {
    /// Create a successful result with no output.
    pub fn success() -> Self {
        Self {
            success: true,
            output: None,
            error: None,
        }
    }

    /// Create a successful result with output data.
    pub fn success_with_output(output: String) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    /// Create a failure result with an error message. The executor
    /// treats this like a returned error: the attempt counts against the
    /// retry budget.
    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
        }
    }
}

/// A persisted job row as read back from the queue database.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub payload_json: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub error_message: Option<String>,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub next_run_at: Option<String>,
}
