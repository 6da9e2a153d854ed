//! # aqua-queue
//!
//! Durable background job queue for the Aqua Forum tagging pipeline.
//!
//! ## Features
//!
//! - Priority-based scheduling (High, Normal) with FIFO within a priority
//! - SQLite persistence with crash recovery (interrupted jobs requeue on
//!   startup)
//! - Idempotent enqueue: job ids are the dedup key, so re-submitting a
//!   photo already queued or in-flight is a no-op
//! - Per-job retry budget with exponential backoff between attempts
//! - Per-job wall-clock timeouts
//! - Fixed small concurrency bound (the downstream LLM endpoint is a
//!   shared resource)
//! - Status events over an explicit `tokio::sync::mpsc` channel
//! - Retention pruning of finished jobs
//!
//! ## Quick Start
//!
//! 1. Define a payload type and a [`JobHandler`] for it
//! 2. Create a [`QueueManager`] with a [`QueueConfig`]
//! 3. Add jobs with [`QueueManager::enqueue()`]
//! 4. Start processing with [`QueueManager::spawn()`]
//!
//! ```rust,no_run
//! use aqua_queue::{JobContext, JobHandler, JobResult, QueueConfig, QueueError, QueueJob, QueueManager};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct EmailPayload {
//!     to: String,
//! }
//!
//! struct EmailWorker;
//!
//! impl JobHandler for EmailWorker {
//!     type Payload = EmailPayload;
//!
//!     async fn execute(&self, _ctx: &JobContext, payload: EmailPayload)
//!         -> Result<JobResult, QueueError>
//!     {
//!         println!("sending to {}", payload.to);
//!         Ok(JobResult::success())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueueError> {
//!     let manager = QueueManager::new(QueueConfig::default())?;
//!     manager.enqueue(QueueJob::new(EmailPayload { to: "a@b.c".into() }))?;
//!     let _manager = manager.spawn(EmailWorker);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod executor;
pub mod queue;
pub mod types;

pub use config::{QueueConfig, QueueConfigBuilder};
pub use error::QueueError;
pub use events::QueueEvent;
pub use queue::QueueManager;
pub use types::{JobPriority, JobRecord, JobResult, JobStatus, QueueJob};

/// Context provided to job handlers during execution.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// The id of the currently executing job.
    pub job_id: String,
    /// Attempt number of this execution (1-based).
    pub attempt: u32,
    /// The job's attempt budget.
    pub max_attempts: u32,
}

impl JobContext {
    /// Whether a failure of this attempt would be terminal.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Work a queue processes. The handler is long-lived and shared across
/// attempts; per-job state arrives as the deserialized `Payload`.
///
/// Returning `Err` (or a [`JobResult::failure`]) counts the attempt
/// against the job's retry budget; the executor reschedules the job with
/// backoff until the budget is exhausted.
pub trait JobHandler: Send + Sync {
    /// Per-job data, stored as JSON in the queue database.
    type Payload: serde::Serialize + serde::de::DeserializeOwned + Send;

    /// Execute one attempt.
    fn execute(
        &self,
        ctx: &JobContext,
        payload: Self::Payload,
    ) -> impl std::future::Future<Output = Result<JobResult, QueueError>> + Send;

    /// Optional: a human-readable name for this job type, used in logging.
    fn job_type(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
