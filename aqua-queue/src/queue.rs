use crate::{
    config::QueueConfig,
    db,
    error::QueueError,
    events::QueueEvent,
    executor::QueueExecutor,
    types::{JobRecord, QueueJob},
    JobHandler,
};
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// High-level queue manager providing the public API.
///
/// Create a `QueueManager`, add jobs to it, then call
/// [`spawn()`](Self::spawn) with a handler to start processing. The
/// manager is an explicit dependency: construct it once at process start
/// and pass it to whatever needs to enqueue, rather than reaching for a
/// global.
pub struct QueueManager {
    config: QueueConfig,
    db: Arc<Mutex<Connection>>,
    events_tx: mpsc::UnboundedSender<QueueEvent>,
    events_rx: Mutex<Option<UnboundedReceiver<QueueEvent>>>,
}

impl QueueManager {
    /// Create a new queue manager with the given configuration.
    ///
    /// Opens (or creates) the SQLite database and requeues any jobs that
    /// were interrupted by a previous crash.
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        let conn = db::open_database(config.db_path.as_deref())?;

        let requeued = db::requeue_interrupted(&conn)?;
        if requeued > 0 {
            tracing::info!(count = requeued, "requeued interrupted jobs");
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            db: Arc::new(Mutex::new(conn)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, QueueError> {
        self.db.lock().map_err(|e| QueueError::Other(e.to_string()))
    }

    /// Add a job to the queue. Returns `true` if the job was inserted and
    /// `false` if a job with the same id already exists (idempotent
    /// re-enqueue: pending or in-flight duplicates are silently dropped).
    pub fn enqueue<P>(&self, job: QueueJob<P>) -> Result<bool, QueueError>
    where
        P: Serialize + DeserializeOwned + Send,
    {
        let payload = serde_json::to_value(&job.payload)?;
        let timeout = job.timeout.unwrap_or(self.config.job_timeout);
        let conn = self.conn()?;
        let inserted = db::enqueue(
            &conn,
            &job.id,
            job.priority,
            &payload,
            self.config.max_attempts,
            timeout,
            job.delay,
        )?;
        if !inserted {
            tracing::debug!(job_id = %job.id, "duplicate enqueue ignored");
        }
        Ok(inserted)
    }

    /// Get a single job by id.
    pub fn get_job(&self, job_id: &str) -> Result<JobRecord, QueueError> {
        let conn = self.conn()?;
        db::get_job(&conn, job_id)?.ok_or_else(|| QueueError::NotFound(job_id.to_string()))
    }

    /// List all jobs, in-flight first.
    pub fn list_jobs(&self) -> Result<Vec<JobRecord>, QueueError> {
        let conn = self.conn()?;
        Ok(db::list_jobs(&conn)?)
    }

    /// Prune completed/failed jobs older than the configured retention
    /// window. Returns the number of jobs deleted.
    pub fn prune(&self) -> Result<u32, QueueError> {
        let conn = self.conn()?;
        Ok(db::prune_finished(&conn, self.config.retention_days)?)
    }

    /// Take the status-event receiver. The channel has a single consumer;
    /// subsequent calls return `None`.
    pub fn take_events(&self) -> Option<UnboundedReceiver<QueueEvent>> {
        self.events_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Spawn the background executor with the given handler and return
    /// the manager wrapped in an `Arc` for sharing.
    pub fn spawn<H>(self, handler: H) -> Arc<Self>
    where
        H: JobHandler + Send + Sync + 'static,
    {
        let manager = Arc::new(self);
        let executor = Arc::new(QueueExecutor::new(
            manager.config.clone(),
            Arc::clone(&manager.db),
            manager.events_tx.clone(),
        ));
        executor.spawn(Arc::new(handler));
        manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobPriority, JobStatus};
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Payload {
        photo_id: String,
    }

    fn manager() -> QueueManager {
        QueueManager::new(QueueConfig::default()).unwrap()
    }

    #[test]
    fn enqueue_and_inspect() {
        let m = manager();
        let inserted = m
            .enqueue(
                QueueJob::new(Payload {
                    photo_id: "p1".into(),
                })
                .with_id("vision-p1")
                .with_priority(JobPriority::High),
            )
            .unwrap();
        assert!(inserted);

        let job = m.get_job("vision-p1").unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn duplicate_enqueue_is_noop() {
        let m = manager();
        let job = || {
            QueueJob::new(Payload {
                photo_id: "p1".into(),
            })
            .with_id("vision-p1")
        };
        assert!(m.enqueue(job()).unwrap());
        assert!(!m.enqueue(job()).unwrap());
        assert_eq!(m.list_jobs().unwrap().len(), 1);
    }

    #[test]
    fn missing_job_is_not_found() {
        let m = manager();
        assert!(matches!(
            m.get_job("nope"),
            Err(QueueError::NotFound(_))
        ));
    }

    #[test]
    fn prune_keeps_recent_jobs() {
        let m = manager();
        m.enqueue(
            QueueJob::new(Payload {
                photo_id: "p1".into(),
            })
            .with_id("vision-p1"),
        )
        .unwrap();

        // Pending jobs are never pruned, and nothing is old enough.
        assert_eq!(m.prune().unwrap(), 0);
        assert_eq!(m.list_jobs().unwrap().len(), 1);
    }

    #[test]
    fn events_receiver_taken_once() {
        let m = manager();
        assert!(m.take_events().is_some());
        assert!(m.take_events().is_none());
    }
}
