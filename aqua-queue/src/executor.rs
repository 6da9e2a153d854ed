use crate::{config::QueueConfig, db, error::QueueError, events::QueueEvent, JobContext, JobHandler};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;

/// The background job executor.
///
/// A single dequeue loop claims runnable jobs (so a job id never has two
/// concurrent attempts) and spawns each attempt as its own task, bounded
/// by a semaphore sized to the configured concurrency. Each attempt runs
/// under its job's wall-clock timeout; failures are rescheduled with
/// exponential backoff until the attempt budget is exhausted.
pub struct QueueExecutor {
    config: QueueConfig,
    db: Arc<Mutex<Connection>>,
    events: UnboundedSender<QueueEvent>,
    semaphore: Arc<Semaphore>,
}

enum AttemptOutcome {
    Success(Option<String>),
    Failure(String),
}

impl QueueExecutor {
    pub fn new(
        config: QueueConfig,
        db: Arc<Mutex<Connection>>,
        events: UnboundedSender<QueueEvent>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        Self {
            config,
            db,
            events,
            semaphore,
        }
    }

    /// Spawn the dequeue loop as a background tokio task.
    pub fn spawn<H>(self: Arc<Self>, handler: Arc<H>) -> tokio::task::JoinHandle<()>
    where
        H: JobHandler + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            self.run_loop(handler).await;
        })
    }

    async fn run_loop<H>(&self, handler: Arc<H>)
    where
        H: JobHandler + Send + Sync + 'static,
    {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            // Respect the concurrency bound before claiming anything.
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };

            let claimed = {
                let conn = match self.db.lock() {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::error!(error = %e, "queue DB mutex poisoned");
                        return;
                    }
                };
                match db::claim_next(&conn) {
                    Ok(Some(job)) => job,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to claim next job");
                        continue;
                    }
                }
            };

            // A payload that no longer deserializes will never succeed:
            // terminal failure without consuming the retry budget.
            let payload: H::Payload = match serde_json::from_value(claimed.payload.clone()) {
                Ok(p) => p,
                Err(e) => {
                    let error = format!("Payload deserialization failed: {}", e);
                    tracing::error!(job_id = %claimed.id, error = %error, "dropping undeserializable job");
                    if let Ok(conn) = self.db.lock() {
                        let _ = db::mark_failed(&conn, &claimed.id, &error);
                    }
                    let _ = self.events.send(QueueEvent::Failed {
                        job_id: claimed.id,
                        error,
                        terminal: true,
                    });
                    continue;
                }
            };

            let ctx = JobContext {
                job_id: claimed.id.clone(),
                attempt: claimed.attempt,
                max_attempts: claimed.max_attempts,
            };
            tracing::debug!(
                job_id = %claimed.id,
                attempt = claimed.attempt,
                job_type = handler.job_type(),
                "job claimed"
            );
            let _ = self.events.send(QueueEvent::Started {
                job_id: claimed.id.clone(),
                attempt: claimed.attempt,
            });

            let handler = Arc::clone(&handler);
            let db = Arc::clone(&self.db);
            let events = self.events.clone();
            let backoff_base = self.config.backoff_base;
            let timeout = claimed.timeout;
            let job_id = claimed.id;
            let attempt = claimed.attempt;
            let max_attempts = claimed.max_attempts;

            tokio::spawn(async move {
                let _permit = permit;

                let outcome = match tokio::time::timeout(timeout, handler.execute(&ctx, payload))
                    .await
                {
                    Ok(Ok(result)) if result.success => AttemptOutcome::Success(result.output),
                    Ok(Ok(result)) => AttemptOutcome::Failure(
                        result.error.unwrap_or_else(|| "Unknown error".to_string()),
                    ),
                    Ok(Err(e)) => AttemptOutcome::Failure(e.to_string()),
                    Err(_) => {
                        AttemptOutcome::Failure(QueueError::Timeout(timeout.as_secs()).to_string())
                    }
                };

                match outcome {
                    AttemptOutcome::Success(output) => {
                        tracing::debug!(job_id = %job_id, attempt, "job completed");
                        if let Ok(conn) = db.lock() {
                            if let Err(e) = db::mark_completed(&conn, &job_id) {
                                tracing::error!(job_id = %job_id, error = %e, "failed to record completion");
                            }
                        }
                        let _ = events.send(QueueEvent::Completed { job_id, output });
                    }
                    AttemptOutcome::Failure(error) => {
                        let terminal = attempt >= max_attempts;
                        if let Ok(conn) = db.lock() {
                            let result = if terminal {
                                db::mark_failed(&conn, &job_id, &error)
                            } else {
                                db::schedule_retry(&conn, &job_id, &error, backoff_base).map(
                                    |delay| {
                                        tracing::warn!(
                                            job_id = %job_id,
                                            attempt,
                                            max_attempts,
                                            delay_ms = delay.as_millis() as u64,
                                            error = %error,
                                            "job attempt failed, retry scheduled"
                                        );
                                    },
                                )
                            };
                            if let Err(e) = result {
                                tracing::error!(job_id = %job_id, error = %e, "failed to record job failure");
                            }
                        }
                        if terminal {
                            tracing::error!(job_id = %job_id, attempt, error = %error, "job failed terminally");
                        }
                        let _ = events.send(QueueEvent::Failed {
                            job_id,
                            error,
                            terminal,
                        });
                    }
                }
            });
        }
    }
}
