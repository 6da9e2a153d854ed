use crate::types::{JobPriority, JobRecord, JobStatus};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS queue_jobs (
    id              TEXT PRIMARY KEY,
    priority        INTEGER DEFAULT 2,
    status          TEXT CHECK(status IN ('pending', 'processing', 'completed', 'failed')),
    payload_json    TEXT NOT NULL,
    attempts        INTEGER DEFAULT 0,
    max_attempts    INTEGER DEFAULT 3,
    timeout_secs    INTEGER DEFAULT 120,
    next_run_at     DATETIME,
    created_at      DATETIME DEFAULT CURRENT_TIMESTAMP,
    started_at      DATETIME,
    completed_at    DATETIME,
    error_message   TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_status_priority ON queue_jobs(status, priority, next_run_at);
"#;

/// Open (or create) the queue database. Pass `None` for an in-memory database.
pub fn open_database(path: Option<&std::path::Path>) -> Result<Connection> {
    let conn = match path {
        Some(p) => Connection::open(p).context("Failed to open queue database")?,
        None => Connection::open_in_memory().context("Failed to open in-memory database")?,
    };

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to set PRAGMA options")?;

    conn.execute_batch(SCHEMA)
        .context("Failed to create queue schema")?;

    Ok(conn)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Insert a job unless one with the same id already exists. Returns
/// `true` if the job was inserted, `false` if the id was already present
/// (idempotent re-enqueue).
pub fn enqueue(
    conn: &Connection,
    job_id: &str,
    priority: JobPriority,
    payload: &Value,
    max_attempts: u32,
    timeout: Duration,
    delay: Option<Duration>,
) -> Result<bool> {
    let runnable_at = match delay {
        Some(d) => (chrono::Utc::now() + chrono::Duration::from_std(d)?).to_rfc3339(),
        None => now_rfc3339(),
    };
    // Only pending/in-flight rows dedup; a finished run of the same id
    // gives way to the fresh job.
    conn.execute(
        "DELETE FROM queue_jobs WHERE id = ?1 AND status IN ('completed', 'failed')",
        params![job_id],
    )
    .context("Failed to clear finished duplicate")?;
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO queue_jobs
                 (id, priority, status, payload_json, max_attempts, timeout_secs, next_run_at)
             VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6)",
            params![
                job_id,
                priority.as_i32(),
                serde_json::to_string(payload)?,
                max_attempts,
                timeout.as_secs(),
                runnable_at,
            ],
        )
        .context("Failed to enqueue job")?;
    Ok(changed == 1)
}

/// A job claimed for execution: marked processing, attempts incremented.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: String,
    pub payload: Value,
    /// Attempt number of this execution (1-based)
    pub attempt: u32,
    pub max_attempts: u32,
    pub timeout: Duration,
}

/// Claim the next runnable job: highest priority first, then FIFO,
/// skipping jobs whose `next_run_at` is still in the future. The claim
/// marks the row processing and increments its attempt counter in the
/// same call, so a job is never handed to two workers.
pub fn claim_next(conn: &Connection) -> Result<Option<ClaimedJob>> {
    let now = now_rfc3339();
    let mut stmt = conn
        .prepare(
            "SELECT id, payload_json, attempts, max_attempts, timeout_secs
             FROM queue_jobs
             WHERE status = 'pending' AND (next_run_at IS NULL OR next_run_at <= ?1)
             ORDER BY priority ASC, created_at ASC
             LIMIT 1",
        )
        .context("Failed to prepare claim query")?;

    let row = stmt
        .query_row(params![now], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, u64>(4)?,
            ))
        })
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })
        .context("Failed to query next runnable job")?;

    let Some((id, payload_json, attempts, max_attempts, timeout_secs)) = row else {
        return Ok(None);
    };

    conn.execute(
        "UPDATE queue_jobs
         SET status = 'processing', started_at = ?1, attempts = attempts + 1
         WHERE id = ?2 AND status = 'pending'",
        params![now_rfc3339(), id],
    )
    .context("Failed to mark job as processing")?;

    let payload: Value =
        serde_json::from_str(&payload_json).context("Failed to parse job payload JSON")?;

    Ok(Some(ClaimedJob {
        id,
        payload,
        attempt: attempts + 1,
        max_attempts,
        timeout: Duration::from_secs(timeout_secs),
    }))
}

/// Mark a job as completed and set completed_at.
pub fn mark_completed(conn: &Connection, job_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE queue_jobs SET status = 'completed', completed_at = ?1 WHERE id = ?2",
        params![now_rfc3339(), job_id],
    )
    .context("Failed to mark job as completed")?;
    Ok(())
}

/// Reschedule a failed attempt: back to pending with an exponentially
/// backed-off `next_run_at` (`base * 2^(attempt-1)`). Returns the delay
/// applied.
pub fn schedule_retry(
    conn: &Connection,
    job_id: &str,
    error: &str,
    backoff_base: Duration,
) -> Result<Duration> {
    let attempts: u32 = conn
        .query_row(
            "SELECT attempts FROM queue_jobs WHERE id = ?1",
            params![job_id],
            |row| row.get(0),
        )
        .with_context(|| format!("Job '{}' not found", job_id))?;

    let delay = backoff_base * 2u32.saturating_pow(attempts.saturating_sub(1));
    let next_run_at = (chrono::Utc::now() + chrono::Duration::from_std(delay)?).to_rfc3339();

    conn.execute(
        "UPDATE queue_jobs
         SET status = 'pending', next_run_at = ?1, error_message = ?2
         WHERE id = ?3",
        params![next_run_at, error, job_id],
    )
    .context("Failed to schedule retry")?;
    Ok(delay)
}

/// Mark a job as terminally failed with an error message.
pub fn mark_failed(conn: &Connection, job_id: &str, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE queue_jobs SET status = 'failed', completed_at = ?1, error_message = ?2 WHERE id = ?3",
        params![now_rfc3339(), error, job_id],
    )
    .context("Failed to mark job as failed")?;
    Ok(())
}

/// Re-queue any jobs that were mid-processing when the process crashed.
/// Their interrupted attempt stays counted. Returns the number requeued.
pub fn requeue_interrupted(conn: &Connection) -> Result<u32> {
    let count = conn
        .execute(
            "UPDATE queue_jobs SET status = 'pending', next_run_at = ?1 WHERE status = 'processing'",
            params![now_rfc3339()],
        )
        .context("Failed to requeue interrupted jobs")?;
    Ok(count as u32)
}

/// Delete completed/failed jobs older than the retention window.
/// Returns the number of jobs deleted.
pub fn prune_finished(conn: &Connection, days: u32) -> Result<u32> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(days as i64)).to_rfc3339();
    let count = conn
        .execute(
            "DELETE FROM queue_jobs
             WHERE status IN ('completed', 'failed')
             AND completed_at < ?1",
            params![cutoff],
        )
        .context("Failed to prune finished queue jobs")?;
    Ok(count as u32)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let priority: i32 = row.get(1)?;
    let status: String = row.get(2)?;
    Ok(JobRecord {
        id: row.get(0)?,
        priority: JobPriority::from_i32(priority),
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
        payload_json: row.get(3)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        error_message: row.get(6)?,
        created_at: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
        next_run_at: row.get(10)?,
    })
}

const RECORD_COLUMNS: &str = "id, priority, status, payload_json, attempts, max_attempts, \
     error_message, created_at, started_at, completed_at, next_run_at";

/// Get a single job by id.
pub fn get_job(conn: &Connection, job_id: &str) -> Result<Option<JobRecord>> {
    let sql = format!("SELECT {} FROM queue_jobs WHERE id = ?1", RECORD_COLUMNS);
    let mut stmt = conn.prepare(&sql).context("Failed to prepare get_job")?;
    stmt.query_row(params![job_id], record_from_row)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })
        .context("Failed to read job row")
}

/// List all jobs, in-flight first, then by priority and age.
pub fn list_jobs(conn: &Connection) -> Result<Vec<JobRecord>> {
    let sql = format!(
        "SELECT {} FROM queue_jobs
         ORDER BY
            CASE status
                WHEN 'processing' THEN 0
                WHEN 'pending' THEN 1
                WHEN 'completed' THEN 2
                WHEN 'failed' THEN 3
            END,
            priority ASC,
            created_at ASC",
        RECORD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql).context("Failed to prepare list_jobs")?;
    let rows = stmt
        .query_map([], record_from_row)
        .context("Failed to execute list_jobs query")?;

    let mut jobs = Vec::new();
    for row in rows {
        jobs.push(row.context("Failed to read job row")?);
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        open_database(None).unwrap()
    }

    fn enqueue_simple(conn: &Connection, id: &str, priority: JobPriority) -> bool {
        enqueue(
            conn,
            id,
            priority,
            &serde_json::json!({"photo": id}),
            3,
            Duration::from_secs(60),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        assert!(open_database(None).is_ok());
    }

    #[test]
    fn test_enqueue_and_claim() {
        let conn = setup();
        assert!(enqueue_simple(&conn, "job-1", JobPriority::Normal));

        let claimed = claim_next(&conn).unwrap().unwrap();
        assert_eq!(claimed.id, "job-1");
        assert_eq!(claimed.attempt, 1);
        assert_eq!(claimed.max_attempts, 3);
        assert_eq!(claimed.payload["photo"], "job-1");

        // Claimed jobs are gone from the runnable set.
        assert!(claim_next(&conn).unwrap().is_none());
    }

    #[test]
    fn test_enqueue_dedup() {
        let conn = setup();
        assert!(enqueue_simple(&conn, "vision-p1", JobPriority::Normal));
        assert!(!enqueue_simple(&conn, "vision-p1", JobPriority::Normal));

        // Still a no-op while the job is in-flight.
        claim_next(&conn).unwrap().unwrap();
        assert!(!enqueue_simple(&conn, "vision-p1", JobPriority::High));

        // A finished run no longer blocks re-enqueue.
        mark_completed(&conn, "vision-p1").unwrap();
        assert!(enqueue_simple(&conn, "vision-p1", JobPriority::Normal));
    }

    #[test]
    fn test_priority_ordering() {
        let conn = setup();
        enqueue_simple(&conn, "normal-1", JobPriority::Normal);
        enqueue_simple(&conn, "high-1", JobPriority::High);

        assert_eq!(claim_next(&conn).unwrap().unwrap().id, "high-1");
        assert_eq!(claim_next(&conn).unwrap().unwrap().id, "normal-1");
    }

    #[test]
    fn test_delayed_job_not_runnable() {
        let conn = setup();
        enqueue(
            &conn,
            "later",
            JobPriority::Normal,
            &serde_json::json!({}),
            3,
            Duration::from_secs(60),
            Some(Duration::from_secs(3600)),
        )
        .unwrap();
        assert!(claim_next(&conn).unwrap().is_none());
    }

    #[test]
    fn test_mark_completed() {
        let conn = setup();
        enqueue_simple(&conn, "job-1", JobPriority::Normal);
        claim_next(&conn).unwrap().unwrap();
        mark_completed(&conn, "job-1").unwrap();

        let job = get_job(&conn, "job-1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_schedule_retry_backoff_and_rerun() {
        let conn = setup();
        enqueue_simple(&conn, "job-1", JobPriority::Normal);

        claim_next(&conn).unwrap().unwrap();
        let d1 = schedule_retry(&conn, "job-1", "boom", Duration::from_secs(0)).unwrap();
        assert_eq!(d1, Duration::from_secs(0));

        // Zero backoff: runnable again immediately, second attempt.
        let second = claim_next(&conn).unwrap().unwrap();
        assert_eq!(second.id, "job-1");
        assert_eq!(second.attempt, 2);

        // Exponential growth with a real base: attempt 2 -> base * 2.
        let d2 = schedule_retry(&conn, "job-1", "boom again", Duration::from_secs(5)).unwrap();
        assert_eq!(d2, Duration::from_secs(10));

        // Backed-off job is not runnable yet.
        assert!(claim_next(&conn).unwrap().is_none());

        let job = get_job(&conn, "job-1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.error_message.as_deref(), Some("boom again"));
    }

    #[test]
    fn test_mark_failed_terminal() {
        let conn = setup();
        enqueue_simple(&conn, "job-1", JobPriority::Normal);
        claim_next(&conn).unwrap().unwrap();
        mark_failed(&conn, "job-1", "exhausted").unwrap();

        let job = get_job(&conn, "job-1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("exhausted"));
        assert!(claim_next(&conn).unwrap().is_none());
    }

    #[test]
    fn test_requeue_interrupted() {
        let conn = setup();
        enqueue_simple(&conn, "job-1", JobPriority::Normal);
        claim_next(&conn).unwrap().unwrap();

        assert_eq!(requeue_interrupted(&conn).unwrap(), 1);

        // The interrupted attempt stays counted.
        let reclaimed = claim_next(&conn).unwrap().unwrap();
        assert_eq!(reclaimed.id, "job-1");
        assert_eq!(reclaimed.attempt, 2);
    }

    #[test]
    fn test_prune_finished() {
        let conn = setup();
        enqueue_simple(&conn, "job-1", JobPriority::Normal);
        claim_next(&conn).unwrap().unwrap();
        mark_completed(&conn, "job-1").unwrap();

        // Completed just now: retained.
        assert_eq!(prune_finished(&conn, 30).unwrap(), 0);

        let old = (chrono::Utc::now() - chrono::Duration::days(10)).to_rfc3339();
        conn.execute(
            "UPDATE queue_jobs SET completed_at = ?1 WHERE id = 'job-1'",
            params![old],
        )
        .unwrap();
        assert_eq!(prune_finished(&conn, 5).unwrap(), 1);
    }

    #[test]
    fn test_list_jobs_ordering() {
        let conn = setup();
        enqueue_simple(&conn, "a", JobPriority::Normal);
        enqueue_simple(&conn, "b", JobPriority::High);
        enqueue_simple(&conn, "c", JobPriority::Normal);
        claim_next(&conn).unwrap(); // claims b

        let jobs = list_jobs(&conn).unwrap();
        assert_eq!(jobs.len(), 3);
        // Processing first, then pending by priority/age.
        assert_eq!(jobs[0].id, "b");
        assert_eq!(jobs[0].status, JobStatus::Processing);
        assert_eq!(jobs[1].id, "a");
        assert_eq!(jobs[2].id, "c");
    }

    #[test]
    fn test_get_job_not_found() {
        let conn = setup();
        assert!(get_job(&conn, "nonexistent").unwrap().is_none());
    }
}
