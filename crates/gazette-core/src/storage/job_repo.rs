use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::retry::with_retry;
use super::Database;
use crate::clock::{Clock, SystemClock};
use crate::notify::{EnqueueError, JobHandle, JobQueue, NotificationJob};
use crate::{Error, Result};

/// Lifecycle of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Other(format!("unknown job status: {}", other))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job as stored in the queue
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: Uuid,
    pub job: NotificationJob,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct JobRow {
    id: String,
    payload: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    run_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for QueuedJob {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(QueuedJob {
            id: Uuid::parse_str(&row.id)?,
            job: serde_json::from_str(&row.payload)?,
            status: row.status.parse()?,
            attempts: row.attempts.max(0) as u32,
            last_error: row.last_error,
            run_at: row.run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, payload, status, attempts, last_error, run_at, created_at, updated_at";

/// SQLite-backed queue of staleness notification jobs.
///
/// At most one job per article can be open (pending or running); enqueueing
/// again while one is open hands back the existing job.
pub struct JobRepository<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
}

impl<'a> JobRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_clock(db, &SystemClock)
    }

    pub fn with_clock(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self { db, clock }
    }

    /// Queue `job` to run immediately
    pub async fn enqueue(&self, job: NotificationJob) -> std::result::Result<JobHandle, EnqueueError> {
        let id = Uuid::new_v4();
        let now = self.clock.now();
        let payload = serde_json::to_string(&job)?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO jobs
            (id, kind, article_id, payload, status, attempts, run_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(NotificationJob::KIND)
        .bind(job.article_id.to_string())
        .bind(&payload)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(JobHandle {
                id,
                article_id: job.article_id,
                already_queued: false,
            });
        }

        let existing: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM jobs
            WHERE kind = ? AND article_id = ? AND status IN ('pending', 'running')
            "#,
        )
        .bind(NotificationJob::KIND)
        .bind(job.article_id.to_string())
        .fetch_optional(self.db.pool())
        .await?;

        let (existing_id,) = existing.ok_or_else(|| {
            EnqueueError::Rejected(format!(
                "job for article {} conflicted but no open job was found",
                job.article_id
            ))
        })?;

        tracing::debug!(
            article_id = %job.article_id,
            job_id = %existing_id,
            "Notification already queued for article"
        );

        Ok(JobHandle {
            id: Uuid::parse_str(&existing_id)
                .map_err(|e| EnqueueError::Rejected(format!("corrupt job id: {}", e)))?,
            article_id: job.article_id,
            already_queued: true,
        })
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<QueuedJob>> {
        let query = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        let row: Option<JobRow> = sqlx::query_as(&query)
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;

        row.map(QueuedJob::try_from).transpose()
    }

    /// Pending jobs whose `run_at` has passed, oldest first
    pub async fn due(&self, limit: u32) -> Result<Vec<QueuedJob>> {
        let query = format!(
            "SELECT {} FROM jobs WHERE status = 'pending' AND run_at <= ? ORDER BY run_at ASC LIMIT ?",
            JOB_COLUMNS
        );
        let rows: Vec<JobRow> = sqlx::query_as(&query)
            .bind(self.clock.now())
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter().map(QueuedJob::try_from).collect()
    }

    pub async fn list_by_status(&self, status: JobStatus) -> Result<Vec<QueuedJob>> {
        let query = format!(
            "SELECT {} FROM jobs WHERE status = ? ORDER BY created_at ASC",
            JOB_COLUMNS
        );
        let rows: Vec<JobRow> = sqlx::query_as(&query)
            .bind(status.as_str())
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter().map(QueuedJob::try_from).collect()
    }

    /// Move a pending job to running and count the attempt.
    ///
    /// Returns false when another worker claimed it first.
    pub async fn claim(&self, id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        let id_str = id.to_string();

        let result = with_retry(|| {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'running', attempts = attempts + 1, updated_at = ?
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(now)
            .bind(&id_str)
            .execute(self.db.pool())
        })
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Put running jobs untouched since `before` back in the queue.
    ///
    /// A worker that dies between claim and completion leaves its job
    /// running; until reclaimed, that job also blocks new enqueues for the
    /// article. Returns the number of jobs reclaimed.
    pub async fn reclaim_stalled(&self, before: DateTime<Utc>) -> Result<u32> {
        let now = self.clock.now();

        let result = with_retry(|| {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'pending',
                    last_error = COALESCE(last_error, 'worker stopped before finishing'),
                    run_at = ?,
                    updated_at = ?
                WHERE status = 'running' AND updated_at < ?
                "#,
            )
            .bind(now)
            .bind(now)
            .bind(before)
            .execute(self.db.pool())
        })
        .await?;

        let reclaimed = result.rows_affected() as u32;
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "Reclaimed stalled notification jobs");
        }
        Ok(reclaimed)
    }

    pub async fn complete(&self, id: Uuid) -> Result<()> {
        self.transition(id, JobStatus::Done, None, None).await
    }

    /// Put a running job back in the queue to run at `run_at`
    pub async fn retry_at(&self, id: Uuid, error: &str, run_at: DateTime<Utc>) -> Result<()> {
        self.transition(id, JobStatus::Pending, Some(error), Some(run_at))
            .await
    }

    pub async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        self.transition(id, JobStatus::Failed, Some(error), None).await
    }

    async fn transition(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let now = self.clock.now();
        let id_str = id.to_string();

        with_retry(|| {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = ?,
                    last_error = COALESCE(?, last_error),
                    run_at = COALESCE(?, run_at),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(status.as_str())
            .bind(error)
            .bind(run_at)
            .bind(now)
            .bind(&id_str)
            .execute(self.db.pool())
        })
        .await?;

        tracing::debug!(job_id = %id, status = %status, "Job status changed");
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'a> JobQueue for JobRepository<'a> {
    async fn enqueue(&self, job: NotificationJob) -> std::result::Result<JobHandle, EnqueueError> {
        JobRepository::enqueue(self, job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::fixtures::{article_updated_at, at};
    use crate::storage::ArticleRepository;

    #[tokio::test]
    async fn test_enqueue_stores_payload() {
        let db = Database::new_in_memory().await.unwrap();
        let article = article_updated_at(&db, "Old", at(2023, 1, 1)).await;
        let clock = FixedClock::new(at(2024, 1, 10));
        let queue = JobRepository::with_clock(&db, &clock);

        let handle = queue.enqueue(NotificationJob::new(article.id)).await.unwrap();

        let stored = queue.find_by_id(handle.id).await.unwrap().unwrap();
        assert_eq!(stored.job, NotificationJob::new(article.id));
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.attempts, 0);
        assert_eq!(stored.run_at, at(2024, 1, 10));
    }

    #[tokio::test]
    async fn test_open_job_is_deduplicated() {
        let db = Database::new_in_memory().await.unwrap();
        let article = article_updated_at(&db, "Old", at(2023, 1, 1)).await;
        let queue = JobRepository::new(&db);

        let first = queue.enqueue(NotificationJob::new(article.id)).await.unwrap();
        let second = queue.enqueue(NotificationJob::new(article.id)).await.unwrap();
        assert_eq!(second.id, first.id);
        assert!(!first.already_queued);
        assert!(second.already_queued);

        // Still deduplicated while the job is running
        assert!(queue.claim(first.id).await.unwrap());
        let third = queue.enqueue(NotificationJob::new(article.id)).await.unwrap();
        assert_eq!(third.id, first.id);

        assert_eq!(queue.list_by_status(JobStatus::Pending).await.unwrap().len(), 0);
        assert_eq!(queue.list_by_status(JobStatus::Running).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_job_allows_new_one() {
        let db = Database::new_in_memory().await.unwrap();
        let article = article_updated_at(&db, "Old", at(2023, 1, 1)).await;
        let queue = JobRepository::new(&db);

        let first = queue.enqueue(NotificationJob::new(article.id)).await.unwrap();
        queue.claim(first.id).await.unwrap();
        queue.complete(first.id).await.unwrap();

        let second = queue.enqueue(NotificationJob::new(article.id)).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_enqueue_for_missing_article_fails() {
        let db = Database::new_in_memory().await.unwrap();
        let queue = JobRepository::new(&db);

        let result = queue.enqueue(NotificationJob::new(Uuid::new_v4())).await;
        assert!(matches!(result, Err(EnqueueError::Database(_))));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_and_counts_attempts() {
        let db = Database::new_in_memory().await.unwrap();
        let article = article_updated_at(&db, "Old", at(2023, 1, 1)).await;
        let queue = JobRepository::new(&db);
        let handle = queue.enqueue(NotificationJob::new(article.id)).await.unwrap();

        assert!(queue.claim(handle.id).await.unwrap());
        assert!(!queue.claim(handle.id).await.unwrap());

        let job = queue.find_by_id(handle.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_due_respects_run_at() {
        let db = Database::new_in_memory().await.unwrap();
        let article = article_updated_at(&db, "Old", at(2023, 1, 1)).await;
        let clock = FixedClock::new(at(2024, 1, 10));
        let queue = JobRepository::with_clock(&db, &clock);

        let handle = queue.enqueue(NotificationJob::new(article.id)).await.unwrap();
        queue.claim(handle.id).await.unwrap();
        queue.retry_at(handle.id, "smtp down", at(2024, 1, 11)).await.unwrap();

        assert!(queue.due(10).await.unwrap().is_empty());

        let tomorrow = FixedClock::new(at(2024, 1, 11));
        let due = JobRepository::with_clock(&db, &tomorrow).due(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].last_error.as_deref(), Some("smtp down"));
    }

    #[tokio::test]
    async fn test_reclaim_stalled_running_jobs() {
        let db = Database::new_in_memory().await.unwrap();
        let article = article_updated_at(&db, "Old", at(2023, 1, 1)).await;
        let monday = FixedClock::new(at(2024, 1, 8));
        let handle = JobRepository::with_clock(&db, &monday)
            .enqueue(NotificationJob::new(article.id))
            .await
            .unwrap();
        JobRepository::with_clock(&db, &monday).claim(handle.id).await.unwrap();

        let tuesday = FixedClock::new(at(2024, 1, 9));
        let queue = JobRepository::with_clock(&db, &tuesday);

        // Claimed after the cutoff: left alone
        assert_eq!(queue.reclaim_stalled(at(2024, 1, 7)).await.unwrap(), 0);

        assert_eq!(queue.reclaim_stalled(at(2024, 1, 9)).await.unwrap(), 1);
        let job = queue.find_by_id(handle.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.run_at, at(2024, 1, 9));
        assert_eq!(queue.due(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_jobs_removed_with_article() {
        let db = Database::new_in_memory().await.unwrap();
        let article = article_updated_at(&db, "Old", at(2023, 1, 1)).await;
        let queue = JobRepository::new(&db);
        let handle = queue.enqueue(NotificationJob::new(article.id)).await.unwrap();

        ArticleRepository::new(&db).delete(article.id).await.unwrap();

        assert!(queue.find_by_id(handle.id).await.unwrap().is_none());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [JobStatus::Pending, JobStatus::Running, JobStatus::Done, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("archived".parse::<JobStatus>().is_err());
    }
}
