use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::article::is_stale;
use crate::clock::Clock;
use crate::config::NotificationConfig;
use crate::notify::{notify_if_stale, should_notify, Delivery, StalenessNotice};
use crate::storage::{ArticleRepository, Database, JobRepository, QueuedJob, UserRepository};
use crate::Result;

/// Outcome of one staleness batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Stale articles examined
    pub checked: u32,
    /// Articles for which a new notification job was queued
    pub enqueued: u32,
    /// Articles that already had an open job in the queue
    pub already_queued: u32,
    /// Articles whose author was notified within the last week
    pub skipped: u32,
}

/// Outcome of one job worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkReport {
    pub delivered: u32,
    pub retried: u32,
    pub failed: u32,
    /// Jobs completed without delivering: the article is gone, no longer
    /// stale, or its author was notified since the job was queued
    pub skipped: u32,
}

/// Daily batch: queue a staleness notification for every stale article whose
/// author has not been notified in the last week.
///
/// The first enqueue failure aborts the run and is returned to the caller.
pub async fn notify_stale_authors(db: &Database, clock: &dyn Clock) -> Result<NotifyReport> {
    let now = clock.now();
    let article_repo = ArticleRepository::with_clock(db, clock);
    let queue = JobRepository::with_clock(db, clock);

    let stale = article_repo.stale(now).await?;
    let mut report = NotifyReport::default();

    for article in &stale {
        report.checked += 1;
        match notify_if_stale(article, now, &queue).await? {
            Some(handle) if handle.already_queued => report.already_queued += 1,
            Some(_) => report.enqueued += 1,
            None => report.skipped += 1,
        }
    }

    if report.enqueued > 0 {
        info!(
            checked = report.checked,
            enqueued = report.enqueued,
            already_queued = report.already_queued,
            "Queued staleness notifications"
        );
    }

    Ok(report)
}

/// Work off due notification jobs.
///
/// Running jobs older than `stall_timeout_secs` are first put back in the
/// queue. A delivered notice stamps the article's `last_notified_author_at`
/// with the run time. Failed deliveries and storage errors are retried after
/// `retry_delay_secs` until `max_attempts` is reached.
pub async fn work_notification_jobs(
    db: &Database,
    clock: &dyn Clock,
    delivery: &dyn Delivery,
    config: &NotificationConfig,
) -> Result<WorkReport> {
    let retry_delay = config.retry_delay()?;
    let stall_cutoff = clock
        .now()
        .checked_sub_signed(config.stall_timeout()?)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let queue = JobRepository::with_clock(db, clock);
    queue.reclaim_stalled(stall_cutoff).await?;

    let jobs = queue.due(config.work_batch_size).await?;
    let mut report = WorkReport::default();

    for job in jobs {
        if !queue.claim(job.id).await? {
            debug!(job_id = %job.id, "Job claimed by another worker");
            continue;
        }

        let outcome = match run_job(db, clock, delivery, &job).await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Retryable(e.to_string()),
        };

        match outcome {
            JobOutcome::Delivered => {
                queue.complete(job.id).await?;
                report.delivered += 1;
            }
            JobOutcome::Skipped(reason) => {
                debug!(job_id = %job.id, article_id = %job.job.article_id, "Skipping notice: {}", reason);
                queue.complete(job.id).await?;
                report.skipped += 1;
            }
            JobOutcome::Undeliverable(reason) => {
                warn!(job_id = %job.id, article_id = %job.job.article_id, "{}", reason);
                queue.fail(job.id, &reason).await?;
                report.failed += 1;
            }
            JobOutcome::Retryable(reason) => {
                let attempts = job.attempts + 1;
                if attempts >= config.max_attempts {
                    warn!(
                        job_id = %job.id,
                        attempts,
                        "Giving up on staleness notification: {}",
                        reason
                    );
                    queue.fail(job.id, &reason).await?;
                    report.failed += 1;
                } else {
                    let retry_at = clock
                        .now()
                        .checked_add_signed(retry_delay)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    warn!(
                        job_id = %job.id,
                        attempts,
                        retry_at = %retry_at,
                        "Staleness notification failed: {}",
                        reason
                    );
                    queue.retry_at(job.id, &reason, retry_at).await?;
                    report.retried += 1;
                }
            }
        }
    }

    if report != WorkReport::default() {
        info!(
            delivered = report.delivered,
            retried = report.retried,
            failed = report.failed,
            skipped = report.skipped,
            "Worked off notification jobs"
        );
    }

    Ok(report)
}

enum JobOutcome {
    Delivered,
    Skipped(String),
    Undeliverable(String),
    Retryable(String),
}

async fn run_job(
    db: &Database,
    clock: &dyn Clock,
    delivery: &dyn Delivery,
    job: &QueuedJob,
) -> Result<JobOutcome> {
    let now = clock.now();
    let article_repo = ArticleRepository::with_clock(db, clock);

    let Some(article) = article_repo.find_by_id(job.job.article_id).await? else {
        return Ok(JobOutcome::Skipped("article no longer exists".to_string()));
    };

    // The batch that queued this job may have read the article before
    // another worker notified the author or the article was edited
    if !is_stale(&article, now) {
        return Ok(JobOutcome::Skipped(format!(
            "article '{}' was updated since it was queued",
            article.slug
        )));
    }
    if !should_notify(&article, now) {
        return Ok(JobOutcome::Skipped(format!(
            "author of '{}' was notified within the last week",
            article.slug
        )));
    }

    let Some(author_id) = article.author_id else {
        return Ok(JobOutcome::Undeliverable(format!("article '{}' has no author", article.slug)));
    };

    let Some(author) = UserRepository::new(db).find_by_id(author_id).await? else {
        return Ok(JobOutcome::Undeliverable(format!("author {} not found", author_id)));
    };

    let notice = StalenessNotice {
        article_id: article.id,
        title: article.title.clone(),
        slug: article.slug.clone(),
        author_name: author.name,
        author_email: author.email,
        updated_at: article.updated_at,
    };

    if let Err(e) = delivery.deliver(&notice).await {
        return Ok(JobOutcome::Retryable(e.to_string()));
    }

    article_repo.mark_author_notified(article.id, now).await?;
    Ok(JobOutcome::Delivered)
}
