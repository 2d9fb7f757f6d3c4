use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::{EnqueueError, JobHandle, JobQueue, NotificationJob};
use crate::article::Article;
use crate::clock::Clock;

/// Minimum number of days between two staleness notices for one article
pub const NOTIFY_INTERVAL_DAYS: i64 = 7;

/// A previous notice older than this instant no longer blocks a new one
pub fn notify_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(NOTIFY_INTERVAL_DAYS)
}

/// Whether the author of `article` may be sent another staleness notice.
///
/// True when the author was never notified, or when the last notice is
/// strictly older than one week. A notice exactly seven days old still
/// blocks.
pub fn should_notify(article: &Article, now: DateTime<Utc>) -> bool {
    match article.last_notified_author_at {
        None => true,
        Some(last) => last < notify_window_start(now),
    }
}

/// Enqueue a staleness notification for `article` if it is due.
///
/// Performs at most one `enqueue` call. Queue errors are returned unchanged;
/// retrying is left to the caller and the queue.
pub async fn notify_if_stale<Q>(
    article: &Article,
    now: DateTime<Utc>,
    queue: &Q,
) -> Result<Option<JobHandle>, EnqueueError>
where
    Q: JobQueue + ?Sized,
{
    if !should_notify(article, now) {
        debug!(
            article_id = %article.id,
            last_notified = ?article.last_notified_author_at,
            "Author notified within the last week, skipping"
        );
        return Ok(None);
    }

    let handle = queue.enqueue(NotificationJob::new(article.id)).await?;
    debug!(article_id = %article.id, job_id = %handle.id, "Queued staleness notification");
    Ok(Some(handle))
}

/// Staleness notifier bound to a clock and a job queue
pub struct StalenessNotifier<'a> {
    clock: &'a dyn Clock,
    queue: &'a dyn JobQueue,
}

impl<'a> StalenessNotifier<'a> {
    pub fn new(clock: &'a dyn Clock, queue: &'a dyn JobQueue) -> Self {
        Self { clock, queue }
    }

    pub fn should_notify(&self, article: &Article) -> bool {
        should_notify(article, self.clock.now())
    }

    pub async fn notify_if_stale(&self, article: &Article) -> Result<Option<JobHandle>, EnqueueError> {
        notify_if_stale(article, self.clock.now(), self.queue).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<NotificationJob>>,
    }

    impl RecordingQueue {
        fn jobs(&self) -> Vec<NotificationJob> {
            self.jobs.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, job: NotificationJob) -> Result<JobHandle, EnqueueError> {
            self.jobs.lock().unwrap().push(job);
            Ok(JobHandle {
                id: Uuid::new_v4(),
                article_id: job.article_id,
                already_queued: false,
            })
        }
    }

    struct FailingQueue;

    #[async_trait::async_trait]
    impl JobQueue for FailingQueue {
        async fn enqueue(&self, _job: NotificationJob) -> Result<JobHandle, EnqueueError> {
            Err(EnqueueError::Rejected("queue offline".to_string()))
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn article(last_notified: Option<DateTime<Utc>>) -> Article {
        let created = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        Article {
            id: Uuid::new_v4(),
            title: "Old news".to_string(),
            slug: "old-news".to_string(),
            content: None,
            author_id: None,
            editor_id: None,
            created_at: created,
            updated_at: created,
            last_notified_author_at: last_notified,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_should_notify_when_never_notified() {
        assert!(should_notify(&article(None), day(10)));
    }

    #[test]
    fn test_should_notify_window() {
        let now = day(20);
        assert!(!should_notify(&article(Some(now - Duration::days(6))), now));
        assert!(should_notify(&article(Some(now - Duration::days(8))), now));
    }

    #[test]
    fn test_exactly_seven_days_does_not_notify() {
        let now = day(20);
        assert!(!should_notify(&article(Some(now - Duration::days(7))), now));
        assert!(should_notify(
            &article(Some(now - Duration::days(7) - Duration::seconds(1))),
            now
        ));
    }

    #[tokio::test]
    async fn test_never_notified_article_is_enqueued() {
        let queue = RecordingQueue::default();
        let a = article(None);

        let handle = notify_if_stale(&a, day(10), &queue).await.unwrap();

        assert_eq!(handle.map(|h| h.article_id), Some(a.id));
        assert_eq!(queue.jobs(), vec![NotificationJob { article_id: a.id }]);
    }

    #[tokio::test]
    async fn test_recently_notified_article_is_not_enqueued() {
        let queue = RecordingQueue::default();
        let b = article(Some(day(5)));

        let handle = notify_if_stale(&b, day(10), &queue).await.unwrap();

        assert!(handle.is_none());
        assert!(queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_article_notified_nine_days_ago_is_enqueued() {
        let queue = RecordingQueue::default();
        let c = article(Some(day(1)));

        notify_if_stale(&c, day(10), &queue).await.unwrap();

        assert_eq!(queue.jobs(), vec![NotificationJob { article_id: c.id }]);
    }

    #[tokio::test]
    async fn test_enqueue_error_propagates() {
        let result = notify_if_stale(&article(None), day(10), &FailingQueue).await;
        assert!(matches!(result, Err(EnqueueError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_failing_queue_untouched_when_not_due() {
        let result = notify_if_stale(&article(Some(day(9))), day(10), &FailingQueue).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_notifier_uses_injected_clock() {
        let queue = RecordingQueue::default();
        let clock = FixedClock::new(day(10));
        let notifier = StalenessNotifier::new(&clock, &queue);

        let recent = article(Some(day(4)));
        let old = article(Some(day(2)));

        assert!(!notifier.should_notify(&recent));
        assert!(notifier.notify_if_stale(&recent).await.unwrap().is_none());
        assert!(notifier.notify_if_stale(&old).await.unwrap().is_some());
        assert_eq!(queue.jobs().len(), 1);
    }
}
