use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Payload of a staleness notification job.
///
/// Only the article identifier travels with the job; the runner reloads the
/// article when the job is worked off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub article_id: Uuid,
}

impl NotificationJob {
    /// Job kind stored alongside the payload
    pub const KIND: &'static str = "notify_author_of_staleness";

    pub fn new(article_id: Uuid) -> Self {
        Self { article_id }
    }
}

/// Reference to an enqueued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: Uuid,
    pub article_id: Uuid,
    /// The queue already held an open job for this article and returned it
    /// instead of adding another
    #[serde(default)]
    pub already_queued: bool,
}

#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("job store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to serialize job: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("job rejected: {0}")]
    Rejected(String),
}

/// Destination for notification jobs
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: NotificationJob) -> Result<JobHandle, EnqueueError>;
}
