use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::Result;

/// Everything a delivery channel needs to tell an author their article is stale
#[derive(Debug, Clone)]
pub struct StalenessNotice {
    pub article_id: Uuid,
    pub title: String,
    pub slug: String,
    pub author_name: String,
    pub author_email: String,
    pub updated_at: DateTime<Utc>,
}

/// Channel that delivers staleness notices to authors
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, notice: &StalenessNotice) -> Result<()>;
}

/// Writes notices to the log
#[derive(Debug, Default)]
pub struct LogDelivery;

#[async_trait::async_trait]
impl Delivery for LogDelivery {
    async fn deliver(&self, notice: &StalenessNotice) -> Result<()> {
        info!(
            article_id = %notice.article_id,
            slug = %notice.slug,
            author = %notice.author_email,
            last_updated = %notice.updated_at.format("%Y-%m-%d"),
            "Article '{}' has gone stale, notifying {}",
            notice.title,
            notice.author_name
        );
        Ok(())
    }
}
