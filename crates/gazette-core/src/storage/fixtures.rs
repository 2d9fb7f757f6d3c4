use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{ArticleRepository, Database, UserRepository};
use crate::article::{Article, NewArticle, NewUser, User};
use crate::clock::FixedClock;

/// Midnight UTC on the given day
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

/// Insert an article whose `created_at` and `updated_at` are `updated_at`
pub async fn article_updated_at(db: &Database, title: &str, updated_at: DateTime<Utc>) -> Article {
    let clock = FixedClock::new(updated_at);
    ArticleRepository::with_clock(db, &clock)
        .create(&NewArticle {
            title: title.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

/// Insert an article written by `author`, last updated at `updated_at`
pub async fn authored_article(
    db: &Database,
    title: &str,
    author: &User,
    updated_at: DateTime<Utc>,
) -> Article {
    let clock = FixedClock::new(updated_at);
    ArticleRepository::with_clock(db, &clock)
        .create(&NewArticle {
            title: title.to_string(),
            author_id: Some(author.id),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub async fn author(db: &Database, email: &str) -> User {
    UserRepository::new(db)
        .create(&NewUser {
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
        })
        .await
        .unwrap()
}
