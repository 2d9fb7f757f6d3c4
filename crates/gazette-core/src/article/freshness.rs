//! Freshness and staleness classification.
//!
//! An article is *fresh* when it was created or updated within the last
//! [`FRESH_WINDOW_DAYS`] days, and *stale* when its last update is more than
//! [`STALE_WINDOW_MONTHS`] calendar months old. The predicates are not
//! complements: an article updated eight days ago is neither.
//!
//! Staleness looks at `updated_at` alone. Creation time is not consulted, so
//! an article that was edited once long ago is as stale as one that never was.

use chrono::{DateTime, Duration, Months, Utc};

use super::Article;

pub const FRESH_WINDOW_DAYS: i64 = 7;
pub const STALE_WINDOW_MONTHS: u32 = 6;

/// Oldest `updated_at` that still counts as fresh
pub fn fresh_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(FRESH_WINDOW_DAYS)
}

/// Articles updated strictly before this instant are stale
pub fn stale_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(STALE_WINDOW_MONTHS))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn is_fresh(article: &Article, now: DateTime<Utc>) -> bool {
    article.updated_at >= fresh_cutoff(now)
}

pub fn is_stale(article: &Article, now: DateTime<Utc>) -> bool {
    article.updated_at < stale_cutoff(now)
}
