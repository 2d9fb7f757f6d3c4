//! Retry for SQLite writes that lose a lock race.
//!
//! The daemon's batch and job worker may write to the database while a CLI
//! invocation holds a write lock. Bookkeeping writes on the notification path
//! (job status changes, `last_notified_author_at`) go through [`with_retry`]
//! so a busy database delays them instead of leaving a job half-processed.

use std::future::Future;
use std::time::Duration;

/// Maximum number of retry attempts
pub const MAX_RETRIES: u32 = 4;

/// Check if a SQLite error is a lock conflict worth retrying
///
/// - SQLITE_BUSY (5)
/// - SQLITE_LOCKED (6)
/// - SQLITE_BUSY_SNAPSHOT (517)
/// - SQLITE_BUSY_TIMEOUT (773)
pub fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string());
            matches!(code.as_deref(), Some("5") | Some("6") | Some("517") | Some("773"))
        }
        _ => false,
    }
}

/// 100ms, 200ms, 400ms, 800ms
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(attempt.saturating_sub(1)))
}

/// Run `operation`, retrying with exponential backoff on lock conflicts
pub async fn with_retry<F, Fut, T>(operation: F) -> std::result::Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if is_transient_error(&e) && attempts < MAX_RETRIES => {
                attempts += 1;
                let delay = backoff_delay(attempts);
                tracing::debug!(
                    error = %e,
                    attempt = attempts,
                    max_retries = MAX_RETRIES,
                    delay_ms = delay.as_millis(),
                    "Database busy, retrying write"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
