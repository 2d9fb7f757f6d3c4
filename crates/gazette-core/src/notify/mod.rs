mod delivery;
mod job;
mod staleness;

pub use delivery::{Delivery, LogDelivery, StalenessNotice};
pub use job::{EnqueueError, JobHandle, JobQueue, NotificationJob};
pub use staleness::{notify_if_stale, notify_window_start, should_notify, StalenessNotifier, NOTIFY_INTERVAL_DAYS};
