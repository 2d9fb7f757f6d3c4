pub mod article;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod scheduler;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, NotificationConfig};
pub use error::{Error, Result};
pub use notify::{notify_if_stale, should_notify, EnqueueError, JobHandle, JobQueue, NotificationJob};
