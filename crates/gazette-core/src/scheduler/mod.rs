mod service;
pub mod tasks;

pub use service::{SchedulerEvent, SchedulerService};
pub use tasks::{notify_stale_authors, work_notification_jobs, NotifyReport, WorkReport};
