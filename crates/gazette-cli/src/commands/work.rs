use anyhow::Result;

use gazette_core::{
    notify::LogDelivery, scheduler::work_notification_jobs, storage::Database, AppConfig, Clock,
};

pub async fn run(db: &Database, config: &AppConfig, clock: &dyn Clock) -> Result<()> {
    let report = work_notification_jobs(db, clock, &LogDelivery, &config.notifications).await?;

    println!(
        "Delivered {}, retrying {}, failed {}, skipped {}.",
        report.delivered, report.retried, report.failed, report.skipped
    );

    Ok(())
}
