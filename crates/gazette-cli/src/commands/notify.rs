use anyhow::Result;

use gazette_core::{scheduler::notify_stale_authors, storage::Database, Clock};

pub async fn run(db: &Database, clock: &dyn Clock) -> Result<()> {
    println!(
        "Checking stale articles as of {}...",
        clock.now().format("%Y-%m-%d %H:%M")
    );

    let report = notify_stale_authors(db, clock).await?;

    if report.checked == 0 {
        println!("No stale articles.");
    } else {
        println!(
            "Checked {} stale articles: {} notifications queued, {} already queued, {} notified within the last week.",
            report.checked, report.enqueued, report.already_queued, report.skipped
        );
    }

    Ok(())
}
