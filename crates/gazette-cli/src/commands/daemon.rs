use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use gazette_core::{scheduler::SchedulerService, storage::Database, AppConfig};

/// Run the scheduler in the foreground until Ctrl+C
pub async fn run(db: Arc<Database>, config: Arc<AppConfig>) -> Result<()> {
    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    println!(
        "Daemon started (PID: {}). Press Ctrl+C to stop.",
        std::process::id()
    );
    println!("  Batch interval: {} seconds", config.notifications.batch_interval_secs);
    println!("  Work interval: {} seconds", config.notifications.work_interval_secs);

    SchedulerService::new(db, config).run(shutdown_rx).await;

    println!("Daemon stopped.");
    Ok(())
}
