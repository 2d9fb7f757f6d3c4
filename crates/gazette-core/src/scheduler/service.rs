use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::notify::{Delivery, LogDelivery};
use crate::storage::Database;
use crate::Result;

use super::tasks::{notify_stale_authors, work_notification_jobs, NotifyReport, WorkReport};

/// Events emitted by the scheduler after each background run
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// The staleness batch finished
    AuthorsNotified { checked: u32, enqueued: u32 },
    /// The job worker finished
    JobsWorked { delivered: u32, retried: u32, failed: u32 },
    /// An error occurred during a background task
    Error { task: String, message: String },
}

/// Background scheduler that runs the staleness batch and the job worker
pub struct SchedulerService {
    db: Arc<Database>,
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
    delivery: Arc<dyn Delivery>,
    event_tx: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl SchedulerService {
    /// Create a new scheduler service using the system clock and log delivery
    pub fn new(db: Arc<Database>, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            config,
            clock: Arc::new(SystemClock),
            delivery: Arc::new(LogDelivery),
            event_tx: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the channel that delivers staleness notices to authors
    pub fn with_delivery(mut self, delivery: Arc<dyn Delivery>) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the event sender for run notifications
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Send an event (if event channel is configured)
    fn send_event(&self, event: SchedulerEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                warn!("Failed to send scheduler event: receiver dropped");
            }
        }
    }

    /// Run background tasks in a loop until shutdown signal
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let notifications = &self.config.notifications;

        if !notifications.enabled
            || notifications.batch_interval_secs == 0
            || notifications.work_interval_secs == 0
        {
            info!("Background scheduler disabled");
            // Still wait for shutdown
            let _ = shutdown.changed().await;
            return;
        }

        info!(
            "Scheduler started: batch={}s, work={}s",
            notifications.batch_interval_secs, notifications.work_interval_secs
        );

        let mut batch_interval =
            tokio::time::interval(Duration::from_secs(notifications.batch_interval_secs));
        let mut work_interval =
            tokio::time::interval(Duration::from_secs(notifications.work_interval_secs));

        // Skip the first tick (fires immediately)
        batch_interval.tick().await;
        work_interval.tick().await;

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }

                _ = batch_interval.tick() => {
                    debug!("Running scheduled staleness batch");
                    if let Err(e) = self.notify_now().await {
                        error!("Scheduled staleness batch failed: {}", e);
                        self.send_event(SchedulerEvent::Error {
                            task: "notify".to_string(),
                            message: e.to_string(),
                        });
                    }
                }

                _ = work_interval.tick() => {
                    debug!("Running scheduled job worker");
                    if let Err(e) = self.work_now().await {
                        error!("Scheduled job worker failed: {}", e);
                        self.send_event(SchedulerEvent::Error {
                            task: "work".to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Run the staleness batch immediately
    pub async fn notify_now(&self) -> Result<NotifyReport> {
        let report = notify_stale_authors(&self.db, self.clock.as_ref()).await?;
        self.send_event(SchedulerEvent::AuthorsNotified {
            checked: report.checked,
            enqueued: report.enqueued,
        });
        Ok(report)
    }

    /// Work off due jobs immediately
    pub async fn work_now(&self) -> Result<WorkReport> {
        let report = work_notification_jobs(
            &self.db,
            self.clock.as_ref(),
            self.delivery.as_ref(),
            &self.config.notifications,
        )
        .await?;
        self.send_event(SchedulerEvent::JobsWorked {
            delivered: report.delivered,
            retried: report.retried,
            failed: report.failed,
        });
        Ok(report)
    }
}
