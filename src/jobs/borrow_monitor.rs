use crate::{
    database::MongoDB,
    services::email_service::Mailer,
    services::{borrow_service, membership_service, settings_service},
    utils::AppError,
};
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Counts from one monitor pass.
#[derive(Debug, Default, PartialEq)]
pub struct MonitorReport {
    pub marked_overdue: u64,
    pub reminders_sent: u64,
    pub memberships_expired: u64,
}

/// Spawns the periodic borrow/membership sweep.
/// Runs once at startup, then every `interval_secs`.
pub async fn start_borrow_monitor(db: MongoDB, mailer: Arc<dyn Mailer>, interval_secs: u64) {
    log::info!("⏱️ Starting borrow monitor (every {}s)", interval_secs);

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            // First tick completes immediately
            ticker.tick().await;

            match run_once(&db, mailer.as_ref()).await {
                Ok(report) => {
                    if report != MonitorReport::default() {
                        log::info!(
                            "✅ Monitor pass: {} overdue, {} reminders, {} memberships expired",
                            report.marked_overdue,
                            report.reminders_sent,
                            report.memberships_expired
                        );
                    } else {
                        log::debug!("✅ Monitor pass: nothing to do");
                    }
                }
                Err(e) => {
                    log::error!("❌ Monitor pass failed: {}", e);
                }
            }
        }
    });

    log::info!("✅ Borrow monitor started successfully");
}

/// One sweep: flag overdue borrows, send due-soon reminders, expire memberships.
/// Settings are re-read on every pass so fee and notification changes apply immediately.
pub async fn run_once(db: &MongoDB, mailer: &dyn Mailer) -> Result<MonitorReport, AppError> {
    let settings = settings_service::get_settings(db).await?;

    let marked_overdue = borrow_service::mark_overdue(db, mailer, &settings).await?;
    let reminders_sent = borrow_service::send_due_reminders(db, mailer, &settings).await?;
    let memberships_expired = membership_service::expire_memberships(db).await?;

    Ok(MonitorReport { marked_overdue, reminders_sent, memberships_expired })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email_service::testing::RecordingMailer;

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_run_once_on_empty_database() {
        let db = MongoDB::new("mongodb://localhost:27017/library_monitor_test").await.unwrap();
        let mailer = RecordingMailer::default();

        let first = run_once(&db, &mailer).await.unwrap();
        let second = run_once(&db, &mailer).await.unwrap();

        // A second pass never re-flags or re-notifies
        assert_eq!(second.marked_overdue, 0);
        assert_eq!(second.memberships_expired, 0);
        assert!(mailer.sent.lock().unwrap().len() as u64 >= first.marked_overdue);
    }
}
