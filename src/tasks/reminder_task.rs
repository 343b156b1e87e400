use std::time::Duration;

use crate::handlers::today;
use crate::services::reminder::ReminderService;

/// Periodic sweep for deployments without an external workflow queue:
/// expires overdue subscriptions and sends the reminders due today.
pub async fn start_reminder_task(reminders: ReminderService, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(60)));

    loop {
        interval.tick().await;

        log::info!("Running reminder sweep");
        match reminders.sweep(today()).await {
            Ok(report) => log::info!(
                "Reminder sweep done: checked={} expired={} sent={} failures={}",
                report.checked,
                report.expired,
                report.reminders_sent,
                report.failures
            ),
            Err(e) => log::error!("Reminder sweep failed: {:#}", e),
        }
    }
}
