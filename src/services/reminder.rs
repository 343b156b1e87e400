use chrono::{Duration, NaiveDate};
use serde::Serialize;
use uuid::Uuid;
use anyhow::Result;

use crate::error::AppError;
use crate::models::subscription::{Subscription, SubscriptionStatus};
use crate::services::{database::DatabaseService, mailer::Mailer};
use crate::utils::renewal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPlan {
    /// Threshold matched today, if any.
    pub due_today: Option<i64>,
    pub next_reminder_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ReminderOutcome {
    pub subscription_id: Uuid,
    pub status: SubscriptionStatus,
    pub reminder_sent: Option<i64>,
    pub next_reminder_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub expired: usize,
    pub reminders_sent: usize,
    pub failures: usize,
}

/// Decides which reminder (if any) is due on `today` and when the next one
/// falls. Only active subscriptions renewing today or later get reminders.
pub fn plan_reminders(subscription: &Subscription, today: NaiveDate, days_before: &[i64]) -> ReminderPlan {
    if subscription.status != SubscriptionStatus::Active || subscription.renewal_date < today {
        return ReminderPlan {
            due_today: None,
            next_reminder_date: None,
        };
    }

    let days_left = renewal::days_until(subscription.renewal_date, today);
    let due_today = days_before.iter().copied().find(|d| *d == days_left);
    let next_reminder_date = days_before
        .iter()
        .copied()
        .filter(|d| *d < days_left)
        .max()
        .map(|d| subscription.renewal_date - Duration::days(d));

    ReminderPlan {
        due_today,
        next_reminder_date,
    }
}

#[derive(Clone)]
pub struct ReminderService {
    db: DatabaseService,
    mailer: Mailer,
    days_before: Vec<i64>,
}

impl ReminderService {
    pub fn new(db: DatabaseService, mailer: Mailer, days_before: Vec<i64>) -> Self {
        Self { db, mailer, days_before }
    }

    /// Expires the subscription if its renewal date passed, then sends the
    /// reminder due today unless one already went out today. Returns the
    /// threshold that was sent.
    async fn remind(&self, subscription: &mut Subscription, today: NaiveDate) -> Result<Option<i64>> {
        if subscription.expire_if_due(today) {
            log::info!("Subscription {} expired on renewal date {}", subscription.id, subscription.renewal_date);
            self.db.update_subscription(subscription).await?;
            return Ok(None);
        }

        let plan = plan_reminders(subscription, today, &self.days_before);
        let days_before = match plan.due_today {
            Some(days) => days,
            None => return Ok(None),
        };

        if subscription.reminded_on(today) {
            log::debug!("Reminder for subscription {} already sent on {}", subscription.id, today);
            return Ok(None);
        }

        let user = match self.db.get_user(&subscription.owner).await? {
            Some(user) => user,
            None => {
                log::warn!("Owner {} of subscription {} not found, skipping reminder", subscription.owner, subscription.id);
                return Ok(None);
            }
        };

        let message = self.mailer.reminder_email(&user, subscription, days_before);
        self.mailer.send(&message).await?;

        subscription.mark_reminded(today);
        self.db.update_subscription(subscription).await?;
        Ok(Some(days_before))
    }

    pub async fn process(&self, subscription_id: &Uuid, today: NaiveDate) -> Result<ReminderOutcome, AppError> {
        let mut subscription = self.db
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        let reminder_sent = self.remind(&mut subscription, today).await?;
        let plan = plan_reminders(&subscription, today, &self.days_before);

        Ok(ReminderOutcome {
            subscription_id: subscription.id,
            status: subscription.status,
            reminder_sent,
            next_reminder_date: plan.next_reminder_date,
        })
    }

    pub async fn sweep(&self, today: NaiveDate) -> Result<SweepReport> {
        let subscriptions = self.db.get_active_subscriptions().await?;
        let mut report = SweepReport {
            checked: subscriptions.len(),
            ..Default::default()
        };

        for mut subscription in subscriptions {
            match self.remind(&mut subscription, today).await {
                Ok(Some(_)) => report.reminders_sent += 1,
                Ok(None) if subscription.status == SubscriptionStatus::Expired => report.expired += 1,
                Ok(None) => {}
                Err(e) => {
                    log::error!("Reminder for subscription {} failed: {:#}", subscription.id, e);
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::models::user::User;

    fn date(value: &str) -> NaiveDate {
        renewal::parse_date(value).unwrap()
    }

    fn subscription_renewing(renewal_date: &str) -> Subscription {
        let mut subscription = Subscription::test_fixture(Uuid::new_v4());
        subscription.start_date = date("2024-01-01");
        subscription.renewal_date = date(renewal_date);
        subscription
    }

    async fn create_test_service() -> (ReminderService, DatabaseService) {
        let db = DatabaseService::in_memory().await.unwrap();
        let mailer = Mailer::new(MailConfig {
            api_url: None,
            api_key: None,
            from: "reminders@example.com".to_string(),
        });
        (ReminderService::new(db.clone(), mailer, vec![7, 5, 2, 1]), db)
    }

    #[test]
    fn test_plan_due_today() {
        let subscription = subscription_renewing("2024-03-10");
        let plan = plan_reminders(&subscription, date("2024-03-05"), &[7, 5, 2, 1]);
        assert_eq!(plan.due_today, Some(5));
        assert_eq!(plan.next_reminder_date, Some(date("2024-03-08")));
    }

    #[test]
    fn test_plan_between_thresholds() {
        let subscription = subscription_renewing("2024-03-10");
        let plan = plan_reminders(&subscription, date("2024-02-20"), &[7, 5, 2, 1]);
        assert_eq!(plan.due_today, None);
        assert_eq!(plan.next_reminder_date, Some(date("2024-03-03")));

        let plan = plan_reminders(&subscription, date("2024-03-09"), &[7, 5, 2, 1]);
        assert_eq!(plan.due_today, Some(1));
        assert_eq!(plan.next_reminder_date, None);
    }

    #[test]
    fn test_plan_skips_inactive_and_past() {
        let mut cancelled = subscription_renewing("2024-03-10");
        cancelled.status = SubscriptionStatus::Cancelled;
        let plan = plan_reminders(&cancelled, date("2024-03-05"), &[7, 5, 2, 1]);
        assert_eq!(plan, ReminderPlan { due_today: None, next_reminder_date: None });

        let past = subscription_renewing("2024-03-01");
        let plan = plan_reminders(&past, date("2024-03-05"), &[7, 5, 2, 1]);
        assert_eq!(plan.due_today, None);
    }

    #[tokio::test]
    async fn test_process_sends_due_reminder() {
        let (service, db) = create_test_service().await;
        let user = User::new("Ada".to_string(), "ada@example.com".to_string(), "hash".to_string());
        db.create_user(&user).await.unwrap();

        let mut subscription = subscription_renewing("2024-03-10");
        subscription.owner = user.id;
        db.create_subscription(&subscription).await.unwrap();

        let outcome = service.process(&subscription.id, date("2024-03-08")).await.unwrap();
        assert_eq!(outcome.reminder_sent, Some(2));
        assert_eq!(outcome.next_reminder_date, Some(date("2024-03-09")));
        assert_eq!(outcome.status, SubscriptionStatus::Active);

        let missing = service.process(&Uuid::new_v4(), date("2024-03-08")).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_expires_and_reminds() {
        let (service, db) = create_test_service().await;
        let user = User::new("Ada".to_string(), "ada@example.com".to_string(), "hash".to_string());
        db.create_user(&user).await.unwrap();

        let mut due = subscription_renewing("2024-03-12");
        due.owner = user.id;
        let mut overdue = subscription_renewing("2024-03-01");
        overdue.owner = user.id;
        let mut later = subscription_renewing("2024-04-30");
        later.owner = user.id;
        for subscription in [&due, &overdue, &later] {
            db.create_subscription(subscription).await.unwrap();
        }

        let report = service.sweep(date("2024-03-05")).await.unwrap();
        assert_eq!(report, SweepReport { checked: 3, expired: 1, reminders_sent: 1, failures: 0 });

        let stored = db.get_subscription(&overdue.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn test_reminder_sent_once_per_day() {
        let (service, db) = create_test_service().await;
        let user = User::new("Ada".to_string(), "ada@example.com".to_string(), "hash".to_string());
        db.create_user(&user).await.unwrap();

        let mut subscription = subscription_renewing("2024-03-12");
        subscription.owner = user.id;
        db.create_subscription(&subscription).await.unwrap();

        let today = date("2024-03-05");
        let first = service.sweep(today).await.unwrap();
        assert_eq!(first.reminders_sent, 1);

        // A restarted sweep and the webhook on the same day send nothing new.
        let second = service.sweep(today).await.unwrap();
        assert_eq!(second.reminders_sent, 0);
        let outcome = service.process(&subscription.id, today).await.unwrap();
        assert_eq!(outcome.reminder_sent, None);
        assert_eq!(outcome.next_reminder_date, Some(date("2024-03-07")));

        let stored = db.get_subscription(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.last_reminder_sent, Some(today));

        let outcome = service.process(&subscription.id, date("2024-03-07")).await.unwrap();
        assert_eq!(outcome.reminder_sent, Some(5));
    }
}
