use reqwest::Client;
use serde::Serialize;
use anyhow::{Result, anyhow};

use crate::config::MailConfig;
use crate::models::{subscription::Subscription, user::User};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Delivers emails through an HTTP mail API. Without an API URL the message
/// is only logged.
#[derive(Clone)]
pub struct Mailer {
    client: Client,
    config: MailConfig,
}

fn renewal_phrase(days_before: i64) -> String {
    match days_before {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {} days", n),
    }
}

pub fn reminder_subject(subscription: &Subscription, days_before: i64) -> String {
    format!("Reminder: Your {} subscription renews {}", subscription.name, renewal_phrase(days_before))
}

pub fn reminder_body(user: &User, subscription: &Subscription, days_before: i64) -> String {
    format!(
        "Hello {name},\n\n\
         Your {sub} subscription is set to renew on {date} ({when}).\n\n\
         Plan price: {currency} {price} ({frequency})\n\
         Payment method: {method}\n\n\
         If you no longer need it, cancel it before the renewal date.\n",
        name = user.name,
        sub = subscription.name,
        date = subscription.renewal_date.format("%b %d, %Y"),
        when = renewal_phrase(days_before),
        currency = subscription.currency,
        price = subscription.price,
        frequency = subscription.frequency,
        method = subscription.payment_method,
    )
}

impl Mailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn reminder_email(&self, user: &User, subscription: &Subscription, days_before: i64) -> EmailMessage {
        EmailMessage {
            from: self.config.from.clone(),
            to: user.email.clone(),
            subject: reminder_subject(subscription, days_before),
            text: reminder_body(user, subscription, days_before),
        }
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<()> {
        let api_url = match &self.config.api_url {
            Some(url) => url,
            None => {
                log::info!("Mail API not configured, would send '{}' to {}", message.subject, message.to);
                return Ok(());
            }
        };

        let mut request = self.client.post(api_url).json(message);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Mail delivery failed: {}", error_text));
        }

        log::info!("Sent '{}' to {}", message.subject, message.to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn create_test_mailer() -> Mailer {
        Mailer::new(MailConfig {
            api_url: None,
            api_key: None,
            from: "reminders@example.com".to_string(),
        })
    }

    #[test]
    fn test_reminder_email_content() {
        let user = User::new("Ada".to_string(), "ada@example.com".to_string(), "hash".to_string());
        let mut subscription = Subscription::test_fixture(user.id);
        subscription.price = Decimal::new(1599, 2);

        let message = create_test_mailer().reminder_email(&user, &subscription, 5);
        assert_eq!(message.to, "ada@example.com");
        assert_eq!(message.from, "reminders@example.com");
        assert_eq!(message.subject, "Reminder: Your Netflix subscription renews in 5 days");
        assert!(message.text.contains("Hello Ada"));
        assert!(message.text.contains("USD 15.99 (monthly)"));
        assert!(message.text.contains("Payment method: Visa"));
    }

    #[test]
    fn test_subject_wording() {
        let subscription = Subscription::test_fixture(Uuid::new_v4());
        assert!(reminder_subject(&subscription, 1).ends_with("renews tomorrow"));
        assert!(reminder_subject(&subscription, 0).ends_with("renews today"));

        let user = User::new("Ada".to_string(), "ada@example.com".to_string(), "hash".to_string());
        let body = reminder_body(&user, &subscription, 1);
        assert!(body.contains("(tomorrow)"));
        assert!(!body.contains("1 days"));
        assert!(reminder_body(&user, &subscription, 5).contains("(in 5 days)"));
    }

    #[tokio::test]
    async fn test_unconfigured_send_is_logged_only() {
        let mailer = create_test_mailer();
        let user = User::new("Ada".to_string(), "ada@example.com".to_string(), "hash".to_string());
        let message = mailer.reminder_email(&user, &Subscription::test_fixture(user.id), 2);
        assert!(mailer.send(&message).await.is_ok());
    }
}
