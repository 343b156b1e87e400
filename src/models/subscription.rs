use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use validator::{Validate, ValidationError};

use crate::error::AppError;
use crate::models::common::{Category, Currency, Frequency};
use crate::utils::renewal::{self, Urgency};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled, // Owner action, terminal
    Expired,   // Renewal date passed, terminal
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Cancelled => write!(f, "cancelled"),
            SubscriptionStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub price: Decimal,
    pub currency: Currency,
    pub frequency: Frequency,
    pub category: Category,
    pub payment_method: String,
    pub start_date: NaiveDate,
    pub renewal_date: NaiveDate,
    pub status: SubscriptionStatus,
    /// Day the last renewal reminder went out; at most one per day.
    #[serde(default)]
    pub last_reminder_sent: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,

    #[validate(custom = "validate_price")]
    pub price: Decimal,

    #[serde(default)]
    pub currency: Currency,

    pub frequency: Frequency,

    pub category: Category,

    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,

    pub start_date: NaiveDate,

    pub renewal_date: Option<NaiveDate>,
}

/// Editable fields only; `owner` and `status` are not part of an update.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSubscriptionRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: Option<String>,

    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,

    pub currency: Option<Currency>,

    pub frequency: Option<Frequency>,

    pub category: Option<Category>,

    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: Option<String>,

    pub start_date: Option<NaiveDate>,

    pub renewal_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionQuery {
    pub status: Option<SubscriptionStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    /// Reference date override, `YYYY-MM-DD`.
    pub today: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub days_until_renewal: i64,
    pub urgency: Urgency,
    pub monthly_equivalent: Decimal,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub reference_date: NaiveDate,
    pub total_monthly_spend: Decimal,
    pub spend_by_currency: BTreeMap<Currency, Decimal>,
    pub active_count: usize,
    pub cancelled_count: usize,
    pub expired_count: usize,
    pub subscriptions: Vec<SubscriptionView>,
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        let mut error = ValidationError::new("negative_price");
        error.message = Some("Price must not be negative".into());
        return Err(error);
    }
    Ok(())
}

fn check_dates(start_date: NaiveDate, renewal_date: NaiveDate, today: NaiveDate) -> Result<(), AppError> {
    if start_date > today {
        return Err(AppError::Validation("Start date must not be in the future".to_string()));
    }
    if renewal_date < start_date {
        return Err(AppError::Validation("Renewal date must not be before the start date".to_string()));
    }
    Ok(())
}

impl Subscription {
    pub fn new(owner: Uuid, request: CreateSubscriptionRequest, today: NaiveDate) -> Result<Self, AppError> {
        request.validate()?;

        let renewal_date = match request.renewal_date {
            Some(date) => date,
            None => renewal::compute_next_renewal(request.start_date, request.frequency)?,
        };
        check_dates(request.start_date, renewal_date, today)?;

        let now = Utc::now();
        let mut subscription = Self {
            id: Uuid::new_v4(),
            owner,
            name: request.name.trim().to_string(),
            price: request.price,
            currency: request.currency,
            frequency: request.frequency,
            category: request.category,
            payment_method: request.payment_method.trim().to_string(),
            start_date: request.start_date,
            renewal_date,
            status: SubscriptionStatus::Active,
            last_reminder_sent: None,
            created_at: now,
            updated_at: now,
        };
        subscription.expire_if_due(today);
        Ok(subscription)
    }

    pub fn apply_update(&mut self, request: UpdateSubscriptionRequest, today: NaiveDate) -> Result<(), AppError> {
        request.validate()?;

        let schedule_changed = request.start_date.is_some() || request.frequency.is_some();
        let start_date = request.start_date.unwrap_or(self.start_date);
        let frequency = request.frequency.unwrap_or(self.frequency);
        let renewal_date = match request.renewal_date {
            Some(date) => date,
            None if schedule_changed => renewal::compute_next_renewal(start_date, frequency)?,
            None => self.renewal_date,
        };
        check_dates(start_date, renewal_date, today)?;

        if let Some(name) = request.name {
            self.name = name.trim().to_string();
        }
        if let Some(price) = request.price {
            self.price = price;
        }
        if let Some(currency) = request.currency {
            self.currency = currency;
        }
        if let Some(category) = request.category {
            self.category = category;
        }
        if let Some(payment_method) = request.payment_method {
            self.payment_method = payment_method.trim().to_string();
        }
        self.start_date = start_date;
        self.frequency = frequency;
        self.renewal_date = renewal_date;
        self.updated_at = Utc::now();

        self.expire_if_due(today);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), AppError> {
        if self.status != SubscriptionStatus::Active {
            return Err(AppError::InvalidTransition(format!(
                "Cannot cancel a subscription that is {}",
                self.status
            )));
        }

        self.status = SubscriptionStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves an active subscription whose renewal date has passed to expired.
    /// Returns whether the status changed.
    pub fn expire_if_due(&mut self, today: NaiveDate) -> bool {
        if self.status == SubscriptionStatus::Active && self.renewal_date < today {
            self.status = SubscriptionStatus::Expired;
            self.updated_at = Utc::now();
            return true;
        }
        false
    }

    pub fn reminded_on(&self, today: NaiveDate) -> bool {
        self.last_reminder_sent == Some(today)
    }

    pub fn mark_reminded(&mut self, today: NaiveDate) {
        self.last_reminder_sent = Some(today);
        self.updated_at = Utc::now();
    }

    pub fn is_owned_by(&self, user_id: &Uuid) -> bool {
        self.owner == *user_id
    }

    pub fn days_until_renewal(&self, today: NaiveDate) -> i64 {
        renewal::days_until(self.renewal_date, today)
    }

    pub fn to_view(&self, today: NaiveDate) -> SubscriptionView {
        let days = self.days_until_renewal(today);
        SubscriptionView {
            subscription: self.clone(),
            days_until_renewal: days,
            urgency: renewal::classify_urgency(days),
            monthly_equivalent: renewal::monthly_equivalent(self.price, self.frequency),
        }
    }

    #[cfg(test)]
    pub fn test_fixture(owner: Uuid) -> Self {
        let now = Utc::now();
        let today = now.date_naive();
        Self {
            id: Uuid::new_v4(),
            owner,
            name: "Netflix".to_string(),
            price: Decimal::new(1599, 2),
            currency: Currency::Usd,
            frequency: Frequency::Monthly,
            category: Category::Entertainment,
            payment_method: "Visa".to_string(),
            start_date: today,
            renewal_date: renewal::compute_next_renewal(today, Frequency::Monthly).unwrap(),
            status: SubscriptionStatus::Active,
            last_reminder_sent: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl DashboardSummary {
    pub fn build(subscriptions: &[Subscription], today: NaiveDate) -> Self {
        let mut spend_by_currency = BTreeMap::new();
        for sub in subscriptions.iter().filter(|s| s.status == SubscriptionStatus::Active) {
            *spend_by_currency.entry(sub.currency).or_insert(Decimal::ZERO) +=
                renewal::monthly_equivalent(sub.price, sub.frequency);
        }

        let count = |status: SubscriptionStatus| subscriptions.iter().filter(|s| s.status == status).count();

        Self {
            reference_date: today,
            total_monthly_spend: renewal::aggregate_monthly_spend(subscriptions),
            spend_by_currency,
            active_count: count(SubscriptionStatus::Active),
            cancelled_count: count(SubscriptionStatus::Cancelled),
            expired_count: count(SubscriptionStatus::Expired),
            subscriptions: subscriptions.iter().map(|s| s.to_view(today)).collect(),
        }
    }
}
