//! Renewal scheduling calculator.
//!
//! Pure calendar arithmetic over time-zone naive dates. Month and year steps
//! are computed explicitly: the day-of-month is kept and clamped to the last
//! day of a shorter target month, so Jan 31 + 1 month is Feb 28/29 and
//! Feb 29 + 1 year is Feb 28 in a non-leap year.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::common::Frequency;
use crate::models::subscription::{Subscription, SubscriptionStatus};

/// Days ahead (inclusive) at which a renewal counts as due soon.
pub const DUE_SOON_DAYS: i64 = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Urgency {
    Upcoming,
    DueSoon,
    DueToday,
    Overdue,
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if is_leap_year(year) => 29,
        _ => 28,
    }
}

/// Builds `year-month-day`, clamping `day` to the length of the month.
fn clamped_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, CalendarError> {
    let day = day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| CalendarError::InvalidDate(format!("{:04}-{:02}-{:02}", year, month, day)))
}

/// Adds exactly one unit of `frequency` to `start_date`.
pub fn compute_next_renewal(
    start_date: NaiveDate,
    frequency: Frequency,
) -> Result<NaiveDate, CalendarError> {
    let out_of_range = || CalendarError::InvalidDate(format!("{} + 1 {}", start_date, frequency));

    match frequency {
        Frequency::Daily => start_date
            .checked_add_signed(Duration::days(1))
            .ok_or_else(out_of_range),
        Frequency::Weekly => start_date
            .checked_add_signed(Duration::days(7))
            .ok_or_else(out_of_range),
        Frequency::Monthly => {
            let (year, month) = if start_date.month() == 12 {
                (start_date.year().checked_add(1).ok_or_else(out_of_range)?, 1)
            } else {
                (start_date.year(), start_date.month() + 1)
            };
            clamped_date(year, month, start_date.day()).map_err(|_| out_of_range())
        }
        Frequency::Yearly => {
            let year = start_date.year().checked_add(1).ok_or_else(out_of_range)?;
            clamped_date(year, start_date.month(), start_date.day()).map_err(|_| out_of_range())
        }
    }
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate, CalendarError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CalendarError::InvalidDate(value.to_string()))
}

/// String entry point for callers that hold raw values.
pub fn next_renewal_from_str(start_date: &str, frequency: &str) -> Result<NaiveDate, CalendarError> {
    let frequency: Frequency = frequency.parse()?;
    compute_next_renewal(parse_date(start_date)?, frequency)
}

/// Whole calendar days from `reference_date` to `renewal_date`.
pub fn days_until(renewal_date: NaiveDate, reference_date: NaiveDate) -> i64 {
    renewal_date.signed_duration_since(reference_date).num_days()
}

pub fn classify_urgency(days_until: i64) -> Urgency {
    match days_until {
        d if d < 0 => Urgency::Overdue,
        0 => Urgency::DueToday,
        d if d <= DUE_SOON_DAYS => Urgency::DueSoon,
        _ => Urgency::Upcoming,
    }
}

/// Dashboard estimate of what `price` billed at `frequency` costs per month.
/// Not calendar exact; never use it as a billing amount.
pub fn monthly_equivalent(price: Decimal, frequency: Frequency) -> Decimal {
    match frequency {
        Frequency::Daily => price * Decimal::from(30),
        Frequency::Weekly => price * Decimal::from(4),
        Frequency::Monthly => price,
        Frequency::Yearly => price / Decimal::from(12),
    }
}

/// Sums the monthly equivalent of every active subscription.
pub fn aggregate_monthly_spend<'a, I>(subscriptions: I) -> Decimal
where
    I: IntoIterator<Item = &'a Subscription>,
{
    subscriptions
        .into_iter()
        .filter(|s| s.status == SubscriptionStatus::Active)
        .map(|s| monthly_equivalent(s.price, s.frequency))
        .sum()
}
