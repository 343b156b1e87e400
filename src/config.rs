use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub server_url: String,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub workflow: WorkflowConfig,
    pub mail: MailConfig,
    pub reminders: ReminderConfig,
    pub shield: ShieldConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub signing_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    pub days_before: Vec<i64>, // Days before renewal to send reminders
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
    pub allow_bots: bool,
    pub trust_proxy: bool, // Key clients on Forwarded/X-Forwarded-For instead of the peer address
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid {} value '{}', using default", key, value);
            default
        }),
        Err(_) => default,
    }
}

/// Unset, empty and placeholder values are all treated as missing.
fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.contains("placeholder"))
}

pub fn parse_days(value: &str) -> Vec<i64> {
    let mut days: Vec<i64> = value
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .filter(|d| *d > 0)
        .collect();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();
    days
}

/// Falls back to the default thresholds when nothing usable was configured.
fn reminder_days(value: Option<&str>) -> Vec<i64> {
    match value.map(parse_days) {
        Some(days) if !days.is_empty() => days,
        Some(_) => {
            log::warn!("Invalid REMINDER_DAYS value '{}', using default", value.unwrap_or_default());
            ReminderConfig::default().days_before
        }
        None => ReminderConfig::default().days_before,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            port: parse_or("PORT", 8080),
            server_url: env::var("SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),

            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "mem://".to_string()),
                username: optional("DATABASE_USER"),
                password: optional("DATABASE_PASS"),
            },

            auth: AuthConfig {
                secret: env::var("AUTH_SECRET")?,
                token_ttl_hours: parse_or("AUTH_TOKEN_TTL_HOURS", 24),
            },

            workflow: WorkflowConfig {
                base_url: env::var("WORKFLOW_BASE_URL")
                    .unwrap_or_else(|_| "https://qstash.upstash.io".to_string()),
                token: optional("WORKFLOW_TOKEN"),
                signing_key: optional("WORKFLOW_SIGNING_KEY"),
            },

            mail: MailConfig {
                api_url: optional("MAIL_API_URL"),
                api_key: optional("MAIL_API_KEY"),
                from: env::var("MAIL_FROM").unwrap_or_else(|_| "reminders@subtrack.local".to_string()),
            },

            reminders: ReminderConfig {
                days_before: reminder_days(env::var("REMINDER_DAYS").ok().as_deref()),
                sweep_interval_secs: parse_or("REMINDER_SWEEP_SECS", 86_400),
            },

            shield: ShieldConfig {
                enabled: parse_or("SHIELD_ENABLED", true),
                max_requests: parse_or("SHIELD_MAX_REQUESTS", 100),
                window_secs: parse_or("SHIELD_WINDOW_SECS", 60),
                allow_bots: parse_or("SHIELD_ALLOW_BOTS", false),
                trust_proxy: parse_or("SHIELD_TRUST_PROXY", false),
            },
        })
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            days_before: vec![7, 5, 2, 1],
            sweep_interval_secs: 86_400,
        }
    }
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_secs: 60,
            allow_bots: false,
            trust_proxy: false,
        }
    }
}
