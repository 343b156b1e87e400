use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    middleware::Next,
    web, Error,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::ShieldConfig;
use crate::error::AppError;

const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-client fixed-window rate limiting plus user-agent bot rejection.
#[derive(Clone)]
pub struct Shield {
    config: ShieldConfig,
    windows: Arc<Mutex<HashMap<String, Window>>>,
    bot_pattern: Regex,
}

impl Shield {
    pub fn new(config: ShieldConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
            bot_pattern: Regex::new(
                r"(?i)(curl/|wget/|python-requests|python-urllib|go-http-client|scrapy|headless|crawler|spider|bot\b)",
            )?,
        })
    }

    pub fn is_bot(&self, user_agent: Option<&str>) -> bool {
        user_agent.map_or(false, |ua| self.bot_pattern.is_match(ua))
    }

    pub fn check(&self, client: &str, user_agent: Option<&str>, now: Instant) -> Result<(), AppError> {
        if !self.config.enabled {
            return Ok(());
        }

        if !self.config.allow_bots && self.is_bot(user_agent) {
            log::warn!("Blocked bot request from {} ({})", client, user_agent.unwrap_or_default());
            return Err(AppError::BotDetected);
        }

        let window_len = Duration::from_secs(self.config.window_secs);
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Shield state poisoned")))?;

        if windows.len() >= MAX_TRACKED_CLIENTS && !windows.contains_key(client) {
            windows.retain(|_, w| now.duration_since(w.started) < window_len);
            if windows.len() >= MAX_TRACKED_CLIENTS {
                let oldest = windows
                    .iter()
                    .min_by_key(|(_, w)| w.started)
                    .map(|(key, _)| key.clone());
                if let Some(key) = oldest {
                    windows.remove(&key);
                }
            }
        }

        let window = windows.entry(client.to_string()).or_insert(Window { started: now, count: 0 });
        if now.duration_since(window.started) >= window_len {
            *window = Window { started: now, count: 0 };
        }

        window.count += 1;
        if window.count > self.config.max_requests {
            log::warn!("Rate limit exceeded for {}", client);
            return Err(AppError::RateLimited);
        }

        Ok(())
    }

    /// Rate-limit key for a request. Forwarding headers are client-controlled,
    /// so they are only honoured behind a trusted proxy.
    pub fn client_key(&self, req: &ServiceRequest) -> String {
        if self.config.trust_proxy {
            if let Some(addr) = req.connection_info().realip_remote_addr() {
                return addr.to_string();
            }
        }

        req.peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or_default()
    }
}

pub async fn shield_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    if let Some(shield) = req.app_data::<web::Data<Shield>>() {
        let client = shield.client_key(&req);
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());

        shield.check(&client, user_agent, Instant::now())?;
    }

    next.call(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{dev::Service, http::StatusCode, middleware::from_fn, test as actix_test, App, HttpResponse};
    use std::net::SocketAddr;

    fn create_test_shield(max_requests: u32, allow_bots: bool) -> Shield {
        Shield::new(ShieldConfig {
            enabled: true,
            max_requests,
            window_secs: 60,
            allow_bots,
            trust_proxy: false,
        })
        .unwrap()
    }

    async fn statuses_for<F>(shield: Shield, count: usize, build: F) -> Vec<StatusCode>
    where
        F: Fn(usize) -> actix_test::TestRequest,
    {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(shield))
                .wrap(from_fn(shield_middleware))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let mut statuses = Vec::new();
        for i in 0..count {
            let status = match app.call(build(i).to_request()).await {
                Ok(resp) => resp.status(),
                Err(err) => err.as_response_error().status_code(),
            };
            statuses.push(status);
        }
        statuses
    }

    fn peer() -> SocketAddr {
        "203.0.113.7:40000".parse().unwrap()
    }

    #[test]
    fn test_rate_limit_window() {
        let shield = create_test_shield(2, false);
        let start = Instant::now();

        assert!(shield.check("10.0.0.1", None, start).is_ok());
        assert!(shield.check("10.0.0.1", None, start).is_ok());
        assert!(matches!(shield.check("10.0.0.1", None, start), Err(AppError::RateLimited)));

        // Other clients have their own window.
        assert!(shield.check("10.0.0.2", None, start).is_ok());

        let next_window = start + Duration::from_secs(60);
        assert!(shield.check("10.0.0.1", None, next_window).is_ok());
    }

    #[test]
    fn test_bot_detection() {
        let shield = create_test_shield(100, false);
        let now = Instant::now();

        assert!(matches!(
            shield.check("10.0.0.1", Some("curl/8.4.0"), now),
            Err(AppError::BotDetected)
        ));
        assert!(matches!(
            shield.check("10.0.0.1", Some("Mozilla/5.0 (compatible; Googlebot/2.1)"), now),
            Err(AppError::BotDetected)
        ));
        assert!(shield
            .check("10.0.0.1", Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"), now)
            .is_ok());
        assert!(shield.check("10.0.0.1", None, now).is_ok());
    }

    #[test]
    fn test_bots_allowed_when_configured() {
        let shield = create_test_shield(100, true);
        assert!(shield.check("10.0.0.1", Some("curl/8.4.0"), Instant::now()).is_ok());
    }

    #[test]
    fn test_disabled_shield_passes_everything() {
        let shield = Shield::new(ShieldConfig {
            enabled: false,
            max_requests: 0,
            ..ShieldConfig::default()
        })
        .unwrap();
        assert!(shield.check("10.0.0.1", Some("curl/8.4.0"), Instant::now()).is_ok());
    }

    #[actix_web::test]
    async fn test_forwarded_header_does_not_reset_limit() {
        let statuses = statuses_for(create_test_shield(2, false), 4, |i| {
            actix_test::TestRequest::get()
                .uri("/")
                .peer_addr(peer())
                .insert_header(("x-forwarded-for", format!("9.9.9.{}", i)))
        })
        .await;

        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    #[actix_web::test]
    async fn test_forwarded_header_used_behind_trusted_proxy() {
        let shield = Shield::new(ShieldConfig {
            max_requests: 1,
            allow_bots: true,
            trust_proxy: true,
            ..ShieldConfig::default()
        })
        .unwrap();

        let statuses = statuses_for(shield, 3, |i| {
            let client = if i < 2 { "198.51.100.1" } else { "198.51.100.2" };
            actix_test::TestRequest::get()
                .uri("/")
                .peer_addr(peer())
                .insert_header(("x-forwarded-for", client))
        })
        .await;

        assert_eq!(statuses, vec![StatusCode::OK, StatusCode::TOO_MANY_REQUESTS, StatusCode::OK]);
    }

    #[test]
    fn test_tracked_clients_capped() {
        let shield = create_test_shield(100, true);
        let now = Instant::now();

        for i in 0..MAX_TRACKED_CLIENTS + 50 {
            assert!(shield.check(&format!("client-{}", i), None, now).is_ok());
        }
        assert_eq!(shield.tracked_clients(), MAX_TRACKED_CLIENTS);
    }
}
