pub mod auth;
pub mod health;
pub mod subscriptions;
pub mod users;
pub mod workflows;

use actix_web::{middleware::from_fn, web};
use chrono::{NaiveDate, Utc};

use crate::error::AppError;
use crate::middleware::shield::{shield_middleware, Shield};
use crate::services::{
    auth::AuthService,
    database::DatabaseService,
    reminder::ReminderService,
    workflow::WorkflowClient,
};

/// Shared service handles registered as `web::Data` on every worker.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseService,
    pub auth: AuthService,
    pub workflow: WorkflowClient,
    pub reminders: ReminderService,
    pub shield: Shield,
}

impl AppState {
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.db.clone()))
            .app_data(web::Data::new(self.auth.clone()))
            .app_data(web::Data::new(self.workflow.clone()))
            .app_data(web::Data::new(self.reminders.clone()))
            .app_data(web::Data::new(self.shield.clone()))
            .app_data(web::JsonConfig::default().error_handler(|err, _| {
                AppError::Validation(format!("Invalid request body: {}", err)).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _| {
                AppError::Validation(format!("Invalid query: {}", err)).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _| {
                AppError::NotFound(format!("Invalid path: {}", err)).into()
            }));
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // Auth
            .service(
                web::scope("/auth")
                    .wrap(from_fn(shield_middleware))
                    .service(auth::sign_up)
                    .service(auth::sign_in),
            )
            // User Management
            .service(
                web::scope("/users")
                    .wrap(from_fn(shield_middleware))
                    .service(users::get_user),
            )
            // Subscription Management; fixed paths before /{id}
            .service(
                web::scope("/subscriptions")
                    .wrap(from_fn(shield_middleware))
                    .service(subscriptions::upcoming_renewals)
                    .service(subscriptions::dashboard)
                    .service(subscriptions::get_user_subscriptions)
                    .service(subscriptions::list_subscriptions)
                    .service(subscriptions::create_subscription)
                    .service(subscriptions::get_subscription)
                    .service(subscriptions::update_subscription)
                    .service(subscriptions::delete_subscription)
                    .service(subscriptions::cancel_subscription),
            )
            // Signed callbacks from the workflow queue
            .service(
                web::scope("/workflows")
                    .service(workflows::subscription_reminder),
            )
            // Health check
            .route("/health", web::get().to(health::health_check)),
    );
}
