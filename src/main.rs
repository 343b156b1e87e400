mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod tasks;
mod utils;

use actix_web::{App, HttpServer, middleware::Logger};
use actix_cors::Cors;
use dotenv::dotenv;

use handlers::AppState;
use middleware::shield::Shield;
use services::{
    auth::AuthService,
    database::DatabaseService,
    mailer::Mailer,
    reminder::ReminderService,
    workflow::WorkflowClient,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = config::Config::from_env().expect("AUTH_SECRET must be set in the environment or .env file");

    let database_service = DatabaseService::new(&config.database)
        .await
        .expect("Failed to initialize database");

    let workflow_client = WorkflowClient::new(config.workflow.clone(), config.server_url.clone());
    if !workflow_client.is_configured() {
        log::warn!("WORKFLOW_TOKEN not set, reminder workflows will not be triggered");
    }

    let reminder_service = ReminderService::new(
        database_service.clone(),
        Mailer::new(config.mail.clone()),
        config.reminders.days_before.clone(),
    );

    let state = AppState {
        db: database_service,
        auth: AuthService::new(config.auth.clone()),
        workflow: workflow_client,
        reminders: reminder_service.clone(),
        shield: Shield::new(config.shield.clone()).expect("Invalid bot pattern"),
    };

    actix_web::rt::spawn(tasks::reminder_task::start_reminder_task(
        reminder_service,
        config.reminders.sweep_interval_secs,
    ));

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting subscription tracker on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials()
            )
            .configure(|cfg| state.register(cfg))
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
