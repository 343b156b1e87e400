pub mod auth;
pub mod database;
pub mod mailer;
pub mod reminder;
pub mod workflow;
