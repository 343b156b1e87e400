pub mod auth;
pub mod shield;
