pub mod common;
pub mod subscription;
pub mod user;
