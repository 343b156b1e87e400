use actix_web::HttpResponse;
use actix_web::web::Data;
use serde_json::json;

use crate::{error::AppError, models::common::ApiResponse, services::database::DatabaseService};

pub async fn health_check(db: Data<DatabaseService>) -> Result<HttpResponse, AppError> {
    db.health_check().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "status": "ok" }))))
}
