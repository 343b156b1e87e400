use actix_web::{get, HttpResponse};
use actix_web::web::{Data, Path};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthenticatedUser,
    models::common::ApiResponse,
    services::database::DatabaseService,
};

#[get("/{user_id}")]
pub async fn get_user(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    path: Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    if caller.user_id != user_id {
        return Err(AppError::Forbidden("You are not the owner of this account".to_string()));
    }

    match db.get_user(&user_id).await? {
        Some(user) => Ok(HttpResponse::Ok().json(ApiResponse::success(user.to_response()))),
        None => Err(AppError::NotFound("User not found".to_string())),
    }
}
