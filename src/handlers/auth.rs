use actix_web::{post, HttpResponse};
use actix_web::web::{Data, Json};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        common::ApiResponse,
        user::{AuthResponse, SignInRequest, SignUpRequest, User},
    },
    services::{auth::AuthService, database::{DatabaseService, DuplicateEmail}},
};

#[post("/sign-up")]
pub async fn sign_up(
    db: Data<DatabaseService>,
    auth: Data<AuthService>,
    payload: Json<SignUpRequest>,
) -> Result<HttpResponse, AppError> {
    let request = payload.into_inner();
    request.validate()?;

    if db.get_user_by_email(&request.email).await?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }

    let password_hash = auth.hash_password(&request.password)?;
    let user = db
        .create_user(&User::new(request.name, request.email, password_hash))
        .await
        .map_err(|e| {
            if e.is::<DuplicateEmail>() {
                AppError::Conflict("User already exists".to_string())
            } else {
                AppError::Internal(e)
            }
        })?;
    let token = auth.issue_token(&user.id)?;

    log::info!("Registered user {}", user.id);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        AuthResponse { token, user: user.to_response() },
        "User created successfully".to_string(),
    )))
}

#[post("/sign-in")]
pub async fn sign_in(
    db: Data<DatabaseService>,
    auth: Data<AuthService>,
    payload: Json<SignInRequest>,
) -> Result<HttpResponse, AppError> {
    let request = payload.into_inner();
    request.validate()?;

    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = db.get_user_by_email(&request.email).await?.ok_or_else(invalid)?;
    if !auth.verify_password(&request.password, &user.password_hash) {
        return Err(invalid());
    }

    let token = auth.issue_token(&user.id)?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        AuthResponse { token, user: user.to_response() },
        "User signed in successfully".to_string(),
    )))
}
