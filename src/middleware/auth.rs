use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::auth::AuthService;

/// The caller identified by a valid bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

impl AuthenticatedUser {
    /// Fails with `Forbidden` unless the caller is `owner`.
    pub fn ensure_owner(&self, owner: &Uuid, action: &str) -> Result<(), AppError> {
        if self.user_id != *owner {
            return Err(AppError::Forbidden(format!("Not authorized to {} this subscription", action)));
        }
        Ok(())
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    let auth = req
        .app_data::<web::Data<AuthService>>()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("AuthService not registered")))?;

    let token = bearer_token(req).ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    auth.verify_token(token)
        .map(|claims| AuthenticatedUser { user_id: claims.user_id })
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use actix_web::test::TestRequest;

    fn auth_service() -> AuthService {
        AuthService::new(AuthConfig {
            secret: "test_auth_secret".to_string(),
            token_ttl_hours: 1,
        })
    }

    #[test]
    fn test_valid_bearer_token() {
        let service = auth_service();
        let user_id = Uuid::new_v4();
        let token = service.issue_token(&user_id).unwrap();

        let req = TestRequest::default()
            .app_data(web::Data::new(service))
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_http_request();

        assert_eq!(authenticate(&req).unwrap().user_id, user_id);
    }

    #[test]
    fn test_missing_or_bad_token() {
        let req = TestRequest::default()
            .app_data(web::Data::new(auth_service()))
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(AppError::Unauthorized(_))));

        let req = TestRequest::default()
            .app_data(web::Data::new(auth_service()))
            .insert_header((header::AUTHORIZATION, "Bearer nonsense"))
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_ensure_owner() {
        let caller = AuthenticatedUser { user_id: Uuid::new_v4() };
        assert!(caller.ensure_owner(&caller.user_id, "update").is_ok());
        assert!(matches!(
            caller.ensure_owner(&Uuid::new_v4(), "update"),
            Err(AppError::Forbidden(_))
        ));
    }
}
