use anyhow::{Result, anyhow};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use sha2::Sha256;
use uuid::Uuid;

use crate::config::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies bearer tokens of the form
/// `<user_id>.<expires_unix>.<hex hmac-sha256>`.
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub expires_at: i64,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
        Ok(hash.to_string())
    }

    pub fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        match PasswordHash::new(password_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                log::warn!("Stored password hash is malformed: {}", e);
                false
            }
        }
    }

    fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.config.secret.as_bytes())
            .map_err(|e| anyhow!("Invalid auth secret: {}", e))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn issue_token(&self, user_id: &Uuid) -> Result<String> {
        let expires_at = (Utc::now() + Duration::hours(self.config.token_ttl_hours)).timestamp();
        self.issue_token_expiring_at(user_id, expires_at)
    }

    fn issue_token_expiring_at(&self, user_id: &Uuid, expires_at: i64) -> Result<String> {
        let payload = format!("{}.{}", user_id, expires_at);
        let signature = self.sign(&payload)?;
        Ok(format!("{}.{}", payload, signature))
    }

    /// Returns the claims of a well-signed, unexpired token.
    pub fn verify_token(&self, token: &str) -> Option<TokenClaims> {
        let (payload, signature) = token.trim().rsplit_once('.')?;
        let (user_id, expires_at) = payload.split_once('.')?;

        let expected = hex::decode(signature).ok()?;
        let mut mac = HmacSha256::new_from_slice(self.config.secret.as_bytes()).ok()?;
        mac.update(payload.as_bytes());
        if mac.verify_slice(&expected).is_err() {
            log::debug!("Rejected token with bad signature");
            return None;
        }

        let claims = TokenClaims {
            user_id: Uuid::parse_str(user_id).ok()?,
            expires_at: expires_at.parse().ok()?,
        };

        if claims.expires_at <= Utc::now().timestamp() {
            log::debug!("Rejected expired token for user {}", claims.user_id);
            return None;
        }

        Some(claims)
    }
}
