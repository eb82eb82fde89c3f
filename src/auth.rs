use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AppResult},
    models::User,
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the HS256 bearer tokens issued by `/login/`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the account id.
    pub sub: Uuid,
    /// Expiration time (seconds since the epoch).
    pub exp: usize,
    /// Issued at (seconds since the epoch).
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Re-read from the store on every
/// request, so promotions and editor membership take effect immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    /// Membership in the Editors group.
    pub is_editor: bool,
    /// The blogger profile linked to this account, if promoted.
    pub blogger_id: Option<i64>,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        AuthUser {
            id: user.id,
            username: user.username,
            is_editor: user.is_editor,
            blogger_id: user.blogger_id,
        }
    }
}

/// AuthUser Extractor
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header naming an existing account.
/// 2. Bearer token: `Authorization: Bearer <jwt>`, validated with the configured secret.
/// 3. Account lookup: the token subject must still exist.
///
/// Rejection: `AppError::Unauthenticated` carrying the requested path and query, rendered as a 401
/// with a login URL.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let next = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let unauthenticated = || AppError::Unauthenticated {
            next: Some(next.clone()),
        };

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(user.into());
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(unauthenticated)?;

        let claims = decode_token(&config, token).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            unauthenticated()
        })?;

        let user = repo
            .get_user(claims.sub)
            .await?
            .ok_or_else(unauthenticated)?;

        Ok(user.into())
    }
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Signs a token for `user_id`. Returns the token and its lifetime in seconds.
pub fn issue_token(config: &AppConfig, user_id: Uuid) -> AppResult<(String, u64)> {
    let now = now_secs();
    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + config.jwt_ttl_secs) as usize,
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    let token = encode(&Header::default(), &claims, &key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign token: {e}")))?;
    Ok((token, config.jwt_ttl_secs))
}

/// Validates signature and expiry.
pub fn decode_token(
    config: &AppConfig,
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<Claims>(token, &key, &validation).map(|data| data.claims)
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {e}")))
}

/// Verify a password against a stored PHC hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
