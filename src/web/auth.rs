//! Single-password admin gate for the write routes.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use super::AppState;

/// Hash a password using Argon2id, producing a PHC string for `ADMIN_PASSWORD_HASH`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?
        .to_string();

    Ok(hash)
}

/// Verify a password against a PHC hash string.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Failed to parse admin password hash")?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

/// Extractor that admits requests carrying `Authorization: Bearer <admin password>`.
///
/// Admin routes answer 403 when no admin password hash is configured.
pub struct RequireAdmin;

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(hash) = state.config.admin_password_hash.as_deref() else {
            return Err(reject(StatusCode::FORBIDDEN, "Admin access is not configured"));
        };

        let Some(password) = bearer_token(parts) else {
            return Err(reject(StatusCode::UNAUTHORIZED, "Missing admin credentials"));
        };

        match verify_password(password, hash) {
            Ok(true) => Ok(Self),
            Ok(false) => {
                warn!(path = %parts.uri.path(), "Rejected admin request with wrong password");
                Err(reject(StatusCode::UNAUTHORIZED, "Invalid admin credentials"))
            }
            Err(e) => {
                error!("Admin password check failed: {e:#}");
                Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "Admin check failed"))
            }
        }
    }
}
