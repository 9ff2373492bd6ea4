//! Bearer-token authentication.
//!
//! Sessions are owned by an external identity layer; this server only maps
//! the bearer token it was issued to a user id through the configured table.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::handlers::AppState;
use super::types::ApiError;
use crate::error::EchoError;

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError(EchoError::Auth))?;

        state
            .auth_tokens
            .get(token)
            .map(|user_id| AuthUser {
                user_id: user_id.clone(),
            })
            .ok_or(ApiError(EchoError::Auth))
    }
}
