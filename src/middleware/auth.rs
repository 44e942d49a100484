use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header},
};

use crate::{clients::identity::IdentityError, error::AppError, state::AppState};

/// Caller identity established by the identity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
}

/// Extract the bearer credential, or fail with Unauthorized.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_str = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    Ok(token)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;

        match state.identity.verify(token).await {
            Ok(identity) => Ok(AuthUser {
                user_id: identity.user_id,
                email: identity.email,
            }),
            Err(IdentityError::Rejected(reason)) => {
                tracing::debug!(%reason, "bearer credential rejected");
                Err(AppError::Unauthorized("Invalid token".into()))
            }
            Err(IdentityError::Unavailable(reason)) => {
                tracing::warn!(%reason, "identity check unavailable");
                Err(AppError::Unauthorized("Invalid token".into()))
            }
        }
    }
}
