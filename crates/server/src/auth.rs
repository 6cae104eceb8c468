use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, Validation};
use quillbook_storage::{ensure_user_profile, refresh_usage_period, UserProfile};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// Claims of the HS256 tokens issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

/// The verified caller, with the profile provisioned and its monthly usage
/// period brought up to date.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserProfile);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthenticated)?;

        let claims = decode::<Claims>(token, &state.jwt_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                AppError::Unauthenticated
            })?
            .claims;

        let today = Utc::now().date_naive();
        ensure_user_profile(&state.db, &claims.sub, today).await?;
        let profile = refresh_usage_period(&state.db, &claims.sub, today).await?;
        Ok(AuthUser(profile))
    }
}
