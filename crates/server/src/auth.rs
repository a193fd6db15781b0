use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use bangumi_core::error::ApiError;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::state::{AppState, AuthConfig};

/// Check a presented key against the configured ones without short-circuiting
/// on the first differing byte.
pub fn key_is_valid(presented: &str, config: &AuthConfig) -> bool {
    config
        .api_keys
        .iter()
        .fold(false, |found, key| {
            found | bool::from(key.as_bytes().ct_eq(presented.as_bytes()))
        })
}

/// API key extractor: pulls a Bearer key from the Authorization header when
/// keys are required, and passes every request through otherwise.
#[derive(Debug, Clone)]
pub struct ApiKey;

impl FromRequestParts<AppState> for ApiKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.auth.require_api_key {
            return Ok(ApiKey);
        }

        let key = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("API key required".into()))?;

        if !key_is_valid(key, &state.auth) {
            return Err(ApiError::Unauthorized("invalid API key".into()).into());
        }

        Ok(ApiKey)
    }
}
