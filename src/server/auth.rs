//! Request authorization against the current secrets.

use crate::secrets::{Secrets, SecretsProvider};
use crate::server::error::ApiError;
use axum::http::HeaderMap;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::{Authorization, HeaderMapExt};

/// Header carrying the photography API token.
pub const TOKEN_HEADER: &str = "token";

async fn load(secrets: &dyn SecretsProvider) -> Result<Secrets, ApiError> {
    secrets.load().await.map_err(|e| {
        tracing::error!(error = ?e, "Could not load secrets");
        ApiError::Internal
    })
}

/// The `token` header must match the photography API token.
pub async fn require_token(secrets: &dyn SecretsProvider, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(token) = headers.get(TOKEN_HEADER).and_then(|value| value.to_str().ok()) else {
        tracing::warn!("Request without an API token");
        return Err(ApiError::Unauthorized);
    };
    if token != load(secrets).await?.photography_tools.api_token {
        tracing::warn!("Request with a wrong API token");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// HTTP Basic auth must match the logging credentials.
pub async fn require_basic(secrets: &dyn SecretsProvider, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(Authorization(basic)) = headers.typed_get::<Authorization<Basic>>() else {
        tracing::warn!("Request without Basic credentials");
        return Err(ApiError::Unauthorized);
    };
    let expected = load(secrets).await?.express;
    if basic.username() != expected.username || basic.password() != expected.password {
        tracing::warn!(username = basic.username(), "Request with wrong Basic credentials");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}
