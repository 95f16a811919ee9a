//! `/api` logging endpoints.

use crate::server::auth::require_basic;
use crate::server::error::ApiError;
use crate::server::{AppState, ClientIp};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use shutter_store::error::Error as StoreError;
use shutter_store::timestamp;

#[derive(Debug, Deserialize)]
struct AppendToLog {
    category: String,
    level: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResourceAccess {
    resource: String,
    ip_address: String,
}

#[derive(Debug, Deserialize)]
pub struct WebpageAccess {
    webpage: Option<String>,
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed log request body");
        ApiError::BadRequest
    })
}

fn stored(result: Result<(), StoreError>) -> Result<StatusCode, ApiError> {
    match result {
        Ok(()) => Ok(StatusCode::CREATED),
        Err(e) => {
            tracing::error!(error = ?e, "Could not write log row");
            Err(ApiError::Internal)
        },
    }
}

/// Current server time, doubling as a health check.
pub async fn now() -> Json<Value> {
    Json(json!({ "timestamp": timestamp() }))
}

pub async fn append_to_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    require_basic(state.secrets.as_ref(), &headers).await?;
    let entry: AppendToLog = parse(&body)?;
    stored(state.journal.append(&entry.category, &entry.level, &entry.message).await)
}

pub async fn log_resource_access(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    require_basic(state.secrets.as_ref(), &headers).await?;
    let access: ResourceAccess = parse(&body)?;
    stored(state.journal.record_access(&access.resource, &access.ip_address).await)
}

/// Record a page view reported by the site's front end. Unauthenticated.
pub async fn log_webpage_access(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Query(query): Query<WebpageAccess>,
) -> Result<StatusCode, ApiError> {
    let Some(webpage) = query.webpage.filter(|webpage| !webpage.is_empty()) else {
        tracing::warn!("Webpage access without a `webpage`");
        return Err(ApiError::BadRequest);
    };
    stored(state.journal.record_access(&webpage, &ip).await)
}
