//! `/api/photography` handlers.

use crate::server::AppState;
use crate::server::auth::require_token;
use crate::server::error::ApiError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use shutter_gallery::error::Error as GalleryError;
use shutter_gallery::models::Tags;
use shutter_gallery::reload::{ReloadEvent, ReloadMode, ReloadSummary};
use shutter_gallery::{TagQuery, Upload};
use shutter_store::Document;

/// Multipart field carrying uploaded files.
const UPLOAD_FIELD: &str = "photos";

/// Log a gallery failure and turn it into a status code.
fn fail(error: GalleryError) -> ApiError {
    let status = ApiError::from(&*error);
    match status {
        ApiError::Internal => tracing::error!(error = ?error, "Photography request failed"),
        _ => tracing::warn!(error = ?error, "Photography request rejected"),
    }
    status
}

/// Issue a new photo identity. The body is the photo's tag mapping.
pub async fn create_photo(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_token(state.secrets.as_ref(), &headers).await?;
    let tags: Tags = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed tag mapping");
        ApiError::BadRequest
    })?;
    let id = state.gallery.begin(tags).await.map_err(fail)?;
    Ok((StatusCode::CREATED, Json(json!({ "uuid": id }))))
}

/// Attach the uploaded `photos` files to an identity.
///
/// The token is checked before any of the body is read. Files are staged as
/// they stream in; on any failure, or when the client goes away mid-body,
/// everything staged is deleted again.
pub async fn upload_photos(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    require_token(state.secrets.as_ref(), &headers).await?;
    let mut upload = state.gallery.upload();
    if let Err(error) = receive(&mut multipart, &mut upload).await {
        upload.discard().await;
        return Err(error);
    }
    if upload.is_empty() {
        tracing::warn!(%photo_id, "Upload without any `{UPLOAD_FIELD}` files");
        return Err(ApiError::BadRequest);
    }
    upload.attach(&photo_id).await.map_err(fail)?;
    Ok(StatusCode::CREATED)
}

/// Stage every `photos` field of the body; other fields are skipped.
async fn receive(multipart: &mut Multipart, upload: &mut Upload) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!(error = %e, "Malformed multipart body");
        ApiError::BadRequest
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        upload.stage(&file_name, field).await.map_err(fail)?;
    }
    Ok(())
}

/// Rebuild the collections from the sidecars.
///
/// The run happens on its own task, so it finishes even if the client goes
/// away.
pub async fn reload_tables(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    require_token(state.secrets.as_ref(), &headers).await?;
    let events = state.gallery.reload(ReloadMode::Rebuild).map_err(fail)?;
    let run = tokio::spawn(async move {
        let mut events = std::pin::pin!(events);
        let mut summary: Option<ReloadSummary> = None;
        while let Some(event) = events.next().await {
            if let ReloadEvent::Complete(done) = event? {
                summary = Some(done);
            }
        }
        Ok::<_, GalleryError>(summary)
    });
    match run.await {
        Ok(Ok(Some(summary))) => {
            tracing::info!(reloaded = summary.reloaded, skipped = summary.skipped, "Reloaded photo collections");
            Ok(StatusCode::CREATED)
        },
        Ok(Ok(None)) => {
            tracing::error!("Reload ended without completing");
            Err(ApiError::Internal)
        },
        Ok(Err(error)) => Err(fail(error)),
        Err(e) => {
            tracing::error!(error = %e, "Reload task failed");
            Err(ApiError::Internal)
        },
    }
}

pub async fn get_all_tags(State(state): State<AppState>) -> Result<Json<Document>, ApiError> {
    Ok(Json(state.gallery.all_tags().await.map_err(fail)?))
}

#[derive(Debug, Deserialize)]
pub struct PhotosQuery {
    tags: Option<String>,
}

/// Photos having every tag in `?tags=a+b`; all photos without it.
pub async fn get_photos(
    State(state): State<AppState>,
    Query(query): Query<PhotosQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let query = TagQuery::parse(query.tags.as_deref().unwrap_or_default());
    Ok(Json(state.gallery.photos_by_tags(&query).await.map_err(fail)?))
}

pub async fn get_photo_data(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(state.gallery.photo_data(&photo_id).await.map_err(fail)?))
}
