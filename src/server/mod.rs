//! The HTTP surface: logging endpoints under `/api` and the gallery under
//! `/api/photography`.

mod auth;
pub mod error;
mod logs;
mod photography;

use crate::error::{ErrorKind, Result};
use crate::secrets::SecretsProvider;
use axum::Router;
use axum::extract::{ConnectInfo, DefaultBodyLimit, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use exn::ResultExt;
use shutter_gallery::Gallery;
use shutter_store::Journal;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Everything a handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub gallery: Gallery,
    pub journal: Journal,
    pub secrets: Arc<dyn SecretsProvider>,
    /// Site URL without a trailing slash; request paths are appended to it in
    /// the access log.
    pub site_base: Arc<str>,
    pub max_upload_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let photography = Router::new()
        .route("/create-photo", post(photography::create_photo))
        .route("/upload-photos/{photo_id}", put(photography::upload_photos))
        .route("/reload-tables", put(photography::reload_tables))
        .route("/get-all-tags", get(photography::get_all_tags))
        .route("/get-photos", get(photography::get_photos))
        .route("/get-photo-data/{photo_id}", get(photography::get_photo_data))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    Router::new()
        .route("/api", get(logs::now))
        .route("/api/", get(logs::now))
        .route("/api/append-to-log", post(logs::append_to_log))
        .route("/api/log-resource-access", post(logs::log_resource_access))
        .route("/api/log-webpage-access", post(logs::log_webpage_access))
        .nest("/api/photography", photography)
        .layer(middleware::from_fn_with_state(state.clone(), record_access))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let address = listener.local_addr().or_raise(|| ErrorKind::Server)?;
    tracing::info!(%address, "Listening");
    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .or_raise(|| ErrorKind::Server)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// Address of the client: the first `X-Forwarded-For` entry when behind a
/// proxy, the peer address otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    fn from_parts(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let peer = || extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(address)| address.ip().to_string());
        Self(forwarded.or_else(peer).unwrap_or_else(|| "unknown".to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self::from_parts(&parts.headers, &parts.extensions))
    }
}

/// Record every request as a resource access.
async fn record_access(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ClientIp(ip) = ClientIp::from_parts(request.headers(), request.extensions());
    let uri = request.uri();
    let target = uri.path_and_query().map_or(uri.path(), |target| target.as_str());
    let location = format!("{}{target}", state.site_base);
    let response = next.run(request).await;
    if let Err(e) = state.journal.record_access(&location, &ip).await {
        tracing::warn!(%location, error = ?e, "Could not record resource access");
    }
    response
}
