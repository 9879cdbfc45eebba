//! HTTP boundary: routing, multipart extraction, and error mapping.
//!
//! The interesting behavior lives in [`crate::service::GatewayService`];
//! handlers here only pull the authorization header and multipart fields
//! apart and translate service outcomes into status codes.

use crate::config::ApiConfig;
use crate::entry_store::Entry;
use crate::error::ServiceError;
use crate::media_pipeline::UploadedFile;
use crate::service::GatewayService;
use axum::{
    extract::multipart::Field,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::instrument;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GatewayService>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig, max_upload_bytes: usize) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        .route("/api/upload", post(upload))
        .route("/api/entries", get(list_entries))
        .route("/api/entry/:entry_id", delete(delete_entry))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Liveness probe
async fn ping() -> &'static str {
    "pong"
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "keepsake-gateway"
    }))
}

/// Authorization header value, if any
fn bearer_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Upload a media file (multipart: `file`, optional `audio` and `caption`)
#[instrument(skip_all)]
async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Entry>, ApiError> {
    let mut primary = None;
    let mut audio = None;
    let mut caption = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(&format!("invalid multipart body: {err}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => primary = Some(read_file_field(field).await?),
            Some("audio") => audio = Some(read_file_field(field).await?),
            Some("caption") => {
                caption = field
                    .text()
                    .await
                    .map_err(|err| bad_request(&format!("invalid caption field: {err}")))?;
            }
            _ => {}
        }
    }

    state
        .service
        .upload(bearer_header(&headers), primary, audio, caption)
        .await
        .map(Json)
        .map_err(error_response)
}

/// List the caller's entries in append order
#[instrument(skip_all)]
async fn list_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Entry>>, ApiError> {
    state
        .service
        .list_entries(bearer_header(&headers))
        .await
        .map(Json)
        .map_err(error_response)
}

/// Delete one of the caller's entries by id
#[instrument(skip_all)]
async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .service
        .delete_entry(bearer_header(&headers), &entry_id)
        .await
        .map(|()| Json(serde_json::json!({ "success": true })))
        .map_err(error_response)
}

/// Read a multipart file field into memory
async fn read_file_field(field: Field<'_>) -> Result<UploadedFile, ApiError> {
    let filename = field.file_name().unwrap_or("upload.bin").to_string();
    let content_type = field.content_type().map(str::to_string);

    let bytes = field
        .bytes()
        .await
        .map_err(|err| bad_request(&format!("failed to read file field: {err}")))?
        .to_vec();

    Ok(UploadedFile {
        filename,
        content_type,
        bytes,
    })
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: "BAD_REQUEST".to_string(),
        }),
    )
}

/// Map service outcomes onto HTTP statuses
fn error_response(err: ServiceError) -> ApiError {
    let (status, code) = match &err {
        ServiceError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "NO_FILE"),
        ServiceError::EntryNotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ServiceError::TranscodeFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TRANSCODE_FAILED"),
        ServiceError::StoreUnavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: code.to_string(),
        }),
    )
}
