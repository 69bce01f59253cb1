//! REST API handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use blockdiff_core::{
    BlockChange, DiffResult, DiffSummary, Document, SessionEvent, Side, StorageError, json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::ServerState;
use crate::share::SharedPair;

/// Error body returned by every failing endpoint.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl ToString) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.to_string())
    }

    fn unprocessable(message: impl ToString) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message.to_string())
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal(message: impl ToString) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct DiffResponse {
    pub summary: DiffSummary,
    pub diff: DiffResult,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub mine: Value,
    pub previous: Value,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub side: Side,
    pub path: String,
    pub aborted_previous: bool,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    let health = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    Json(health)
}

/// Full session state: latest diff, decorations and views.
pub async fn get_state(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.session.read().await.snapshot())
}

pub async fn get_diff(State(state): State<Arc<ServerState>>) -> Json<DiffResponse> {
    let session = state.session.read().await;
    let diff = session.last_diff().clone();
    Json(DiffResponse {
        summary: diff.summary(),
        diff,
    })
}

/// Native document of one side. Stacks too deep for the native format
/// are refused; the saved file and backups keep them.
pub async fn get_workspace(
    State(state): State<Arc<ServerState>>,
    Path(side): Path<Side>,
) -> Result<Json<Value>, ApiError> {
    let document = state.session.read().await.document(side);
    document.to_json().map(Json).map_err(ApiError::unprocessable)
}

/// Replace one side with the posted document (native or mergeable).
/// Bodies are parsed here rather than by the `Json` extractor so documents
/// nested past serde_json's default recursion limit still load.
pub async fn put_workspace(
    State(state): State<Arc<ServerState>>,
    Path(side): Path<Side>,
    body: String,
) -> Result<Json<DiffSummary>, ApiError> {
    let document: Value = json::from_str(&body).map_err(ApiError::bad_request)?;
    state
        .dispatch(SessionEvent::BlockChanged {
            side,
            change: BlockChange::Load { document },
        })
        .await
        .map_err(ApiError::bad_request)?;
    let summary = state.session.read().await.last_diff().summary();
    info!("Replaced {} workspace via API", side);
    Ok(Json(summary))
}

pub async fn create_share(
    State(state): State<Arc<ServerState>>,
    body: String,
) -> Result<(StatusCode, Json<ShareResponse>), ApiError> {
    let request: ShareRequest = json::from_str(&body).map_err(ApiError::bad_request)?;
    let catalog = state.session.read().await.catalog().clone();
    for document in [&request.mine, &request.previous] {
        Document::from_json(document, &catalog).map_err(ApiError::bad_request)?;
    }
    let pair = state
        .shares
        .put(request.mine, request.previous)
        .map_err(|e| match e {
            StorageError::Document(_) => ApiError::bad_request(e),
            e => ApiError::internal(e),
        })?;
    Ok((StatusCode::CREATED, Json(ShareResponse { key: pair.key })))
}

pub async fn get_share(
    State(state): State<Arc<ServerState>>,
    Path(key): Path<String>,
) -> Result<Json<SharedPair>, ApiError> {
    match state.shares.get(&key) {
        Ok(Some(pair)) => Ok(Json(pair)),
        Ok(None) => Err(ApiError::not_found(format!("no share with key '{}'", key))),
        Err(e) => {
            warn!("Failed to read share {}: {}", key, e);
            Err(ApiError::internal(e))
        }
    }
}

/// Write one side back to the file it was loaded from.
pub async fn save_workspace(
    State(state): State<Arc<ServerState>>,
    Path(side): Path<Side>,
) -> Result<(StatusCode, Json<SaveResponse>), ApiError> {
    let path = state
        .files
        .path(side)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("no file configured for {}", side)))?;
    let document = state.session.read().await.document(side);
    let aborted_previous = state
        .saves
        .save(side, path.clone(), &document, state.files.mergeable)
        .await
        .map_err(ApiError::internal)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SaveResponse {
            side,
            path: path.display().to_string(),
            aborted_previous,
        }),
    ))
}
