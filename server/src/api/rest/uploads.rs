//! `/api/v1/uploads` — resumable chunked upload lifecycle.

use crate::api::rest::error::{extract_user_id, validate_path, AppError};
use crate::api::AppState;
use crate::pipeline::UploadPrecondition;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct BeginUploadRequest {
    pub path: String,
    pub total_size: i64,
    #[serde(default)]
    pub chunk_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BeginUploadResponse {
    pub upload_id: Uuid,
    pub chunk_size: i64,
    pub total_chunks: i32,
}

const DEFAULT_CHUNK_SIZE: i64 = 8 * 1024 * 1024;

/// `POST /api/v1/uploads` — begin a resumable upload session.
pub async fn begin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BeginUploadRequest>,
) -> Result<Json<BeginUploadResponse>, AppError> {
    let path = validate_path(&req.path)?;
    let user_id = extract_user_id(&state, &headers)?;

    if req.total_size < 0 {
        return Err(AppError::BadRequest("total_size cannot be negative".into()));
    }

    let chunk_size = req.chunk_size.unwrap_or(state.config.chunk_size_bytes).max(1).min(DEFAULT_CHUNK_SIZE * 4);

    let upload_id = state
        .pipeline
        .begin_chunked_upload(&path, req.total_size, chunk_size, Some(user_id))
        .await?;

    let total_chunks = ((req.total_size + chunk_size - 1) / chunk_size).max(1) as i32;

    Ok(Json(BeginUploadResponse {
        upload_id,
        chunk_size,
        total_chunks,
    }))
}

/// `PUT /api/v1/uploads/{id}/{index}` — write one chunk.
pub async fn put_chunk(
    State(state): State<AppState>,
    Path((upload_id, index)): Path<(Uuid, i32)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let _user_id = extract_user_id(&state, &headers)?;
    state.pipeline.put_chunk(upload_id, index, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Default)]
pub struct CompleteUploadRequest {
    pub group_id: Option<Uuid>,
    pub expected_version: Option<i64>,
    pub if_match_hash: Option<String>,
}

/// `POST /api/v1/uploads/{id}/complete` — assemble and finalize.
pub async fn complete(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<CompleteUploadRequest>>,
) -> Result<Json<super::content::UploadResponse>, AppError> {
    let user_id = extract_user_id(&state, &headers)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let precondition = UploadPrecondition {
        expected_version: req.expected_version,
        if_match_hash: req.if_match_hash,
    };

    let outcome = state
        .pipeline
        .complete_chunked_upload(upload_id, Some(user_id), req.group_id, precondition)
        .await?;

    Ok(Json(super::content::UploadResponse {
        path: outcome.path,
        version: outcome.version,
        hash: outcome.hash,
        size: outcome.size,
    }))
}

/// `DELETE /api/v1/uploads/{id}` — abort an in-progress upload.
pub async fn abort(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let _user_id = extract_user_id(&state, &headers)?;
    state.pipeline.abort_chunked_upload(upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
