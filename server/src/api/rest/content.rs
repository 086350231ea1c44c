//! `/api/v1/content` — range-aware download and conflict-checked upload.

use crate::api::rest::error::{extract_user_id, validate_path, AppError};
use crate::api::rest::range::parse_range_header;
use crate::api::AppState;
use crate::pipeline::UploadPrecondition;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// `GET /api/v1/content/{path...}` — download, honoring `Range`.
pub async fn download(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let path = validate_path(&format!("/{path}"))?;

    let entry = crate::db::files::get_file_by_path(&state.db, &path)
        .await?
        .ok_or_else(|| AppError::NotFound(path.clone()))?;

    if entry.is_dir {
        return Err(AppError::BadRequest("path is a directory".into()));
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range_header(v, entry.size_bytes.max(0) as u64));

    let result = state.pipeline.download(&path, range).await?;

    let status = if range.is_some() { StatusCode::PARTIAL_CONTENT } else { StatusCode::OK };

    let mut response = (status, result.data).into_response();
    let headers_mut = response.headers_mut();
    headers_mut.insert(
        header::CONTENT_TYPE,
        result.content_type.parse().unwrap_or_else(|_| header::HeaderValue::from_static("application/octet-stream")),
    );
    headers_mut.insert(header::ACCEPT_RANGES, header::HeaderValue::from_static("bytes"));
    if let Some(r) = range {
        if let Ok(value) =
            header::HeaderValue::from_str(&format!("bytes {}-{}/{}", r.start, r.end, result.total_size))
        {
            headers_mut.insert(header::CONTENT_RANGE, value);
        }
    }

    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub group_id: Option<uuid::Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub path: String,
    pub version: i64,
    pub hash: String,
    pub size: i64,
}

/// `POST /api/v1/content/{path...}` — upload, honoring `X-Expected-Version`/`If-Match`.
pub async fn upload(
    State(state): State<AppState>,
    Path(path): Path<String>,
    axum::extract::Query(query): axum::extract::Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    let path = validate_path(&format!("/{path}"))?;
    let user_id = extract_user_id(&state, &headers)?;

    let expected_version = headers
        .get("x-expected-version")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());
    let if_match_hash = headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string());

    let precondition = UploadPrecondition {
        expected_version,
        if_match_hash,
    };

    let declared_size = body.len() as u64;
    let outcome = state
        .pipeline
        .upload(&path, body, declared_size, Some(user_id), query.group_id, precondition)
        .await?;

    Ok(Json(UploadResponse {
        path: outcome.path,
        version: outcome.version,
        hash: outcome.hash,
        size: outcome.size,
    }))
}
