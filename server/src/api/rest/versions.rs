//! `/api/v1/versions/{path...}` — version history listing, download, and rollback.

use crate::api::rest::error::{extract_user_id, validate_path, AppError};
use crate::api::AppState;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct VersionsQuery {
    pub v: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct VersionDto {
    pub version: i64,
    pub size: i64,
    pub hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct VersionListResponse {
    pub path: String,
    pub current_version: i64,
    pub versions: Vec<VersionDto>,
    pub total: i64,
}

/// `GET /api/v1/versions/{path...}` — list history, or download one version
/// when `?v=N` is given.
pub async fn get_versions(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<VersionsQuery>,
) -> Result<Response, AppError> {
    let path = validate_path(&format!("/{path}"))?;

    let entry = crate::db::files::get_file_by_path(&state.db, &path)
        .await?
        .ok_or_else(|| AppError::NotFound(path.clone()))?;

    if let Some(v) = query.v {
        let version = crate::db::versions::get_version(&state.db, entry.id, v)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{path}@v{v}")))?;

        let location_id = version.storage_location_id.ok_or_else(|| AppError::Unavailable("version has no storage location".into()))?;
        let (_, backend) = state.router.resolve_for_file(Some(location_id), entry.group_id).await?;
        let data = backend.get(&version.object_key, None).await?;
        let content_type = mime_guess::from_path(&path).first_or_octet_stream().to_string();

        return Ok((
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, content_type)],
            data,
        )
            .into_response());
    }

    let (versions, total) = crate::db::versions::list_versions(&state.db, entry.id, query.limit, query.offset).await?;

    let dto = VersionListResponse {
        path: path.clone(),
        current_version: entry.version,
        versions: versions
            .into_iter()
            .map(|v| VersionDto {
                version: v.version,
                size: v.size_bytes,
                hash: v.content_hash,
                created_at: v.created_at,
            })
            .collect(),
        total,
    };

    Ok(Json(dto).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RollbackQuery {
    pub v: i64,
}

#[derive(Debug, Serialize)]
pub struct RollbackResponse {
    pub path: String,
    pub version: i64,
    pub hash: String,
}

/// `POST /api/v1/versions/{path...}?v=N` — roll back to a prior version,
/// creating a new version rather than rewinding the counter.
pub async fn rollback(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<RollbackQuery>,
    headers: axum::http::HeaderMap,
) -> Result<Json<RollbackResponse>, AppError> {
    let path = validate_path(&format!("/{path}"))?;
    let _user_id = extract_user_id(&state, &headers)?;

    let outcome = state.pipeline.rollback(&path, query.v).await?;

    Ok(Json(RollbackResponse {
        path: outcome.path,
        version: outcome.version,
        hash: outcome.hash,
    }))
}
