//! `/api/v1/tree` — metadata tree browsing and directory management.

use crate::api::rest::error::{extract_user_id, validate_path, AppError};
use crate::api::rest::types::TreeNodeDto;
use crate::api::AppState;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

/// `GET /api/v1/tree` — the full tree, rooted at `/`.
///
/// Responds gzip-compressed when the client sends `Accept-Encoding: gzip`;
/// the full tree can run into the tens of thousands of nodes and the spec
/// calls this out explicitly as the one response worth compressing.
pub async fn get_tree(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let root = state
        .tree
        .get("/")
        .await
        .ok_or_else(|| AppError::Internal("tree cache has no root".into()))?;

    let dto = TreeNodeDto::from_node(&root, true);
    let body = serde_json::to_vec(&dto).map_err(|e| AppError::Internal(e.to_string()))?;

    maybe_gzip(&headers, body).await
}

#[derive(Debug, Deserialize)]
pub struct SubtreeQuery {
    #[serde(default)]
    pub recursive: bool,
}

/// `GET /api/v1/tree/{path...}` — a single node, optionally with its children.
pub async fn get_subtree(
    State(state): State<AppState>,
    Path(path): Path<String>,
    axum::extract::Query(query): axum::extract::Query<SubtreeQuery>,
) -> Result<Json<TreeNodeDto>, AppError> {
    let path = validate_path(&format!("/{path}"))?;

    let node = state
        .tree
        .subtree(&path)
        .await
        .ok_or_else(|| AppError::NotFound(path.clone()))?;

    Ok(Json(TreeNodeDto::from_node(&node, query.recursive)))
}

#[derive(Debug, Deserialize)]
pub struct CreateDirQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// `PUT /api/v1/tree/{path...}?type=dir` — create an empty directory.
pub async fn create_dir(
    State(state): State<AppState>,
    Path(path): Path<String>,
    axum::extract::Query(query): axum::extract::Query<CreateDirQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let path = validate_path(&format!("/{path}"))?;
    let user_id = extract_user_id(&state, &headers)?;

    if query.kind.as_deref() != Some("dir") {
        return Err(AppError::BadRequest("only type=dir is supported on this endpoint".into()));
    }

    if crate::db::files::get_file_by_path(&state.db, &path).await?.is_some() {
        return Err(AppError::BadRequest(format!("{path} already exists")));
    }

    crate::db::files::insert_file(
        &state.db,
        &path,
        true,
        Some(user_id),
        crate::db::models::Visibility::Private,
        None,
    )
    .await?;

    state.tree.request_rebuild();

    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub recursive: bool,
}

/// `DELETE /api/v1/tree/{path...}` — soft-delete a file or directory.
/// Deleting a non-empty directory requires `?recursive=true`; deleting a path
/// that doesn't exist is a 404, not a no-op 204.
pub async fn delete_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
    axum::extract::Query(query): axum::extract::Query<DeleteQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let path = validate_path(&format!("/{path}"))?;
    let user_id = extract_user_id(&state, &headers)?;

    let entry = crate::db::files::get_file_by_path(&state.db, &path)
        .await?
        .ok_or_else(|| AppError::NotFound(path.clone()))?;

    if entry.is_dir && !query.recursive {
        let children = crate::db::files::list_children(&state.db, &path).await?;
        if !children.is_empty() {
            return Err(AppError::BadRequest(
                "directory is not empty, pass ?recursive=true to delete its contents too".into(),
            ));
        }
    }

    state.pipeline.delete(&path, Some(user_id)).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn maybe_gzip(headers: &HeaderMap, body: Vec<u8>) -> Result<Response, AppError> {
    let accepts_gzip = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);

    if !accepts_gzip {
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response());
    }

    let mut encoder = async_compression::tokio::write::GzipEncoder::new(Vec::new());
    encoder
        .write_all(&body)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    encoder.shutdown().await.map_err(|e| AppError::Internal(e.to_string()))?;
    let compressed = encoder.into_inner();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_ENCODING, "gzip"),
        ],
        compressed,
    )
        .into_response())
}
