//! Error handling for REST API.
//!
//! Provides the `AppError` type used across all REST endpoints, and
//! `validate_path`, the traversal/injection defense every path-taking handler
//! runs input through before it reaches the MetaStore or a backend.

use crate::api::AppState;
use crate::auth;
use crate::pipeline::{ConflictInfo, PipelineError};
use crate::storage::{BackendError, RouterError};
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(Box<ConflictInfo>),
    TooLarge(String),
    RateLimited,
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message, extra) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            AppError::Conflict(info) => {
                let extra = serde_json::to_value(&*info).ok();
                (StatusCode::CONFLICT, "conflict", "version or hash precondition failed".to_string(), extra)
            }
            AppError::TooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, "too_large", msg, None),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "too many requests".to_string(),
                None,
            ),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg, None),
            AppError::Internal(msg) => {
                tracing::error!(details = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "an internal error occurred".to_string(),
                    None,
                )
            }
        };

        let mut body = serde_json::json!({ "error": message, "code": code });
        if let (Some(extra), Some(obj)) = (extra, body.as_object_mut()) {
            obj.insert("details".to_string(), extra);
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("internal error: {}", err);
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("database error: {}", err);
        AppError::Internal("database error".to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(msg) => AppError::NotFound(msg),
            PipelineError::Conflict(info) => AppError::Conflict(info),
            PipelineError::ReadOnly => AppError::Forbidden("storage location is read-only".into()),
            PipelineError::NoLocation => AppError::Unavailable("no storage location available".into()),
            PipelineError::SizeMismatch { declared, written } => AppError::BadRequest(format!(
                "declared size {declared} does not match bytes received {written}"
            )),
            PipelineError::IncompleteUpload(id) => {
                AppError::BadRequest(format!("chunked upload {id} is missing chunks"))
            }
            PipelineError::UploadExpired(id) => AppError::NotFound(format!("chunked upload {id} has expired")),
            PipelineError::InvalidRange => AppError::BadRequest("invalid range".into()),
            PipelineError::IsDirectory => AppError::BadRequest("path is a directory".into()),
            PipelineError::Backend(e) => e.into(),
            PipelineError::Router(e) => e.into(),
            PipelineError::Db(e) => e.into(),
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(key) => AppError::NotFound(key),
            BackendError::Unavailable(msg) => AppError::Unavailable(msg),
            other => {
                tracing::error!("backend error: {}", other);
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl From<RouterError> for AppError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::NoLocation => AppError::Unavailable("no storage location available".into()),
            RouterError::LocationNotFound(id) => AppError::NotFound(format!("storage location {id}")),
            RouterError::ReadOnly(id) => AppError::Forbidden(format!("storage location {id} is read-only")),
            other => {
                tracing::error!("router error: {}", other);
                AppError::Internal(other.to_string())
            }
        }
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Extract user ID from Authorization header.
pub fn extract_user_id(state: &AppState, headers: &axum::http::HeaderMap) -> Result<Uuid, AppError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing authorization header".into()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("invalid authorization format".into()))?;

    let user_id = auth::verify_token(&state.config.jwt_secret, token)
        .map_err(|_| AppError::Unauthorized("invalid or expired token".into()))?;
    Ok(user_id)
}

// ============================================================================
// PATH VALIDATION
// ============================================================================

/// Validate and normalize a file path to prevent path traversal and injection
/// attacks. Returns the normalized path on success.
pub fn validate_path(path: &str) -> Result<String, AppError> {
    if path.is_empty() {
        return Err(AppError::BadRequest("path cannot be empty".into()));
    }
    if path.contains('\0') {
        return Err(AppError::BadRequest("path contains invalid null byte".into()));
    }

    let decoded = percent_decode(path);

    let mut normalized = String::with_capacity(decoded.len());
    let mut prev_was_slash = false;
    for segment in decoded.split('/') {
        if segment.is_empty() {
            if !prev_was_slash {
                normalized.push('/');
                prev_was_slash = true;
            }
            continue;
        }
        if segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(AppError::BadRequest("path contains invalid traversal sequence '..'".into()));
        }
        if !prev_was_slash {
            normalized.push('/');
        }
        normalized.push_str(segment);
        prev_was_slash = false;
    }
    if decoded.ends_with('/') && !normalized.ends_with('/') {
        normalized.push('/');
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    if !normalized.starts_with('/') {
        normalized.insert(0, '/');
    }
    if normalized.contains('\\') {
        return Err(AppError::BadRequest("path contains invalid backslash".into()));
    }
    if normalized.chars().any(|c| c.is_control()) {
        return Err(AppError::BadRequest("path contains invalid control characters".into()));
    }
    if !normalized.chars().all(|c| c.is_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | ' ')) {
        return Err(AppError::BadRequest("path contains invalid characters".into()));
    }

    Ok(normalized)
}

fn percent_decode(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                result.push((hi << 4 | lo) as char);
                i += 3;
                continue;
            }
        }
        result.push(bytes[i] as char);
        i += 1;
    }
    result
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_paths_pass() {
        assert!(validate_path("/foo").is_ok());
        assert!(validate_path("/foo/bar.txt").is_ok());
        assert!(validate_path("/foo bar/baz.txt").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_path("").is_err());
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_path("/../etc/passwd").is_err());
        assert!(validate_path("/foo/../bar").is_err());
        assert!(validate_path("/foo/%2e%2e/bar").is_err());
    }

    #[test]
    fn rejects_null_bytes() {
        assert!(validate_path("/foo\0bar").is_err());
    }

    #[test]
    fn normalizes_slashes() {
        assert_eq!(validate_path("//foo///bar").unwrap(), "/foo/bar");
    }

    #[test]
    fn rejects_invalid_chars() {
        assert!(validate_path("/foo<bar").is_err());
        assert!(validate_path("/foo|bar").is_err());
    }

    #[test]
    fn rejects_backslash() {
        assert!(validate_path("/foo\\bar").is_err());
    }
}
