//! HTTP transport to a `driftboxd` server.
//!
//! Carries the teacher's `reqwest`-based `ApiClient` shape (a thin struct
//! around `reqwest::Client` plus a `base_url`, an `ensure_ok` helper that
//! surfaces error bodies) but is redirected at the Driftbox REST surface
//! instead of the teacher's own file/chunk/conflict endpoints.

use crate::range::ByteRange;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNodeDto {
    pub path: String,
    pub path_id: String,
    pub name: String,
    pub is_dir: bool,
    pub size: i64,
    pub hash: Option<String>,
    pub version: i64,
    pub visibility: String,
    pub modified_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub children: Vec<TreeNodeDto>,
}

#[derive(Debug, Serialize)]
struct TokenRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub path: String,
    pub version: i64,
    pub hash: String,
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConflictBody {
    pub error: String,
    pub current: ConflictCurrent,
}

#[derive(Debug, Deserialize)]
pub struct ConflictCurrent {
    pub version: i64,
    pub hash: Option<String>,
    pub size: i64,
    pub mod_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
struct BeginUploadRequest {
    path: String,
    total_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BeginUploadResponse {
    pub upload_id: Uuid,
    pub chunk_size: i64,
    pub total_chunks: i32,
}

#[derive(Debug, Deserialize)]
pub struct VersionDto {
    pub version: i64,
    pub size: i64,
    pub hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct VersionListResponse {
    pub path: String,
    pub current_version: i64,
    pub versions: Vec<VersionDto>,
    pub total: i64,
}

/// An upload's outcome: a plain success, or the `409` conflict body carrying
/// the entry's current state so the caller can decide how to proceed.
#[derive(Debug)]
pub enum UploadOutcome {
    Committed(UploadResponse),
    Conflict(ConflictCurrent),
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Option<u64>),
    #[error("server unavailable")]
    Unavailable,
    #[error("http error ({status}): {body}")]
    Other { status: u16, body: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn classify(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        match status.as_u16() {
            401 => Err(ApiError::Unauthorized),
            404 => Err(ApiError::NotFound(resp.text().await.unwrap_or_default())),
            429 => {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Err(ApiError::RateLimited(retry_after))
            }
            503 => Err(ApiError::Unavailable),
            code => {
                let body = resp.text().await.unwrap_or_default();
                Err(ApiError::Other { status: code, body })
            }
        }
    }

    pub async fn health(&self) -> Result<bool, ApiError> {
        let resp = self.client.get(self.url("/health")).send().await?;
        Ok(resp.status().is_success())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/token"))
            .json(&TokenRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        Ok(Self::classify(resp).await?.json().await?)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError> {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/refresh"))
            .json(&RefreshRequest { refresh_token: refresh_token.to_string() })
            .send()
            .await?;
        Ok(Self::classify(resp).await?.json().await?)
    }

    pub async fn revoke(&self, token: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .delete(self.url("/api/v1/auth/token"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::classify(resp).await?;
        Ok(())
    }

    pub async fn get_tree(&self, token: &str) -> Result<TreeNodeDto, ApiError> {
        let resp = self
            .client
            .get(self.url("/api/v1/tree"))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT_ENCODING, "gzip")
            .send()
            .await?;
        Ok(Self::classify(resp).await?.json().await?)
    }

    pub async fn create_dir(&self, token: &str, path: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .put(self.url(&format!("/api/v1/tree{}", encode_path(path))))
            .query(&[("type", "dir")])
            .bearer_auth(token)
            .send()
            .await?;
        Self::classify(resp).await?;
        Ok(())
    }

    pub async fn delete(&self, token: &str, path: &str, recursive: bool) -> Result<(), ApiError> {
        let resp = self
            .client
            .delete(self.url(&format!("/api/v1/tree{}", encode_path(path))))
            .query(&[("recursive", recursive.to_string())])
            .bearer_auth(token)
            .send()
            .await?;
        Self::classify(resp).await?;
        Ok(())
    }

    /// Download. When `range` is given, sends a `Range` header and expects a
    /// `206`; the server parses exactly `bytes=a-b` strings, so this builds
    /// that same shape here rather than reusing [`ByteRange`]'s internal form.
    pub async fn download(&self, token: &str, path: &str, range: Option<ByteRange>) -> Result<bytes::Bytes, ApiError> {
        let mut req = self
            .client
            .get(self.url(&format!("/api/v1/content{}", encode_path(path))))
            .bearer_auth(token);
        if let Some(r) = range {
            req = req.header(reqwest::header::RANGE, format!("bytes={}-{}", r.start, r.end));
        }
        let resp = req.send().await?;
        Ok(Self::classify(resp).await?.bytes().await?)
    }

    pub async fn upload(
        &self,
        token: &str,
        path: &str,
        data: bytes::Bytes,
        expected_version: Option<i64>,
        if_match_hash: Option<&str>,
    ) -> Result<UploadOutcome, ApiError> {
        let mut req = self
            .client
            .post(self.url(&format!("/api/v1/content{}", encode_path(path))))
            .bearer_auth(token)
            .body(data);
        if let Some(v) = expected_version {
            req = req.header("x-expected-version", v.to_string());
        }
        if let Some(h) = if_match_hash {
            req = req.header(reqwest::header::IF_MATCH, h);
        }
        let resp = req.send().await?;
        if resp.status().as_u16() == 409 {
            let body: ConflictBody = resp.json().await?;
            return Ok(UploadOutcome::Conflict(body.current));
        }
        let resp = Self::classify(resp).await?;
        Ok(UploadOutcome::Committed(resp.json().await?))
    }

    pub async fn begin_upload(&self, token: &str, path: &str, total_size: i64, chunk_size: Option<i64>) -> Result<BeginUploadResponse, ApiError> {
        let resp = self
            .client
            .post(self.url("/api/v1/uploads"))
            .bearer_auth(token)
            .json(&BeginUploadRequest { path: path.to_string(), total_size, chunk_size })
            .send()
            .await?;
        Ok(Self::classify(resp).await?.json().await?)
    }

    pub async fn put_chunk(&self, token: &str, upload_id: Uuid, index: i32, data: bytes::Bytes) -> Result<(), ApiError> {
        let resp = self
            .client
            .put(self.url(&format!("/api/v1/uploads/{upload_id}/{index}")))
            .bearer_auth(token)
            .body(data)
            .send()
            .await?;
        Self::classify(resp).await?;
        Ok(())
    }

    pub async fn complete_upload(&self, token: &str, upload_id: Uuid) -> Result<UploadOutcome, ApiError> {
        let resp = self
            .client
            .post(self.url(&format!("/api/v1/uploads/{upload_id}/complete")))
            .bearer_auth(token)
            .send()
            .await?;
        if resp.status().as_u16() == 409 {
            let body: ConflictBody = resp.json().await?;
            return Ok(UploadOutcome::Conflict(body.current));
        }
        let resp = Self::classify(resp).await?;
        Ok(UploadOutcome::Committed(resp.json().await?))
    }

    pub async fn abort_upload(&self, token: &str, upload_id: Uuid) -> Result<(), ApiError> {
        let resp = self
            .client
            .delete(self.url(&format!("/api/v1/uploads/{upload_id}")))
            .bearer_auth(token)
            .send()
            .await?;
        Self::classify(resp).await?;
        Ok(())
    }

    pub async fn get_versions(&self, token: &str, path: &str, limit: i64, offset: i64) -> Result<VersionListResponse, ApiError> {
        let resp = self
            .client
            .get(self.url(&format!("/api/v1/versions{}", encode_path(path))))
            .query(&[("limit", limit.to_string()), ("offset", offset.to_string())])
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::classify(resp).await?.json().await?)
    }

    pub async fn rollback(&self, token: &str, path: &str, version: i64) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.url(&format!("/api/v1/versions{}", encode_path(path))))
            .query(&[("v", version.to_string())])
            .bearer_auth(token)
            .send()
            .await?;
        Self::classify(resp).await?;
        Ok(())
    }

    /// Opens the SSE stream; the body is handed to [`crate::sse::SseStream`]
    /// for framing rather than parsed here.
    pub async fn open_events(&self, token: &str) -> Result<reqwest::Response, ApiError> {
        let resp = self
            .client
            .get(self.url("/api/v1/events"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::classify(resp).await
    }
}

fn encode_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(|seg| urlencoding_segment(seg))
        .fold(String::new(), |mut acc, seg| {
            acc.push('/');
            acc.push_str(&seg);
            acc
        })
}

/// Minimal percent-encoding for a single path segment. Driftbox paths are
/// POSIX-style and rarely carry characters outside `[A-Za-z0-9._-]`, so this
/// covers the practical cases without pulling in a dedicated crate.
fn urlencoding_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_plain_path() {
        assert_eq!(encode_path("/dir/hello world.txt"), "/dir/hello%20world.txt");
    }

    #[test]
    fn root_path_encodes_to_slash() {
        assert_eq!(encode_path("/"), "/");
    }
}
