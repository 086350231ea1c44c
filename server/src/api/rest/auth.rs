//! Authentication endpoints: password login and refresh. Grounded on the
//! teacher's `api/rest/auth.rs` login/refresh_token handlers; self-registration
//! is dropped (accounts are provisioned out-of-band via the `user create` CLI
//! command, see `main.rs`), and the OIDC device-code flow the teacher's
//! handlers alluded to is out of scope entirely — see DESIGN.md.

use crate::api::rest::error::AppError;
use crate::api::AppState;
use crate::auth;
use crate::db;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

/// `POST /api/v1/auth/token` — exchange a username/password for a token pair.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = db::users::get_user_by_username(&state.db, &req.username)
        .await?
        .ok_or_else(|| AppError::Unauthorized("invalid username or password".into()))?;

    let valid = auth::verify_password(&req.password, &user.password_hash)?;
    if !valid {
        return Err(AppError::Unauthorized("invalid username or password".into()));
    }

    let access_token = auth::create_access_token(&state.config.jwt_secret, user.id)?;
    let refresh_token = auth::create_refresh_token(&state.config.jwt_secret, user.id)?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `POST /api/v1/auth/refresh` — exchange a refresh token for a fresh access token.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user_id = auth::verify_refresh_token(&state.config.jwt_secret, &req.refresh_token)
        .map_err(|_| AppError::Unauthorized("invalid or expired refresh token".into()))?;

    // The refresh token itself is re-issued: this server holds no server-side
    // session/revocation list, so "rotation" would require one, and the spec
    // doesn't call for it.
    let access_token = auth::create_access_token(&state.config.jwt_secret, user_id)?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token: req.refresh_token,
        token_type: "Bearer",
    }))
}

/// `DELETE /api/v1/auth/token` — client-side logout. Tokens are stateless JWTs
/// with no server-side session table, so there is nothing to revoke server-side;
/// this endpoint exists so a client has a well-defined call to make and simply
/// validates the token it's discarding before confirming.
pub async fn revoke(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<axum::http::StatusCode, AppError> {
    let _user_id = crate::api::rest::error::extract_user_id(&state, &headers)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
