//! Session endpoints.
//!
//! Sessions are issued by email for approved accounts. Credential
//! verification is delegated to the identity layer in front of this
//! service; the session endpoint only binds a bearer token to an
//! approved principal.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::Principal;

#[derive(Deserialize)]
pub struct IssueSessionRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub principal: Principal,
}

/// `POST /api/auth/session` — issue a bearer token for an approved
/// account. Pending, rejected and suspended accounts are refused.
pub async fn issue_session(
    State(ctx): State<ApiContext>,
    Json(body): Json<IssueSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let principal = ctx
        .engine
        .find_by_email(&body.email)
        .map_err(ApiError::from)?
        .ok_or(ApiError::Unauthorized)?;

    if !principal.is_approved() {
        return Err(ApiError::Forbidden(
            "This account is not approved for sign-in".into(),
        ));
    }

    let token = {
        let mut sessions = ctx
            .sessions
            .lock()
            .map_err(|_| ApiError::Internal("session lock".into()))?;
        sessions.issue(principal.id)
    };

    tracing::info!(principal_id = %principal.id, role = principal.role.as_str(), "Session issued");
    Ok(Json(SessionResponse { token, principal }))
}

#[derive(Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

/// `DELETE /api/auth/session` — revoke the bearer token in the
/// Authorization header. Holding the token is the only credential
/// revocation needs; unknown tokens are a no-op.
pub async fn revoke_session(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
) -> Result<Json<RevokeResponse>, ApiError> {
    if let Some(token) = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        let mut sessions = ctx
            .sessions
            .lock()
            .map_err(|_| ApiError::Internal("session lock".into()))?;
        sessions.revoke(token);
    }
    Ok(Json(RevokeResponse { revoked: true }))
}

/// `GET /api/auth/me` — the authenticated principal.
pub async fn me(Extension(principal): Extension<Principal>) -> Json<Principal> {
    Json(principal)
}
