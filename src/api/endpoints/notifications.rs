//! Notification endpoints.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{Notification, Principal};

#[derive(Deserialize)]
pub struct NotificationListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub total: usize,
}

/// `GET /api/notifications?unread_only=` — the caller's inbox,
/// newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let notifications = ctx
        .engine
        .list_notifications(&principal, query.unread_only)?;
    let total = notifications.len();
    Ok(Json(NotificationListResponse {
        notifications,
        total,
    }))
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: usize,
}

/// `GET /api/notifications/unread-count` — badge counter.
pub async fn unread_count(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread = ctx.engine.unread_count(&principal)?;
    Ok(Json(UnreadCountResponse { unread }))
}

/// `POST /api/notifications/:id/read` — mark one notification read.
pub async fn mark_read(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(notification_id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let notification_id = Uuid::parse_str(&notification_id)
        .map_err(|e| ApiError::Validation(format!("Invalid notification id: {e}")))?;
    let notification = ctx.engine.mark_read(&principal, notification_id)?;
    Ok(Json(notification))
}

#[derive(Serialize)]
pub struct MarkAllResponse {
    pub marked: usize,
}

/// `POST /api/notifications/read-all` — mark the whole inbox read.
pub async fn mark_all_read(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<MarkAllResponse>, ApiError> {
    let marked = ctx.engine.mark_all_read(&principal)?;
    Ok(Json(MarkAllResponse { marked }))
}
