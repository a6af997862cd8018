use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::NotificationKind;

/// In-app notification, written by the outbox dispatcher only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub record_id: Option<Uuid>,
    pub correction_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Durable staging entry for a notification. Engine operations append
/// these in the same breath as the state mutation; the background
/// dispatcher turns them into notifications and external deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub record_id: Option<Uuid>,
    pub correction_id: Option<Uuid>,
    pub enqueued_at: DateTime<Utc>,
    pub dispatched: bool,
}

impl OutboxEntry {
    pub fn new(
        recipient_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            title: title.into(),
            message: message.into(),
            record_id: None,
            correction_id: None,
            enqueued_at: Utc::now(),
            dispatched: false,
        }
    }

    pub fn about_record(mut self, record_id: Uuid) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn about_correction(mut self, correction_id: Uuid) -> Self {
        self.correction_id = Some(correction_id);
        self
    }

    /// Materialize the in-app notification for this entry. The entry id
    /// is reused so a retried dispatch cannot write a duplicate.
    pub fn to_notification(&self) -> Notification {
        Notification {
            id: self.id,
            recipient_id: self.recipient_id,
            kind: self.kind.clone(),
            title: self.title.clone(),
            message: self.message.clone(),
            record_id: self.record_id,
            correction_id: self.correction_id,
            read: false,
            created_at: Utc::now(),
        }
    }
}
