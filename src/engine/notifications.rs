//! Notification reads and the outbox dispatcher.
//!
//! Engine operations never deliver anything themselves; they append
//! outbox entries. The `Dispatcher` drains the outbox on a timer:
//! each entry becomes an in-app notification (keyed by the entry id,
//! so redelivery cannot duplicate it) and one external delivery. An
//! entry is marked dispatched only after its delivery succeeded;
//! until then it stays queued and is retried on the next tick.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config;
use crate::models::{Notification, OutboxEntry, Principal};
use crate::notify::Notifier;
use crate::store::{collections, encode, DocumentStore, Filter, StoreError};

use super::error::EngineError;
use super::Engine;

impl Engine {
    /// Notifications addressed to the acting principal, newest first.
    pub fn list_notifications(
        &self,
        principal: &Principal,
        unread_only: bool,
    ) -> Result<Vec<Notification>, EngineError> {
        let mut filter = Filter::new()
            .eq("recipient_id", principal.id)
            .order_desc("created_at");
        if unread_only {
            filter = filter.eq("read", false);
        }
        self.store
            .query(collections::NOTIFICATIONS, &filter)?
            .iter()
            .map(|doc| doc.parse::<Notification>().map_err(Into::into))
            .collect()
    }

    pub fn unread_count(&self, principal: &Principal) -> Result<usize, EngineError> {
        Ok(self.list_notifications(principal, true)?.len())
    }

    /// Mark one notification read. Someone else's notification is
    /// reported as missing, not as forbidden. Already-read is a no-op.
    pub fn mark_read(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<Notification, EngineError> {
        let missing = || EngineError::NotFound(format!("Notification {id} not found"));
        let doc = self
            .store
            .get(collections::NOTIFICATIONS, id)?
            .ok_or_else(missing)?;
        let mut notification: Notification = doc.parse()?;
        if notification.recipient_id != principal.id {
            return Err(missing());
        }
        if notification.read {
            return Ok(notification);
        }

        notification.read = true;
        self.store.update(
            collections::NOTIFICATIONS,
            notification.id,
            encode(&notification)?,
            Some(doc.version),
        )?;
        Ok(notification)
    }

    /// Mark everything unread as read. Returns how many were touched.
    pub fn mark_all_read(&self, principal: &Principal) -> Result<usize, EngineError> {
        let unread = self.store.query(
            collections::NOTIFICATIONS,
            &Filter::new().eq("recipient_id", principal.id).eq("read", false),
        )?;
        for doc in &unread {
            let mut notification: Notification = doc.parse()?;
            notification.read = true;
            self.store.update(
                collections::NOTIFICATIONS,
                notification.id,
                encode(&notification)?,
                Some(doc.version),
            )?;
        }
        Ok(unread.len())
    }
}

/// Background worker that turns outbox entries into in-app
/// notifications and external deliveries.
pub struct Dispatcher {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// One dispatch tick. Processes queued entries oldest first and
    /// returns how many completed. A failed external delivery leaves
    /// its entry queued; the in-app notification may already exist by
    /// then, and the shared id makes the redelivery insert a no-op.
    pub fn dispatch_pending(&self) -> Result<usize, EngineError> {
        let queued = self.store.query(
            collections::OUTBOX,
            &Filter::new().eq("dispatched", false).order_asc("enqueued_at"),
        )?;

        let mut dispatched = 0;
        for doc in queued {
            let entry: OutboxEntry = doc.parse()?;

            let notification = entry.to_notification();
            match self.store.insert(
                collections::NOTIFICATIONS,
                notification.id,
                encode(&notification)?,
            ) {
                Ok(_) | Err(StoreError::UniqueViolation { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            if let Err(e) = self.notifier.deliver(&entry) {
                tracing::warn!(
                    entry_id = %entry.id,
                    recipient = %entry.recipient_id,
                    "Notification delivery failed, will retry: {e}"
                );
                continue;
            }

            let mut done = entry;
            done.dispatched = true;
            self.store.update(
                collections::OUTBOX,
                done.id,
                encode(&done)?,
                Some(doc.version),
            )?;
            dispatched += 1;
        }

        if dispatched > 0 {
            tracing::info!(count = dispatched, "Dispatched notifications");
        }
        Ok(dispatched)
    }

    /// Retention sweep: drops read notifications and dispatched outbox
    /// entries older than the retention window. Unread notifications
    /// and queued entries are never pruned.
    pub fn prune(&self) -> Result<usize, EngineError> {
        let cutoff = Utc::now() - Duration::days(config::NOTIFICATION_RETENTION_DAYS);
        let mut removed = 0;

        for doc in self
            .store
            .query(collections::NOTIFICATIONS, &Filter::new().eq("read", true))?
        {
            let notification: Notification = doc.parse()?;
            if notification.created_at < cutoff {
                self.store.delete(collections::NOTIFICATIONS, notification.id)?;
                removed += 1;
            }
        }

        for doc in self
            .store
            .query(collections::OUTBOX, &Filter::new().eq("dispatched", true))?
        {
            let entry: OutboxEntry = doc.parse()?;
            if entry.enqueued_at < cutoff {
                self.store.delete(collections::OUTBOX, entry.id)?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(count = removed, "Pruned old notifications");
        }
        Ok(removed)
    }
}
