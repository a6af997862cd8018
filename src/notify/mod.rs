//! External notification channel.
//!
//! The engine never talks to this directly: operations append outbox
//! entries, and the background dispatcher hands each entry to the
//! configured `Notifier` alongside writing the in-app notification.
//! Delivery is one-way; a failed delivery is logged and retried on the
//! next dispatch tick.

#[cfg(test)]
use std::sync::Mutex;

use thiserror::Error;

use crate::models::OutboxEntry;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// One-way delivery of a notification to its recipient over an
/// external channel (email, SMS, push).
pub trait Notifier: Send + Sync {
    fn deliver(&self, entry: &OutboxEntry) -> Result<(), NotifyError>;
}

/// Default channel: writes deliveries to the log. Stands in for a real
/// email or push integration.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, entry: &OutboxEntry) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %entry.recipient_id,
            kind = entry.kind.as_str(),
            "Delivering notification: {}",
            entry.title
        );
        Ok(())
    }
}

/// Test double: records every delivery and can be switched to fail.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<OutboxEntry>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered_kinds(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.kind.as_str().to_string())
            .collect()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn deliver(&self, entry: &OutboxEntry) -> Result<(), NotifyError> {
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(NotifyError::Delivery("channel down".into()));
        }
        self.delivered.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
