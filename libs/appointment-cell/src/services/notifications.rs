use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use shared_models::EntityId;

const CHANNEL_CAPACITY: usize = 256;
const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmed,
    PaymentFailed,
    AppointmentPaid,
    AppointmentCompleted,
    AppointmentCancelled,
    InvoiceIssued,
    ConflictDetected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingConfirmed => "booking_confirmed",
            NotificationKind::PaymentFailed => "payment_failed",
            NotificationKind::AppointmentPaid => "appointment_paid",
            NotificationKind::AppointmentCompleted => "appointment_completed",
            NotificationKind::AppointmentCancelled => "appointment_cancelled",
            NotificationKind::InvoiceIssued => "invoice_issued",
            NotificationKind::ConflictDetected => "conflict_detected",
        }
    }

    /// Dedupe key for an event about one appointment.
    pub fn key_for(&self, appointment_id: EntityId) -> String {
        format!("{}:{}", self.as_str(), appointment_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub dedupe_key: String,
    pub created_at: DateTime<Utc>,
}

/// Delivery target for operator notifications. Delivery is fire-and-forget: a sink
/// must not block and has no way to fail the caller.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification);
}

pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, notification: &Notification) {
        info!("[{}] {}", notification.kind.as_str(), notification.message);
    }
}

/// Session-owned notification hub: drops repeats of the same dedupe key, fans events out
/// to sinks and broadcast subscribers, and keeps a short history.
pub struct NotificationCenter {
    seen: Mutex<HashSet<String>>,
    history: Mutex<VecDeque<Notification>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    sender: broadcast::Sender<Notification>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            seen: Mutex::new(HashSet::new()),
            history: Mutex::new(VecDeque::new()),
            sinks: vec![Arc::new(TracingSink)],
            sender,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Emit unless `dedupe_key` was already used this session. Returns whether it was emitted.
    pub fn notify(&self, kind: NotificationKind, message: impl Into<String>, dedupe_key: impl Into<String>) -> bool {
        let dedupe_key = dedupe_key.into();
        if !self
            .seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(dedupe_key.clone())
        {
            debug!("Notification {} already sent, skipping", dedupe_key);
            return false;
        }

        let notification = Notification {
            kind,
            message: message.into(),
            dedupe_key,
            created_at: Utc::now(),
        };

        for sink in &self.sinks {
            sink.deliver(&notification);
        }

        {
            let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }

        // No subscribers is fine.
        let _ = self.sender.send(notification);
        true
    }

    pub fn notify_appointment(&self, kind: NotificationKind, appointment_id: EntityId, message: impl Into<String>) -> bool {
        self.notify(kind, message, kind.key_for(appointment_id))
    }

    /// Most recent notifications, oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        self.history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn reset(&self) {
        self.seen.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.history.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSink(Mutex<usize>);

    impl NotificationSink for CountingSink {
        fn deliver(&self, _notification: &Notification) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_same_kind_and_appointment_is_sent_once() {
        let sink = Arc::new(CountingSink(Mutex::new(0)));
        let center = NotificationCenter::new().with_sink(sink.clone());

        assert!(center.notify_appointment(NotificationKind::AppointmentPaid, 5, "Cita 5 pagada"));
        assert!(!center.notify_appointment(NotificationKind::AppointmentPaid, 5, "Cita 5 pagada"));
        assert!(center.notify_appointment(NotificationKind::AppointmentCompleted, 5, "Cita 5 completada"));
        assert!(center.notify_appointment(NotificationKind::AppointmentPaid, 6, "Cita 6 pagada"));

        assert_eq!(*sink.0.lock().unwrap(), 3);
        assert_eq!(center.recent().len(), 3);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let center = NotificationCenter::new();
        let mut rx = center.subscribe();

        center.notify(NotificationKind::ConflictDetected, "Slot taken", "conflict:7:2025-01-15T10:00");

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::ConflictDetected);
        assert_eq!(received.message, "Slot taken");
    }

    #[test]
    fn test_reset_forgets_dedupe_keys() {
        let center = NotificationCenter::new();
        center.notify_appointment(NotificationKind::InvoiceIssued, 1, "issued");
        center.reset();
        assert!(center.recent().is_empty());
        assert!(center.notify_appointment(NotificationKind::InvoiceIssued, 1, "issued"));
    }
}
