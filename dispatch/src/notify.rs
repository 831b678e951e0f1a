//! User-facing notifications emitted on lifecycle transitions.
//!
//! The reducer builds a [`Notification`] for every transition and hands it
//! to the injected [`NotificationSink`]. Production wires a sink that logs
//! structured events; tests wire [`RecordingSink`] and assert on content.

use crate::error::DispatchError;
use crate::types::ServiceKind;
use serde::{Deserialize, Serialize};

/// How prominently a notification should be surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A requested action went through
    Success,
    /// Informational state change
    Info,
    /// Something the actor asked for did not happen
    Warning,
    /// Something is broken
    Error,
}

/// A user-facing notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Short headline
    pub title: String,
    /// Full sentence describing what happened
    pub message: String,
    /// Display severity
    pub severity: Severity,
}

impl Notification {
    /// A new request was submitted
    #[must_use]
    pub fn request_created(kind: ServiceKind) -> Self {
        Self {
            title: "Service Request Created".to_string(),
            message: format!(
                "Your {kind} request has been submitted and providers are being notified."
            ),
            severity: Severity::Success,
        }
    }

    /// A provider accepted the request
    #[must_use]
    pub fn request_accepted(eta_minutes: u32) -> Self {
        Self {
            title: "Request Accepted".to_string(),
            message: format!(
                "A service provider has accepted your request and will arrive in approximately {eta_minutes} minutes."
            ),
            severity: Severity::Success,
        }
    }

    /// The provider started working on site
    #[must_use]
    pub fn service_in_progress() -> Self {
        Self {
            title: "Service In Progress".to_string(),
            message: "The service provider has started working on your request.".to_string(),
            severity: Severity::Info,
        }
    }

    /// The request was completed
    #[must_use]
    pub fn request_completed() -> Self {
        Self {
            title: "Service Completed".to_string(),
            message: "Your service request has been completed. Thank you for using Roadcall!"
                .to_string(),
            severity: Severity::Success,
        }
    }

    /// The request was cancelled
    #[must_use]
    pub fn request_cancelled() -> Self {
        Self {
            title: "Request Cancelled".to_string(),
            message: "Your service request has been cancelled.".to_string(),
            severity: Severity::Info,
        }
    }

    /// A command was rejected
    #[must_use]
    pub fn command_failed(error: &DispatchError) -> Self {
        Self {
            title: "Request Failed".to_string(),
            message: error.to_string(),
            severity: Severity::Warning,
        }
    }
}

/// Destination for user-facing notifications
///
/// Injected through the environment so the reducer never knows whether it
/// is talking to a log, a push channel, or a test recorder.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification
    fn notify(&self, notification: Notification);
}

/// Sink that emits notifications as structured log events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Success | Severity::Info => tracing::info!(
                title = %notification.title,
                severity = ?notification.severity,
                "{}",
                notification.message
            ),
            Severity::Warning => tracing::warn!(
                title = %notification.title,
                "{}",
                notification.message
            ),
            Severity::Error => tracing::error!(
                title = %notification.title,
                "{}",
                notification.message
            ),
        }
    }
}

/// Sink that records notifications in memory for assertions
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: std::sync::Mutex<Vec<Notification>>,
}

impl RecordingSink {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications delivered so far, in order
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        if let Ok(mut guard) = self.delivered.lock() {
            guard.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_message_names_the_service_kind() {
        let n = Notification::request_created(ServiceKind::Towing);
        assert_eq!(n.title, "Service Request Created");
        assert!(n.message.contains("towing"));
        assert_eq!(n.severity, Severity::Success);
    }

    #[test]
    fn accepted_message_carries_the_eta() {
        let n = Notification::request_accepted(17);
        assert!(n.message.contains("approximately 17 minutes"));
    }

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingSink::new();
        sink.notify(Notification::request_created(ServiceKind::Fuel));
        sink.notify(Notification::request_cancelled());

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].title, "Service Request Created");
        assert_eq!(delivered[1].title, "Request Cancelled");
    }
}
