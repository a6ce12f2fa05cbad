//! Default event-sink and notifier implementations.
//!
//! The farm's real consumers (notification subsystems, per-wiki module
//! providers) live outside this service; in-process we log through `tracing`
//! and let operators wire richer sinks at startup.

use acre_core::event::{EventSink, LifecycleEvent, Notification, Notifier};

/// Publishes lifecycle events as structured log lines.
pub struct TracingSink;

impl EventSink for TracingSink {
  fn publish(&self, event: LifecycleEvent) {
    tracing::info!(dbname = event.dbname(), ?event, "lifecycle event");
  }
}

/// Delivers notifications as structured log lines.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(&self, notification: Notification) {
    tracing::info!(
      recipient = %notification.recipient,
      subject = %notification.subject,
      "notification"
    );
  }
}
