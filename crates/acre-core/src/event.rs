//! Lifecycle events and the notification seam.
//!
//! State changes are announced through a closed enum rather than named hook
//! strings, so an unrecognised event is unrepresentable and consumers match
//! exhaustively.

use serde::{Deserialize, Serialize};

/// A durable state change on a wiki, published after the change is persisted.
/// Consumers that need fresh data reload from canonical storage; the read
/// cache may lag briefly behind the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
  Created { dbname: String, private: bool },
  Deleted { dbname: String },
  Closed { dbname: String },
  Opened { dbname: String },
  MadePrivate { dbname: String },
  MadePublic { dbname: String },
}

impl LifecycleEvent {
  pub fn dbname(&self) -> &str {
    match self {
      Self::Created { dbname, .. }
      | Self::Deleted { dbname }
      | Self::Closed { dbname }
      | Self::Opened { dbname }
      | Self::MadePrivate { dbname }
      | Self::MadePublic { dbname } => dbname,
    }
  }
}

/// Receives lifecycle events after commit. Must not fail: a misbehaving
/// consumer cannot abort the operation that triggered the event.
pub trait EventSink: Send + Sync {
  fn publish(&self, event: LifecycleEvent);
}

// ─── Notifications ───────────────────────────────────────────────────────────

/// A user-facing message about request activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub recipient: String,
  pub subject:   String,
  pub body:      String,
}

/// Delivers notifications. Infallible for the same reason as [`EventSink`].
pub trait Notifier: Send + Sync {
  fn notify(&self, notification: Notification);
}
