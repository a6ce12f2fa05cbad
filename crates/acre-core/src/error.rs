//! Error types for `acre-core`.

use thiserror::Error;

use crate::request::RequestStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("wiki not found: {0}")]
  WikiNotFound(String),

  /// Also returned when a request exists but is not visible to the caller,
  /// so existence cannot be inferred from the error shape.
  #[error("request not found: {0}")]
  RequestNotFound(i64),

  #[error("invalid database name: {0:?}")]
  InvalidDbname(String),

  #[error("a wiki named {0:?} already exists")]
  WikiExists(String),

  #[error("an open request for {0:?} already exists")]
  DuplicateRequest(String),

  #[error("comment body is empty")]
  EmptyComment,

  #[error("cannot transition a request from {from} to {to}")]
  InvalidTransition {
    from: RequestStatus,
    to:   RequestStatus,
  },

  #[error("request {0} is locked")]
  RequestLocked(i64),

  #[error("permission denied: {0}")]
  PermissionDenied(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
