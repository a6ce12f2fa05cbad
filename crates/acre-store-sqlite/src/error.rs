//! Error type for `acre-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] acre_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unreadable column value: {0}")]
  Decode(String),

  /// The target dbname already has a wiki row.
  #[error("a wiki named {0:?} already exists")]
  WikiExists(String),

  /// The in-flight unique index rejected a second open request.
  #[error("an open request for {0:?} already exists")]
  DuplicateRequest(String),

  #[error("wiki not found: {0}")]
  WikiNotFound(String),

  #[error("request not found: {0}")]
  RequestNotFound(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
