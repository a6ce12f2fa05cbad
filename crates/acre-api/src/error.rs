//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Missing or invalid credentials. Rendered with a `WWW-Authenticate`
  /// challenge.
  #[error("unauthorized")]
  Unauthorized,

  /// Valid credentials for an account the farm has blocked.
  #[error("account is blocked")]
  Blocked,

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<acre_workflow::Error> for ApiError {
  fn from(err: acre_workflow::Error) -> Self {
    use acre_core::Error as Core;
    match err {
      acre_workflow::Error::Core(core) => match core {
        Core::WikiNotFound(_) | Core::RequestNotFound(_) => {
          ApiError::NotFound(core.to_string())
        }
        Core::InvalidDbname(_)
        | Core::WikiExists(_)
        | Core::DuplicateRequest(_)
        | Core::EmptyComment
        | Core::InvalidTransition { .. } => {
          ApiError::BadRequest(core.to_string())
        }
        Core::RequestLocked(_) => ApiError::Conflict(core.to_string()),
        Core::PermissionDenied(_) => ApiError::Forbidden(core.to_string()),
        Core::Serialization(_) => ApiError::Internal(Box::new(core)),
      },
      other => ApiError::Internal(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
      ApiError::Blocked => (StatusCode::FORBIDDEN, self.to_string()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Internal(e) => {
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };

    let mut response =
      (status, Json(json!({ "error": message }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static("Basic realm=\"acre\""),
      );
    }
    response
  }
}
