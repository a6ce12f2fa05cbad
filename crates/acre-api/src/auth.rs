//! HTTP Basic-auth extractor resolving a capability-bearing [`Viewer`].

use acre_core::{
  request::{Capability, Viewer},
  store::FarmStore,
};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// One account accepted by this server instance.
#[derive(Clone, Deserialize)]
pub struct AuthUser {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  #[serde(default)]
  pub capabilities:  Vec<Capability>,
  /// A blocked account still authenticates but every request is refused.
  #[serde(default)]
  pub blocked:       bool,
}

/// Accounts accepted as valid for this server instance.
#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
  pub users: Vec<AuthUser>,
}

/// Present in a handler's arguments means the request carried valid
/// credentials; the wrapped [`Viewer`] drives every visibility check.
pub struct AuthViewer(pub Viewer);

/// Verify credentials directly from headers. Failures are uniform
/// `Unauthorized` so callers cannot distinguish unknown users from wrong
/// passwords; only a blocked account, proven by its own password, gets the
/// distinct refusal.
pub fn verify_auth(
  headers: &HeaderMap,
  config: &AuthConfig,
) -> Result<Viewer, ApiError> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds =
    std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) =
    creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  let user = config
    .users
    .iter()
    .find(|u| u.username == username)
    .ok_or(ApiError::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&user.password_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  if user.blocked {
    return Err(ApiError::Blocked);
  }

  Ok(Viewer::new(&user.username, user.capabilities.clone()))
}

impl<S> FromRequestParts<AppState<S>> for AuthViewer
where
  S: FarmStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_auth(&parts.headers, &state.auth).map(AuthViewer)
  }
}
