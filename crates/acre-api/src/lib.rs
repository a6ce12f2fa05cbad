//! JSON REST API for Acre.
//!
//! Exposes an axum [`Router`] backed by any [`acre_core::store::FarmStore`],
//! with HTTP Basic auth resolving each caller to a capability-bearing
//! [`acre_core::request::Viewer`]. Every read path goes through the
//! workflow's visibility filter, so an invisible request and an absent one
//! are both a plain 404.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .merge(acre_api::api_router(state))
//! ```

pub mod auth;
pub mod error;
pub mod requests;

use std::sync::Arc;

use acre_core::store::FarmStore;
use acre_workflow::RequestWorkflow;
use axum::{
  Router,
  routing::{get, post},
};

pub use auth::{AuthConfig, AuthUser, AuthViewer};
pub use error::ApiError;

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub workflow: RequestWorkflow<S>,
  pub auth:     Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      workflow: self.workflow.clone(),
      auth:     Arc::clone(&self.auth),
    }
  }
}

/// Build a fully-materialised API router for `state`.
pub fn api_router<S>(state: AppState<S>) -> Router
where
  S: FarmStore + 'static,
{
  Router::new()
    .route("/wiki_request/{id}", get(requests::get_one::<S>))
    .route("/wiki_request/{id}/comment", post(requests::comment::<S>))
    .route("/wiki_requests/user/{username}", get(requests::by_user::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use super::*;
  use acre_core::{
    event::Notifier,
    request::{Capability, NewRequest, Viewer, Visibility},
  };
  use acre_store_sqlite::SqliteStore;
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use rand_core::OsRng;
  use tower::ServiceExt as _;

  struct NullNotifier;
  impl Notifier for NullNotifier {
    fn notify(&self, _: acre_core::event::Notification) {}
  }

  fn phc(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string()
  }

  async fn make_state(password: &str) -> AppState<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let hash = phc(password);
    let user = |name: &str, caps: Vec<Capability>, blocked| AuthUser {
      username:      name.to_string(),
      password_hash: hash.clone(),
      capabilities:  caps,
      blocked,
    };

    AppState {
      workflow: RequestWorkflow::new(store, Arc::new(NullNotifier)),
      auth:     Arc::new(AuthConfig {
        users: vec![
          user("rev", vec![Capability::Review], false),
          user("alice", vec![], false),
          user("bob", vec![], false),
          user("mallory", vec![Capability::Review], true),
        ],
      }),
    }
  }

  async fn submit(state: &AppState<SqliteStore>) -> i64 {
    state
      .workflow
      .submit(NewRequest {
        dbname:    "examplewiki".to_string(),
        sitename:  "Example Wiki".to_string(),
        language:  "en".to_string(),
        category:  "uncategorised".to_string(),
        purpose:   None,
        reason:    "A wiki about examples.".to_string(),
        requester: "alice".to_string(),
        private:   false,
      })
      .await
      .unwrap()
      .id
  }

  fn auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  async fn oneshot(
    state: AppState<SqliteStore>,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: &str,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
      builder = builder.header(header::AUTHORIZATION, auth);
    }
    if !body.is_empty() {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    api_router(state).oneshot(req).await.unwrap()
  }

  async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes =
      axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn unauthenticated_requests_return_401_with_challenge() {
    let state = make_state("secret").await;
    let id = submit(&state).await;
    let resp =
      oneshot(state, "GET", &format!("/wiki_request/{id}"), None, "").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenge =
      resp.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.starts_with("Basic"));
  }

  #[tokio::test]
  async fn blocked_user_returns_403() {
    let state = make_state("secret").await;
    let id = submit(&state).await;
    let auth = auth_header("mallory", "secret");
    let resp = oneshot(
      state,
      "GET",
      &format!("/wiki_request/{id}"),
      Some(&auth),
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn get_request_returns_full_view() {
    let state = make_state("secret").await;
    let id = submit(&state).await;
    let auth = auth_header("rev", "secret");
    let resp = oneshot(
      state,
      "GET",
      &format!("/wiki_request/{id}"),
      Some(&auth),
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["request"]["id"], serde_json::json!(id));
    assert_eq!(body["request"]["dbname"], serde_json::json!("examplewiki"));
    assert!(body["comments"].as_array().unwrap().is_empty());
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn unknown_request_returns_404() {
    let state = make_state("secret").await;
    let auth = auth_header("rev", "secret");
    let resp =
      oneshot(state, "GET", "/wiki_request/999", Some(&auth), "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn suppressed_request_reads_as_404_for_plain_reviewer() {
    let state = make_state("secret").await;
    let id = submit(&state).await;
    let oversight =
      Viewer::new("os", vec![Capability::Review, Capability::Suppress]);
    state
      .workflow
      .set_visibility(id, Visibility::Suppressed, &oversight)
      .await
      .unwrap();

    let auth = auth_header("rev", "secret");
    let resp = oneshot(
      state,
      "GET",
      &format!("/wiki_request/{id}"),
      Some(&auth),
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn restricted_request_hidden_from_unrelated_user() {
    let state = make_state("secret").await;
    let id = submit(&state).await;
    let reviewer = Viewer::new("rev", vec![Capability::Review]);
    state
      .workflow
      .set_visibility(id, Visibility::Restricted, &reviewer)
      .await
      .unwrap();

    let auth = auth_header("bob", "secret");
    let resp = oneshot(
      state,
      "GET",
      &format!("/wiki_request/{id}"),
      Some(&auth),
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn comment_returns_204_and_appears_in_view() {
    let state = make_state("secret").await;
    let id = submit(&state).await;
    let auth = auth_header("rev", "secret");
    let resp = oneshot(
      state.clone(),
      "POST",
      &format!("/wiki_request/{id}/comment"),
      Some(&auth),
      r#"{"comment":"Looks reasonable."}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = oneshot(
      state,
      "GET",
      &format!("/wiki_request/{id}"),
      Some(&auth),
      "",
    )
    .await;
    let body = json_body(resp).await;
    let comments = body["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["body"], serde_json::json!("Looks reasonable."));
    assert_eq!(comments[0]["author"], serde_json::json!("rev"));
  }

  #[tokio::test]
  async fn empty_comment_returns_400() {
    let state = make_state("secret").await;
    let id = submit(&state).await;
    let auth = auth_header("rev", "secret");
    let resp = oneshot(
      state,
      "POST",
      &format!("/wiki_request/{id}/comment"),
      Some(&auth),
      r#"{"comment":"   "}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn unrelated_user_cannot_comment() {
    let state = make_state("secret").await;
    let id = submit(&state).await;
    let auth = auth_header("bob", "secret");
    let resp = oneshot(
      state,
      "POST",
      &format!("/wiki_request/{id}/comment"),
      Some(&auth),
      r#"{"comment":"drive-by"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn user_listing_returns_requests_or_404() {
    let state = make_state("secret").await;
    let id = submit(&state).await;
    let auth = auth_header("rev", "secret");

    let resp = oneshot(
      state.clone(),
      "GET",
      "/wiki_requests/user/alice",
      Some(&auth),
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body[0]["id"], serde_json::json!(id));

    let resp = oneshot(
      state,
      "GET",
      "/wiki_requests/user/nobody",
      Some(&auth),
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }
}
