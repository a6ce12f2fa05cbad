//! Handlers for the wiki-request endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/wiki_request/:id` | Record + comments + history; 404 covers invisible |
//! | `POST` | `/wiki_request/:id/comment` | Body: `{"comment":"…"}`, 204 on success |
//! | `GET`  | `/wiki_requests/user/:username` | Visible requests, newest first |

use acre_core::request::{RequestView, WikiRequestRecord};
use acre_core::store::FarmStore;
use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use serde::Deserialize;

use crate::{AppState, auth::AuthViewer, error::ApiError};

/// `GET /wiki_request/:id`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  AuthViewer(viewer): AuthViewer,
  Path(id): Path<i64>,
) -> Result<Json<RequestView>, ApiError>
where
  S: FarmStore + 'static,
{
  let view = state.workflow.load_visible(id, &viewer).await?;
  Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
  pub comment: String,
  /// Additional usernames to notify besides the requester.
  #[serde(default)]
  pub notify:  Vec<String>,
}

/// `POST /wiki_request/:id/comment` — body: `{"comment":"…"}`
pub async fn comment<S>(
  State(state): State<AppState<S>>,
  AuthViewer(viewer): AuthViewer,
  Path(id): Path<i64>,
  Json(body): Json<CommentBody>,
) -> Result<StatusCode, ApiError>
where
  S: FarmStore + 'static,
{
  state
    .workflow
    .add_comment(id, &viewer, &body.comment, body.notify)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /wiki_requests/user/:username`
///
/// 404 when nothing is visible, whether or not the user exists — listings
/// must not confirm user enumeration either way.
pub async fn by_user<S>(
  State(state): State<AppState<S>>,
  AuthViewer(viewer): AuthViewer,
  Path(username): Path<String>,
) -> Result<Json<Vec<WikiRequestRecord>>, ApiError>
where
  S: FarmStore + 'static,
{
  let records =
    state.workflow.visible_requests_by(&username, &viewer).await?;
  if records.is_empty() {
    return Err(ApiError::NotFound(format!(
      "no visible requests by {username}"
    )));
  }
  Ok(Json(records))
}
