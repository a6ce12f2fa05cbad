//! Integration tests for `SqliteStore` against an in-memory database.

use acre_core::{
  request::{HistoryAction, NewRequest, RequestStatus, Visibility},
  store::{FarmStore, JobPayload, NewComment, NewHistoryEntry},
  wiki::{LifecycleState, NewWiki},
};
use chrono::Utc;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn request_for(dbname: &str) -> NewRequest {
  NewRequest {
    dbname:    dbname.to_owned(),
    sitename:  "Example Wiki".to_owned(),
    language:  "en".to_owned(),
    category:  "uncategorised".to_owned(),
    purpose:   None,
    reason:    "A wiki about examples.".to_owned(),
    requester: "alice".to_owned(),
    private:   false,
  }
}

// ─── Wikis ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_wiki() {
  let s = store().await;

  let wiki = s.insert_wiki(NewWiki::new("examplewiki", "Example")).await.unwrap();
  assert!(wiki.state.is_active());
  assert!(!wiki.private);

  let fetched = s.get_wiki("examplewiki").await.unwrap().unwrap();
  assert_eq!(fetched.dbname, "examplewiki");
  assert_eq!(fetched.sitename, "Example");
  assert_eq!(fetched.category, "uncategorised");
}

#[tokio::test]
async fn get_wiki_missing_returns_none() {
  let s = store().await;
  assert!(s.get_wiki("nosuchwiki").await.unwrap().is_none());
}

#[tokio::test]
async fn insert_duplicate_wiki_errors() {
  let s = store().await;
  s.insert_wiki(NewWiki::new("examplewiki", "Example")).await.unwrap();

  let err = s
    .insert_wiki(NewWiki::new("examplewiki", "Other"))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::WikiExists(_)));
}

#[tokio::test]
async fn update_wiki_persists_facets_and_extra() {
  let s = store().await;
  let mut wiki = s.insert_wiki(NewWiki::new("examplewiki", "Example")).await.unwrap();

  wiki.sitename = "Renamed Sitename".to_owned();
  wiki.private = true;
  wiki.state = LifecycleState::Closed { since: Utc::now() };
  wiki
    .extra
    .insert("default_skin".to_owned(), serde_json::json!("vector"));
  wiki
    .extra
    .insert("max_upload_mb".to_owned(), serde_json::json!(64));

  s.update_wiki(&wiki, vec![]).await.unwrap();

  let fetched = s.get_wiki("examplewiki").await.unwrap().unwrap();
  assert_eq!(fetched.sitename, "Renamed Sitename");
  assert!(fetched.private);
  assert!(matches!(fetched.state, LifecycleState::Closed { .. }));
  assert_eq!(fetched.extra["default_skin"], serde_json::json!("vector"));
  assert_eq!(fetched.extra["max_upload_mb"], serde_json::json!(64));
}

#[tokio::test]
async fn update_unknown_wiki_errors() {
  let s = store().await;
  let mut wiki = s.insert_wiki(NewWiki::new("examplewiki", "Example")).await.unwrap();
  wiki.dbname = "otherwiki".to_owned();

  let err = s.update_wiki(&wiki, vec![]).await.unwrap_err();
  assert!(matches!(err, crate::Error::WikiNotFound(_)));
}

#[tokio::test]
async fn list_wikis_includes_deleted() {
  let s = store().await;
  let mut wiki = s.insert_wiki(NewWiki::new("deadwiki", "Dead")).await.unwrap();
  s.insert_wiki(NewWiki::new("livewiki", "Live")).await.unwrap();

  wiki.state = LifecycleState::Deleted { since: Utc::now() };
  s.update_wiki(&wiki, vec![]).await.unwrap();

  let all = s.list_wikis().await.unwrap();
  assert_eq!(all.len(), 2);
}

// ─── Requests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_request_starts_pending_with_history() {
  let s = store().await;
  let req = s.insert_request(request_for("examplewiki")).await.unwrap();

  assert_eq!(req.status, RequestStatus::Pending);
  assert_eq!(req.visibility, Visibility::Public);

  let history = s.history(req.id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].action, HistoryAction::Submitted);
  assert_eq!(history[0].actor, "alice");
}

#[tokio::test]
async fn duplicate_inflight_request_rejected() {
  let s = store().await;
  s.insert_request(request_for("examplewiki")).await.unwrap();

  let err = s.insert_request(request_for("examplewiki")).await.unwrap_err();
  assert!(matches!(err, crate::Error::DuplicateRequest(_)));
}

#[tokio::test]
async fn resubmission_allowed_after_decline() {
  let s = store().await;
  let mut req = s.insert_request(request_for("examplewiki")).await.unwrap();

  req.status = RequestStatus::Declined;
  s.update_request(
    &req,
    Some(NewHistoryEntry {
      request_id: req.id,
      actor:      "rev".to_owned(),
      action:     HistoryAction::Transition {
        from: RequestStatus::Pending,
        to:   RequestStatus::Declined,
      },
      reason:     Some("not needed".to_owned()),
    }),
    None,
  )
  .await
  .unwrap();

  // The in-flight index no longer covers the declined row.
  let second = s.insert_request(request_for("examplewiki")).await.unwrap();
  assert_eq!(second.status, RequestStatus::Pending);
}

#[tokio::test]
async fn requests_by_requester_newest_first() {
  let s = store().await;
  let first = s.insert_request(request_for("firstwiki")).await.unwrap();
  let second = s.insert_request(request_for("secondwiki")).await.unwrap();

  let mine = s.requests_by_requester("alice").await.unwrap();
  assert_eq!(mine.len(), 2);
  assert_eq!(mine[0].id, second.id);
  assert_eq!(mine[1].id, first.id);

  assert!(s.requests_by_requester("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_request_appends_history_and_outbox_job() {
  let s = store().await;
  let mut req = s.insert_request(request_for("examplewiki")).await.unwrap();

  req.status = RequestStatus::Approved;
  let payload = JobPayload::ProvisionWiki {
    request_id: req.id,
    dbname:     req.dbname.clone(),
    sitename:   req.sitename.clone(),
    language:   req.language.clone(),
    category:   req.category.clone(),
    private:    false,
    requester:  req.requester.clone(),
    approver:   "rev".to_owned(),
    reason:     "looks good".to_owned(),
  };

  s.update_request(
    &req,
    Some(NewHistoryEntry {
      request_id: req.id,
      actor:      "rev".to_owned(),
      action:     HistoryAction::Transition {
        from: RequestStatus::Pending,
        to:   RequestStatus::Approved,
      },
      reason:     None,
    }),
    Some(payload.clone()),
  )
  .await
  .unwrap();

  let history = s.history(req.id).await.unwrap();
  assert_eq!(history.len(), 2);

  // The approval and its job landed together.
  let job = s.claim_job().await.unwrap().unwrap();
  assert_eq!(job.payload, payload);
  assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn request_extra_map_roundtrips() {
  let s = store().await;
  let mut req = s.insert_request(request_for("examplewiki")).await.unwrap();
  assert!(req.extra.is_empty());

  req
    .extra
    .insert("source".to_owned(), serde_json::json!("import"));
  req.extra.insert("priority".to_owned(), serde_json::json!(3));
  req.extra.insert("draft".to_owned(), serde_json::json!(false));
  s.update_request(&req, None, None).await.unwrap();

  let fetched = s.get_request(req.id).await.unwrap().unwrap();
  assert_eq!(fetched.extra, req.extra);
}

// ─── Comments ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn comments_append_in_order() {
  let s = store().await;
  let req = s.insert_request(request_for("examplewiki")).await.unwrap();

  for body in ["first", "second"] {
    s.insert_comment(NewComment {
      request_id: req.id,
      author:     "rev".to_owned(),
      body:       body.to_owned(),
      visibility: Visibility::Public,
    })
    .await
    .unwrap();
  }

  let comments = s.comments(req.id).await.unwrap();
  assert_eq!(comments.len(), 2);
  assert_eq!(comments[0].body, "first");
  assert_eq!(comments[1].body, "second");
}

// ─── Job outbox ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn claim_on_empty_outbox_returns_none() {
  let s = store().await;
  assert!(s.claim_job().await.unwrap().is_none());
}

#[tokio::test]
async fn finished_job_is_not_redelivered() {
  let s = store().await;
  let wiki = s.insert_wiki(NewWiki::new("examplewiki", "Example")).await.unwrap();

  s.update_wiki(
    &wiki,
    vec![JobPayload::SetContainerAccess {
      dbname:  "examplewiki".to_owned(),
      private: true,
    }],
  )
  .await
  .unwrap();

  let job = s.claim_job().await.unwrap().unwrap();
  s.finish_job(job.id).await.unwrap();

  assert!(s.claim_job().await.unwrap().is_none());
}

#[tokio::test]
async fn jobs_claimed_oldest_first() {
  let s = store().await;
  let wiki = s.insert_wiki(NewWiki::new("examplewiki", "Example")).await.unwrap();

  s.update_wiki(
    &wiki,
    vec![
      JobPayload::SetContainerAccess {
        dbname:  "examplewiki".to_owned(),
        private: true,
      },
      JobPayload::SetContainerAccess {
        dbname:  "examplewiki".to_owned(),
        private: false,
      },
    ],
  )
  .await
  .unwrap();

  let first = s.claim_job().await.unwrap().unwrap();
  s.finish_job(first.id).await.unwrap();
  let second = s.claim_job().await.unwrap().unwrap();

  assert!(matches!(
    first.payload,
    JobPayload::SetContainerAccess { private: true, .. }
  ));
  assert!(matches!(
    second.payload,
    JobPayload::SetContainerAccess { private: false, .. }
  ));
}
