//! The `FarmStore` and `Provisioner` traits and supporting types.
//!
//! `FarmStore` is implemented by storage backends (e.g. `acre-store-sqlite`).
//! Higher layers (`acre-workflow`, `acre-api`) depend on these abstractions,
//! not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  request::{
    HistoryAction, HistoryEntry, NewRequest, RequestComment, Visibility,
    WikiRequestRecord,
  },
  wiki::{NewWiki, WikiRecord},
};

// ─── Job outbox ──────────────────────────────────────────────────────────────

/// Work handed to the background runner. Payloads are written to the store in
/// the same transaction as the change that requires them, so a crash cannot
/// leave a committed change without its job (or vice versa).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobPayload {
  /// Create the wiki a request was approved for. Carries everything needed
  /// to build the record, so the runner never depends on request state that
  /// may have moved on.
  ProvisionWiki {
    request_id: i64,
    dbname:     String,
    sitename:   String,
    language:   String,
    category:   String,
    private:    bool,
    requester:  String,
    approver:   String,
    reason:     String,
  },
  /// Toggle storage-container access after a private/public flip.
  SetContainerAccess { dbname: String, private: bool },
}

/// A claimed outbox row. `attempts` counts deliveries — the queue is
/// at-least-once, so handlers must tolerate replays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRow {
  pub id:          Uuid,
  pub payload:     JobPayload,
  pub enqueued_at: DateTime<Utc>,
  pub attempts:    i64,
}

// ─── Write inputs ────────────────────────────────────────────────────────────

/// Input for appending a comment. The id and timestamp are store-assigned.
#[derive(Debug, Clone)]
pub struct NewComment {
  pub request_id: i64,
  pub author:     String,
  pub body:       String,
  pub visibility: Visibility,
}

/// Input for appending a history entry. The id and timestamp are
/// store-assigned.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
  pub request_id: i64,
  pub actor:      String,
  pub action:     HistoryAction,
  pub reason:     Option<String>,
}

// ─── FarmStore ───────────────────────────────────────────────────────────────

/// Abstraction over the farm's central storage domain.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (tokio with `axum`).
pub trait FarmStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Wikis ─────────────────────────────────────────────────────────────

  /// Persist a new wiki record. Fails if the dbname is already taken.
  /// The creation timestamp and initial `Active` state are store-assigned.
  fn insert_wiki(
    &self,
    input: NewWiki,
  ) -> impl Future<Output = Result<WikiRecord, Self::Error>> + Send + '_;

  /// Retrieve a wiki by dbname. Returns `None` if no row exists.
  fn get_wiki<'a>(
    &'a self,
    dbname: &'a str,
  ) -> impl Future<Output = Result<Option<WikiRecord>, Self::Error>> + Send + 'a;

  /// List every wiki in the farm, deleted ones included.
  fn list_wikis(
    &self,
  ) -> impl Future<Output = Result<Vec<WikiRecord>, Self::Error>> + Send + '_;

  /// Persist the full current state of `record` and write `jobs` to the
  /// outbox, atomically. Rows are updated in place; wikis are never
  /// physically deleted.
  fn update_wiki<'a>(
    &'a self,
    record: &'a WikiRecord,
    jobs: Vec<JobPayload>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Requests ──────────────────────────────────────────────────────────

  /// Persist a new request with pending status, together with its initial
  /// `Submitted` history entry. A concurrent in-flight request for the same
  /// dbname must fail with the backend's duplicate-request error.
  fn insert_request(
    &self,
    input: NewRequest,
  ) -> impl Future<Output = Result<WikiRequestRecord, Self::Error>> + Send + '_;

  /// The open (pending/onhold/moredetails) request for `dbname`, if any.
  /// The partial unique index guarantees there is at most one.
  fn inflight_request<'a>(
    &'a self,
    dbname: &'a str,
  ) -> impl Future<Output = Result<Option<WikiRequestRecord>, Self::Error>> + Send + 'a;

  /// Retrieve a request by id, visibility not yet applied.
  fn get_request(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<WikiRequestRecord>, Self::Error>> + Send + '_;

  /// All requests submitted by `requester`, newest first.
  fn requests_by_requester<'a>(
    &'a self,
    requester: &'a str,
  ) -> impl Future<Output = Result<Vec<WikiRequestRecord>, Self::Error>> + Send + 'a;

  /// Persist the full current state of `record`, append `history` when
  /// given, and write `job` to the outbox when given — all atomically.
  fn update_request<'a>(
    &'a self,
    record: &'a WikiRequestRecord,
    history: Option<NewHistoryEntry>,
    job: Option<JobPayload>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Comments & history ────────────────────────────────────────────────

  fn insert_comment(
    &self,
    input: NewComment,
  ) -> impl Future<Output = Result<RequestComment, Self::Error>> + Send + '_;

  /// Comments on a request, oldest first.
  fn comments(
    &self,
    request_id: i64,
  ) -> impl Future<Output = Result<Vec<RequestComment>, Self::Error>> + Send + '_;

  /// History of a request, oldest first.
  fn history(
    &self,
    request_id: i64,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + '_;

  // ── Job outbox ────────────────────────────────────────────────────────

  /// Claim the oldest runnable job, marking it running and bumping its
  /// attempt count. Jobs stuck in running state past the backend's staleness
  /// window are redelivered.
  fn claim_job(
    &self,
  ) -> impl Future<Output = Result<Option<JobRow>, Self::Error>> + Send + '_;

  /// Mark a claimed job as finished. Terminal regardless of the handler's
  /// outcome — failed provisioning is recorded as workflow state, not by
  /// queue-level retry.
  fn finish_job(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Provisioner ─────────────────────────────────────────────────────────────

/// External side effects of bringing a tenant wiki into existence. Each
/// operation may be redelivered by the job queue; treat "already exists" as
/// success.
pub trait Provisioner: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create the wiki's isolated storage domain on `cluster`.
  fn create_database<'a>(
    &'a self,
    dbname: &'a str,
    cluster: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Populate the baseline schema inside the new storage domain.
  fn populate_schema<'a>(
    &'a self,
    dbname: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Create the requester's administrative account on the new wiki.
  fn grant_founder<'a>(
    &'a self,
    dbname: &'a str,
    username: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Open or restrict the wiki's storage container.
  fn set_container_access<'a>(
    &'a self,
    dbname: &'a str,
    private: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
