//! [`RequestWorkflow`] — the request state machine.
//!
//! Drives a wiki request from submission through comment/triage to approval
//! or decline, applying the same visibility filter on every read path so an
//! invisible request is indistinguishable from an absent one.

use std::sync::Arc;

use acre_core::{
  event::{Notification, Notifier},
  request::{
    Capability, HistoryAction, NewRequest, RequestComment, RequestStatus,
    RequestView, Viewer, Visibility, WikiRequestRecord,
  },
  store::{FarmStore, JobPayload, NewComment, NewHistoryEntry},
  wiki::validate_dbname,
};

use crate::{Error, Result};

/// Author recorded on comments the service writes itself (provisioning
/// outcomes).
pub const SYSTEM_ACTOR: &str = "acre";

pub struct RequestWorkflow<S> {
  store:    Arc<S>,
  notifier: Arc<dyn Notifier>,
}

impl<S> Clone for RequestWorkflow<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      notifier: Arc::clone(&self.notifier),
    }
  }
}

impl<S: FarmStore> RequestWorkflow<S> {
  pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
    Self { store, notifier }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  // ── Submission ────────────────────────────────────────────────────────────

  /// Validate and persist a new request. The in-flight pre-check gives a
  /// clean error; the store's partial unique index closes the remaining race
  /// and surfaces concurrent duplicates the same way.
  pub async fn submit(&self, input: NewRequest) -> Result<WikiRequestRecord> {
    validate_dbname(&input.dbname)?;

    if self
      .store
      .get_wiki(&input.dbname)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Err(acre_core::Error::WikiExists(input.dbname).into());
    }

    if self
      .store
      .inflight_request(&input.dbname)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Err(acre_core::Error::DuplicateRequest(input.dbname).into());
    }

    let record =
      self.store.insert_request(input).await.map_err(Error::store)?;
    tracing::info!(
      id = record.id,
      dbname = %record.dbname,
      requester = %record.requester,
      "wiki request submitted"
    );
    Ok(record)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// A request the viewer is allowed to see, or `RequestNotFound` — never a
  /// permission error, so existence cannot be probed.
  async fn load_raw(
    &self,
    id: i64,
    viewer: &Viewer,
  ) -> Result<WikiRequestRecord> {
    let record = self
      .store
      .get_request(id)
      .await
      .map_err(Error::store)?
      .filter(|r| r.visible_to(viewer))
      .ok_or(acre_core::Error::RequestNotFound(id))?;
    Ok(record)
  }

  /// The full read model: record, comments the viewer may see, and history.
  pub async fn load_visible(
    &self,
    id: i64,
    viewer: &Viewer,
  ) -> Result<RequestView> {
    let request = self.load_raw(id, viewer).await?;

    let mut comments =
      self.store.comments(id).await.map_err(Error::store)?;
    comments.retain(|c| c.visibility.allows(viewer, &request.requester));

    let history = self.store.history(id).await.map_err(Error::store)?;

    Ok(RequestView { request, comments, history })
  }

  /// Requests submitted by `requester` and visible to `viewer`, newest
  /// first.
  pub async fn visible_requests_by(
    &self,
    requester: &str,
    viewer: &Viewer,
  ) -> Result<Vec<WikiRequestRecord>> {
    let mut records = self
      .store
      .requests_by_requester(requester)
      .await
      .map_err(Error::store)?;
    records.retain(|r| r.visible_to(viewer));
    Ok(records)
  }

  // ── Comments ──────────────────────────────────────────────────────────────

  /// Append a comment as `actor`. Allowed for reviewers and for the
  /// requester; the comment inherits the record's visibility tier.
  /// `notify_users` are notified alongside the requester (unless the
  /// requester is the actor).
  pub async fn add_comment(
    &self,
    id: i64,
    actor: &Viewer,
    body: &str,
    notify_users: Vec<String>,
  ) -> Result<RequestComment> {
    let record = self.load_raw(id, actor).await?;

    if !actor.is_reviewer() && actor.username != record.requester {
      return Err(
        acre_core::Error::PermissionDenied(
          "only reviewers and the requester may comment".to_owned(),
        )
        .into(),
      );
    }
    if record.locked {
      return Err(acre_core::Error::RequestLocked(id).into());
    }
    if body.trim().is_empty() {
      return Err(acre_core::Error::EmptyComment.into());
    }

    let comment = self
      .store
      .insert_comment(NewComment {
        request_id: id,
        author:     actor.username.clone(),
        body:       body.to_owned(),
        visibility: record.visibility,
      })
      .await
      .map_err(Error::store)?;

    let mut recipients = notify_users;
    if record.requester != actor.username {
      recipients.push(record.requester.clone());
    }
    recipients.sort();
    recipients.dedup();
    recipients.retain(|r| r != &actor.username);

    for recipient in recipients {
      self.notifier.notify(Notification {
        recipient,
        subject: format!("New comment on wiki request #{id}"),
        body:    body.to_owned(),
      });
    }

    Ok(comment)
  }

  // ── Transitions ───────────────────────────────────────────────────────────

  /// Move a request to `new_status`. Reviewers may take any allowed
  /// transition; the requester may only bring their own on-hold or
  /// more-details request back to pending. Approval writes the provisioning
  /// job to the outbox in the same transaction as the status change.
  pub async fn transition(
    &self,
    id: i64,
    new_status: RequestStatus,
    actor: &Viewer,
    reason: Option<String>,
  ) -> Result<WikiRequestRecord> {
    let mut record = self.load_raw(id, actor).await?;

    let requester_followup = actor.username == record.requester
      && new_status == RequestStatus::Pending;
    if !actor.is_reviewer() && !requester_followup {
      return Err(
        acre_core::Error::PermissionDenied(
          "transition requires the review capability".to_owned(),
        )
        .into(),
      );
    }
    if record.locked {
      return Err(acre_core::Error::RequestLocked(id).into());
    }
    if !record.status.can_transition_to(new_status) {
      return Err(
        acre_core::Error::InvalidTransition {
          from: record.status,
          to:   new_status,
        }
        .into(),
      );
    }

    let from = record.status;
    record.status = new_status;

    let history = NewHistoryEntry {
      request_id: id,
      actor:      actor.username.clone(),
      action:     HistoryAction::Transition { from, to: new_status },
      reason:     reason.clone(),
    };

    let job = (new_status == RequestStatus::Approved).then(|| {
      JobPayload::ProvisionWiki {
        request_id: record.id,
        dbname:     record.dbname.clone(),
        sitename:   record.sitename.clone(),
        language:   record.language.clone(),
        category:   record.category.clone(),
        private:    record.private,
        requester:  record.requester.clone(),
        approver:   actor.username.clone(),
        reason:     reason
          .clone()
          .unwrap_or_else(|| "Request approved.".to_owned()),
      }
    });

    self
      .store
      .update_request(&record, Some(history), job)
      .await
      .map_err(Error::store)?;

    if new_status == RequestStatus::Declined {
      self.notifier.notify(Notification {
        recipient: record.requester.clone(),
        subject:   format!("Wiki request #{id} declined"),
        body:      reason.unwrap_or_else(|| "No reason given.".to_owned()),
      });
    }

    tracing::info!(id, from = %from, to = %new_status, "request transition");
    Ok(record)
  }

  /// Freeze or unfreeze a request. Orthogonal to status; reviewers only.
  pub async fn set_locked(
    &self,
    id: i64,
    locked: bool,
    actor: &Viewer,
  ) -> Result<WikiRequestRecord> {
    let mut record = self.load_raw(id, actor).await?;
    if !actor.is_reviewer() {
      return Err(
        acre_core::Error::PermissionDenied(
          "locking requires the review capability".to_owned(),
        )
        .into(),
      );
    }

    if record.locked != locked {
      record.locked = locked;
      self
        .store
        .update_request(&record, None, None)
        .await
        .map_err(Error::store)?;
    }
    Ok(record)
  }

  /// Raise or lower the record's visibility tier. The suppressed tier needs
  /// the dedicated capability in either direction.
  pub async fn set_visibility(
    &self,
    id: i64,
    visibility: Visibility,
    actor: &Viewer,
  ) -> Result<WikiRequestRecord> {
    let mut record = self.load_raw(id, actor).await?;

    let needs_suppress = visibility == Visibility::Suppressed
      || record.visibility == Visibility::Suppressed;
    let allowed = if needs_suppress {
      actor.has(Capability::Suppress)
    } else {
      actor.is_reviewer()
    };
    if !allowed {
      return Err(
        acre_core::Error::PermissionDenied(
          "insufficient capability for that visibility tier".to_owned(),
        )
        .into(),
      );
    }

    if record.visibility != visibility {
      record.visibility = visibility;
      self
        .store
        .update_request(&record, None, None)
        .await
        .map_err(Error::store)?;
    }
    Ok(record)
  }

  // ── Provisioning outcomes ─────────────────────────────────────────────────

  /// Record a successful provisioning run: terminal comment, status stays
  /// approved.
  pub async fn record_provisioned(&self, id: i64) -> Result<()> {
    self
      .store
      .insert_comment(NewComment {
        request_id: id,
        author:     SYSTEM_ACTOR.to_owned(),
        body:       "Wiki created.".to_owned(),
        visibility: Visibility::Public,
      })
      .await
      .map_err(Error::store)?;
    Ok(())
  }

  /// Absorb a provisioning failure: comment carrying the error text, a
  /// create-failure history entry, and the request reopened to pending so a
  /// human can retry or intervene. Deliberately bypasses the transition
  /// table — approved→pending exists only on this path.
  pub async fn reopen_with_failure(
    &self,
    id: i64,
    error_text: &str,
  ) -> Result<()> {
    let mut record = self
      .store
      .get_request(id)
      .await
      .map_err(Error::store)?
      .ok_or(acre_core::Error::RequestNotFound(id))?;

    self
      .store
      .insert_comment(NewComment {
        request_id: id,
        author:     SYSTEM_ACTOR.to_owned(),
        body:       format!("Wiki creation failed: {error_text}"),
        visibility: record.visibility,
      })
      .await
      .map_err(Error::store)?;

    record.status = RequestStatus::Pending;
    self
      .store
      .update_request(
        &record,
        Some(NewHistoryEntry {
          request_id: id,
          actor:      SYSTEM_ACTOR.to_owned(),
          action:     HistoryAction::CreateFailure,
          reason:     Some(error_text.to_owned()),
        }),
        None,
      )
      .await
      .map_err(Error::store)?;

    tracing::warn!(id, error = error_text, "provisioning failed; reopened");
    Ok(())
  }
}
