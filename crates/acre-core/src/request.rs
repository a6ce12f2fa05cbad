//! Wiki creation requests — the unit of work in the review queue.
//!
//! A request is submitted by a farm user, triaged by reviewers through
//! comments and status transitions, and either declined or approved into an
//! asynchronous provisioning job. Records are retained permanently for audit.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wiki::ExtraMap;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Review status of a request. `Approved` and `Declined` are terminal;
/// the other three count as in-flight and hold the target name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
  Pending,
  Approved,
  Declined,
  OnHold,
  MoreDetails,
}

impl RequestStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Approved | Self::Declined)
  }

  /// An in-flight request blocks further submissions for the same dbname.
  pub fn is_in_flight(self) -> bool { !self.is_terminal() }

  /// The reviewer-driven transition table. Requester follow-up moves an
  /// on-hold or more-details request back to pending; declining is allowed
  /// from any non-terminal state.
  pub fn can_transition_to(self, new: Self) -> bool {
    match (self, new) {
      (Self::Pending, Self::Approved)
      | (Self::Pending, Self::OnHold)
      | (Self::Pending, Self::MoreDetails)
      | (Self::OnHold, Self::Pending)
      | (Self::MoreDetails, Self::Pending) => true,
      (from, Self::Declined) => !from.is_terminal(),
      _ => false,
    }
  }
}

impl fmt::Display for RequestStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Pending => "pending",
      Self::Approved => "approved",
      Self::Declined => "declined",
      Self::OnHold => "onhold",
      Self::MoreDetails => "moredetails",
    };
    f.write_str(s)
  }
}

// ─── Visibility ──────────────────────────────────────────────────────────────

/// What a caller is allowed to do. Capabilities are assigned per user by
/// server configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
  /// Triage requests and view restricted ones.
  Review,
  /// View suppressed requests; hidden even from reviewers.
  Suppress,
}

/// An authenticated caller, as resolved by the API layer.
#[derive(Debug, Clone)]
pub struct Viewer {
  pub username:     String,
  pub capabilities: Vec<Capability>,
}

impl Viewer {
  pub fn new(username: impl Into<String>, capabilities: Vec<Capability>) -> Self {
    Self { username: username.into(), capabilities }
  }

  pub fn has(&self, cap: Capability) -> bool {
    self.capabilities.contains(&cap)
  }

  pub fn is_reviewer(&self) -> bool { self.has(Capability::Review) }
}

/// Ordered restriction tiers. Tier 0 is fully public; the highest tier hides
/// a request even from ordinary reviewers.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
  Public,
  Restricted,
  Suppressed,
}

impl Visibility {
  /// Whether `viewer` may see content at this tier. `requester` is the
  /// username of the record's author — restricted requests stay visible to
  /// their own requester, suppressed ones do not.
  pub fn allows(self, viewer: &Viewer, requester: &str) -> bool {
    match self {
      Self::Public => true,
      Self::Restricted => {
        viewer.has(Capability::Review) || viewer.username == requester
      }
      Self::Suppressed => viewer.has(Capability::Suppress),
    }
  }
}

// ─── WikiRequestRecord ───────────────────────────────────────────────────────

/// One wiki creation request. Immutable identity fields plus the mutable
/// review state; comments and history live in their own tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiRequestRecord {
  pub id:         i64,
  pub dbname:     String,
  pub sitename:   String,
  pub language:   String,
  pub category:   String,
  pub purpose:    Option<String>,
  pub reason:     String,
  pub requester:  String,
  pub status:     RequestStatus,
  pub visibility: Visibility,
  /// Administrative freeze, distinct from status: a locked request accepts
  /// no comments or transitions until unlocked.
  pub locked:     bool,
  pub private:    bool,
  pub created_at: DateTime<Utc>,
  pub extra:      ExtraMap,
}

impl WikiRequestRecord {
  pub fn visible_to(&self, viewer: &Viewer) -> bool {
    self.visibility.allows(viewer, &self.requester)
  }
}

/// Input to [`crate::store::FarmStore::insert_request`]. The id, pending
/// status, public visibility, and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRequest {
  pub dbname:    String,
  pub sitename:  String,
  pub language:  String,
  pub category:  String,
  pub purpose:   Option<String>,
  pub reason:    String,
  pub requester: String,
  pub private:   bool,
}

// ─── Comments ────────────────────────────────────────────────────────────────

/// A reviewer or requester comment on a request, ordered by time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestComment {
  pub id:         i64,
  pub request_id: i64,
  pub author:     String,
  pub body:       String,
  pub visibility: Visibility,
  pub created_at: DateTime<Utc>,
}

// ─── History ─────────────────────────────────────────────────────────────────

/// What a history entry records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HistoryAction {
  /// Initial entry written at submission.
  Submitted,
  /// A status change; every transition is logged.
  Transition {
    from: RequestStatus,
    to:   RequestStatus,
  },
  /// Provisioning failed after approval and the request was reopened.
  CreateFailure,
}

/// Append-only audit log of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub id:         i64,
  pub request_id: i64,
  pub actor:      String,
  pub action:     HistoryAction,
  pub reason:     Option<String>,
  pub created_at: DateTime<Utc>,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// A request bundled with its comments and history — the shape served to
/// callers who passed the visibility check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestView {
  pub request:  WikiRequestRecord,
  pub comments: Vec<RequestComment>,
  pub history:  Vec<HistoryEntry>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transition_table() {
    use RequestStatus::*;
    assert!(Pending.can_transition_to(Approved));
    assert!(Pending.can_transition_to(OnHold));
    assert!(Pending.can_transition_to(MoreDetails));
    assert!(OnHold.can_transition_to(Pending));
    assert!(MoreDetails.can_transition_to(Pending));
    assert!(OnHold.can_transition_to(Declined));
    assert!(MoreDetails.can_transition_to(Declined));
    assert!(Pending.can_transition_to(Declined));

    assert!(!OnHold.can_transition_to(Approved));
    assert!(!Approved.can_transition_to(Pending));
    assert!(!Declined.can_transition_to(Pending));
    assert!(!Approved.can_transition_to(Declined));
  }

  #[test]
  fn visibility_tiers() {
    let public = Viewer::new("alice", vec![]);
    let reviewer = Viewer::new("rev", vec![Capability::Review]);
    let oversight =
      Viewer::new("os", vec![Capability::Review, Capability::Suppress]);

    assert!(Visibility::Public.allows(&public, "bob"));
    assert!(!Visibility::Restricted.allows(&public, "bob"));
    assert!(Visibility::Restricted.allows(&reviewer, "bob"));
    // A requester keeps sight of their own restricted request…
    assert!(Visibility::Restricted.allows(&public, "alice"));
    // …but not of a suppressed one.
    assert!(!Visibility::Suppressed.allows(&public, "alice"));
    assert!(!Visibility::Suppressed.allows(&reviewer, "bob"));
    assert!(Visibility::Suppressed.allows(&oversight, "bob"));
  }
}
