//! Wiki records — one per tenant wiki in the farm.
//!
//! The multi-valued lifecycle (active/closed/inactive/deleted) is a single
//! tagged enum rather than independent booleans, so states that the farm
//! treats as mutually exclusive cannot be represented simultaneously.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Category tag applied to wikis that have not been assigned one.
pub const DEFAULT_CATEGORY: &str = "uncategorised";

/// Storage shard for wikis created without an explicit cluster.
pub const DEFAULT_CLUSTER: &str = "c1";

// ─── Lifecycle ───────────────────────────────────────────────────────────────

/// The mutually exclusive part of a wiki's state.
///
/// `Deleted` is a soft delete: the record is retained forever and can be
/// reactivated. Closing or deactivating records when it happened; returning
/// to `Active` discards those timestamps entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
  Active,
  Closed { since: DateTime<Utc> },
  Inactive { since: DateTime<Utc> },
  Deleted { since: DateTime<Utc> },
}

impl LifecycleState {
  /// The discriminant string stored in the `state` column.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Closed { .. } => "closed",
      Self::Inactive { .. } => "inactive",
      Self::Deleted { .. } => "deleted",
    }
  }

  /// Rebuild from a stored discriminant and timestamp. `None` when the pair
  /// does not name a valid state (a non-active state needs its timestamp).
  pub fn from_parts(
    discriminant: &str,
    since: Option<DateTime<Utc>>,
  ) -> Option<Self> {
    match (discriminant, since) {
      ("active", _) => Some(Self::Active),
      ("closed", Some(since)) => Some(Self::Closed { since }),
      ("inactive", Some(since)) => Some(Self::Inactive { since }),
      ("deleted", Some(since)) => Some(Self::Deleted { since }),
      _ => None,
    }
  }

  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }

  pub fn is_deleted(&self) -> bool { matches!(self, Self::Deleted { .. }) }
}

// ─── Inactivity exemption ────────────────────────────────────────────────────

/// Grants a wiki immunity from inactivity sweeps. The reason only exists
/// while the exemption does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactiveExemption {
  pub reason: Option<String>,
}

// ─── WikiRecord ──────────────────────────────────────────────────────────────

/// Open map of forward-compatible per-wiki settings.
pub type ExtraMap = serde_json::Map<String, serde_json::Value>;

/// One tenant wiki. `dbname` is the farm-wide identifier and never changes
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiRecord {
  pub dbname:          String,
  pub sitename:        String,
  pub language:        String,
  pub category:        String,
  pub db_cluster:      String,
  pub server_url:      Option<String>,
  pub created_at:      DateTime<Utc>,
  pub state:           LifecycleState,
  pub private:         bool,
  pub locked:          bool,
  pub experimental:    bool,
  pub inactive_exempt: Option<InactiveExemption>,
  pub extra:           ExtraMap,
}

// ─── NewWiki ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::FarmStore::insert_wiki`]. `created_at` and the
/// initial `Active` state are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewWiki {
  pub dbname:     String,
  pub sitename:   String,
  pub language:   String,
  pub category:   String,
  pub db_cluster: String,
  pub private:    bool,
}

impl NewWiki {
  pub fn new(dbname: impl Into<String>, sitename: impl Into<String>) -> Self {
    Self {
      dbname:     dbname.into(),
      sitename:   sitename.into(),
      language:   "en".to_owned(),
      category:   DEFAULT_CATEGORY.to_owned(),
      db_cluster: DEFAULT_CLUSTER.to_owned(),
      private:    false,
    }
  }
}

// ─── Name validation ─────────────────────────────────────────────────────────

/// Check that `dbname` is usable as a farm-wide identifier: lowercase ASCII,
/// leading letter, digits allowed after, at most 64 bytes.
pub fn validate_dbname(dbname: &str) -> Result<()> {
  let ok = !dbname.is_empty()
    && dbname.len() <= 64
    && dbname.chars().next().is_some_and(|c| c.is_ascii_lowercase())
    && dbname
      .chars()
      .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());

  if ok {
    Ok(())
  } else {
    Err(Error::InvalidDbname(dbname.to_owned()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dbname_accepts_plain_lowercase() {
    assert!(validate_dbname("examplewiki").is_ok());
    assert!(validate_dbname("wiki2").is_ok());
  }

  #[test]
  fn dbname_rejects_bad_shapes() {
    assert!(validate_dbname("").is_err());
    assert!(validate_dbname("2wiki").is_err());
    assert!(validate_dbname("Example").is_err());
    assert!(validate_dbname("name-with-dash").is_err());
    assert!(validate_dbname(&"a".repeat(65)).is_err());
  }

  #[test]
  fn lifecycle_roundtrips_through_parts() {
    let since = Utc::now();
    let closed = LifecycleState::Closed { since };
    let back =
      LifecycleState::from_parts(closed.discriminant(), Some(since)).unwrap();
    assert_eq!(back, closed);

    let active = LifecycleState::from_parts("active", None).unwrap();
    assert!(active.is_active());
  }
}
