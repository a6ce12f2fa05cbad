//! [`WikiEditor`] — transactional mutation of one wiki record.
//!
//! Load a record, call typed setters that accumulate a field-level diff plus
//! queued events and outbox jobs, then `commit()` once. Nothing touches
//! storage, the event sink, or the cache until commit; a dropped editor
//! leaves no trace, including for side-effecting jobs.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use acre_core::{
  event::{EventSink, LifecycleEvent},
  store::{FarmStore, JobPayload},
  wiki::{InactiveExemption, LifecycleState, WikiRecord},
};

use crate::{cache::WikiCache, Error, Result};

/// One tracked mutation, kept for the audit summary.
#[derive(Debug, Clone)]
pub struct FieldChange {
  pub field: String,
  pub old:   Value,
  pub new:   Value,
}

pub struct WikiEditor<S> {
  store:      Arc<S>,
  cache:      Arc<WikiCache>,
  sink:       Arc<dyn EventSink>,
  record:     WikiRecord,
  changes:    Vec<FieldChange>,
  events:     Vec<LifecycleEvent>,
  jobs:       Vec<JobPayload>,
  log_action: Option<&'static str>,
}

impl<S: FarmStore> WikiEditor<S> {
  /// Load the wiki `dbname` for editing. Fails with
  /// [`acre_core::Error::WikiNotFound`] if no such row exists — callers on
  /// background paths catch this rather than rendering anything.
  pub async fn load(
    store: Arc<S>,
    cache: Arc<WikiCache>,
    sink: Arc<dyn EventSink>,
    dbname: &str,
  ) -> Result<Self> {
    let record = store
      .get_wiki(dbname)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| acre_core::Error::WikiNotFound(dbname.to_owned()))?;

    Ok(Self {
      store,
      cache,
      sink,
      record,
      changes: Vec::new(),
      events: Vec::new(),
      jobs: Vec::new(),
      log_action: None,
    })
  }

  pub fn record(&self) -> &WikiRecord { &self.record }

  pub fn has_changes(&self) -> bool { !self.changes.is_empty() }

  pub fn changes(&self) -> &[FieldChange] { &self.changes }

  /// Override the default `"settings"` audit action for this commit.
  pub fn set_log_action(&mut self, action: &'static str) {
    self.log_action = Some(action);
  }

  fn track(
    &mut self,
    field: impl Into<String>,
    old: impl Serialize,
    new: impl Serialize,
  ) {
    let old = serde_json::to_value(old).unwrap_or(Value::Null);
    let new = serde_json::to_value(new).unwrap_or(Value::Null);
    self.changes.push(FieldChange { field: field.into(), old, new });
  }

  // ── Plain fields ──────────────────────────────────────────────────────────

  pub fn set_sitename(&mut self, sitename: impl Into<String>) {
    let sitename = sitename.into();
    if self.record.sitename != sitename {
      let old = self.record.sitename.clone();
      self.track("sitename", &old, &sitename);
      self.record.sitename = sitename;
    }
  }

  pub fn set_language(&mut self, language: impl Into<String>) {
    let language = language.into();
    if self.record.language != language {
      let old = self.record.language.clone();
      self.track("language", &old, &language);
      self.record.language = language;
    }
  }

  pub fn set_category(&mut self, category: impl Into<String>) {
    let category = category.into();
    if self.record.category != category {
      let old = self.record.category.clone();
      self.track("category", &old, &category);
      self.record.category = category;
    }
  }

  pub fn set_server_url(&mut self, server_url: Option<String>) {
    if self.record.server_url != server_url {
      let old = self.record.server_url.clone();
      self.track("server_url", &old, &server_url);
      self.record.server_url = server_url;
    }
  }

  pub fn set_db_cluster(&mut self, db_cluster: impl Into<String>) {
    let db_cluster = db_cluster.into();
    if self.record.db_cluster != db_cluster {
      let old = self.record.db_cluster.clone();
      self.track("db_cluster", &old, &db_cluster);
      self.record.db_cluster = db_cluster;
    }
  }

  pub fn set_experimental(&mut self, experimental: bool) {
    if self.record.experimental != experimental {
      self.track("experimental", self.record.experimental, experimental);
      self.record.experimental = experimental;
    }
  }

  pub fn lock(&mut self) {
    if !self.record.locked {
      self.track("locked", false, true);
      self.record.locked = true;
    }
  }

  pub fn unlock(&mut self) {
    if self.record.locked {
      self.track("locked", true, false);
      self.record.locked = false;
    }
  }

  pub fn set_inactive_exempt(&mut self, reason: Option<String>) {
    let exemption = Some(InactiveExemption { reason });
    if self.record.inactive_exempt != exemption {
      let old = self.record.inactive_exempt.clone();
      self.track("inactive_exempt", &old, &exemption);
      self.record.inactive_exempt = exemption;
    }
  }

  pub fn clear_inactive_exempt(&mut self) {
    if self.record.inactive_exempt.is_some() {
      let old = self.record.inactive_exempt.clone();
      self.track("inactive_exempt", &old, &None::<InactiveExemption>);
      self.record.inactive_exempt = None;
    }
  }

  // ── Privacy ───────────────────────────────────────────────────────────────

  /// Staged, not dispatched: the container-access job reaches the outbox only
  /// when `commit()` runs.
  pub fn mark_private(&mut self) {
    if !self.record.private {
      self.track("private", false, true);
      self.record.private = true;
      self.events.push(LifecycleEvent::MadePrivate {
        dbname: self.record.dbname.clone(),
      });
      self.jobs.push(JobPayload::SetContainerAccess {
        dbname:  self.record.dbname.clone(),
        private: true,
      });
    }
  }

  pub fn mark_public(&mut self) {
    if self.record.private {
      self.track("private", true, false);
      self.record.private = false;
      self.events.push(LifecycleEvent::MadePublic {
        dbname: self.record.dbname.clone(),
      });
      self.jobs.push(JobPayload::SetContainerAccess {
        dbname:  self.record.dbname.clone(),
        private: false,
      });
    }
  }

  // ── Lifecycle transitions ─────────────────────────────────────────────────

  fn set_state(&mut self, new: LifecycleState) {
    self.track(
      "state",
      self.record.state.discriminant(),
      new.discriminant(),
    );
    self.record.state = new;
  }

  pub fn mark_closed(&mut self) {
    if !matches!(self.record.state, LifecycleState::Closed { .. }) {
      self.set_state(LifecycleState::Closed { since: Utc::now() });
      self.events.push(LifecycleEvent::Closed {
        dbname: self.record.dbname.clone(),
      });
    }
  }

  pub fn mark_inactive(&mut self) {
    if !matches!(self.record.state, LifecycleState::Inactive { .. }) {
      self.set_state(LifecycleState::Inactive { since: Utc::now() });
    }
  }

  /// Return to `Active`, discarding any closed/inactive/deleted timestamp.
  pub fn mark_active(&mut self) {
    if !self.record.state.is_active() {
      self.set_state(LifecycleState::Active);
      self.events.push(LifecycleEvent::Opened {
        dbname: self.record.dbname.clone(),
      });
    }
  }

  /// Soft delete: the row stays, the closed/inactive timestamps do not.
  pub fn mark_deleted(&mut self) {
    if !self.record.state.is_deleted() {
      self.set_state(LifecycleState::Deleted { since: Utc::now() });
      self.events.push(LifecycleEvent::Deleted {
        dbname: self.record.dbname.clone(),
      });
      self.log_action.get_or_insert("delete");
    }
  }

  // ── Extra fields ──────────────────────────────────────────────────────────

  /// Write an open-map field. Writing the value the field already holds
  /// (with `default` standing in for an absent key) records no change. A
  /// value that cannot be serialised is dropped, keeping the prior value.
  pub fn set_extra<T: Serialize>(
    &mut self,
    key: &str,
    value: T,
    default: Value,
  ) {
    let new = match serde_json::to_value(value) {
      Ok(v) => v,
      Err(err) => {
        tracing::warn!(
          dbname = %self.record.dbname,
          key,
          %err,
          "dropping unserialisable extra-field write"
        );
        return;
      }
    };

    let current = self.record.extra.get(key).cloned().unwrap_or(default);
    if current == new {
      return;
    }

    self.track(format!("extra.{key}"), current, &new);
    self.record.extra.insert(key.to_owned(), new);
  }

  /// Default-aware read of an open-map field.
  pub fn extra(&self, key: &str, default: Value) -> Value {
    self.record.extra.get(key).cloned().unwrap_or(default)
  }

  // ── Commit ────────────────────────────────────────────────────────────────

  /// Persist the accumulated diff. With no staged changes this is a no-op:
  /// no storage write, no events, no cache churn.
  ///
  /// Ordering is load-bearing: columns are persisted first, then events are
  /// published in the order their setters ran, then the read cache is
  /// rebuilt. Event consumers that need fresh data reload from canonical
  /// storage and may not rely on the cache being current yet.
  pub async fn commit(&mut self) -> Result<()> {
    if self.changes.is_empty() {
      return Ok(());
    }

    // Staged jobs outlive a failed write so a retried commit still
    // dispatches them.
    self
      .store
      .update_wiki(&self.record, self.jobs.clone())
      .await
      .map_err(Error::store)?;
    self.jobs.clear();

    for event in self.events.drain(..) {
      self.sink.publish(event);
    }

    // The record is durable at this point; a stale cache entry heals on the
    // next read, so a rebuild failure must not fail the commit.
    self.cache.invalidate(&self.record.dbname);
    if let Err(err) = self.cache.write(&self.record) {
      tracing::warn!(
        dbname = %self.record.dbname,
        %err,
        "cache rebuild failed after commit"
      );
    }

    let fields: Vec<&str> =
      self.changes.iter().map(|c| c.field.as_str()).collect();
    tracing::info!(
      dbname = %self.record.dbname,
      action = self.log_action.unwrap_or("settings"),
      fields = fields.join(", "),
      "wiki updated"
    );

    self.changes.clear();
    self.log_action = None;
    Ok(())
  }
}
