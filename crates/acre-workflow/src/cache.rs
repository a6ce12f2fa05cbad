//! Per-wiki derived read cache.
//!
//! Every request served by a tenant wiki needs to know "is this wiki private
//! or closed?" without touching the central store. The answer is a small JSON
//! snapshot file per wiki, rebuilt on every [`WikiEditor`](crate::WikiEditor)
//! commit. A missing or unreadable file is never an error — readers fall back
//! to canonical storage, so the cache can only ever serve stale data, not
//! wrong decisions.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use acre_core::{store::FarmStore, wiki::WikiRecord};

use crate::{Error, Result};

/// What the hot path needs to know about one wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiSnapshot {
  pub dbname:       String,
  pub private:      bool,
  pub locked:       bool,
  /// Lifecycle discriminant: `active`, `closed`, `inactive`, or `deleted`.
  pub state:        String,
  pub refreshed_at: DateTime<Utc>,
}

impl WikiSnapshot {
  pub fn from_record(record: &WikiRecord) -> Self {
    Self {
      dbname:       record.dbname.clone(),
      private:      record.private,
      locked:       record.locked,
      state:        record.state.discriminant().to_owned(),
      refreshed_at: Utc::now(),
    }
  }

  pub fn is_active(&self) -> bool { self.state == "active" }
}

/// Directory of per-wiki snapshot files, `<dir>/<dbname>.json`.
#[derive(Debug, Clone)]
pub struct WikiCache {
  dir: PathBuf,
}

impl WikiCache {
  pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

  fn path(&self, dbname: &str) -> PathBuf {
    self.dir.join(format!("{dbname}.json"))
  }

  /// Read a snapshot. `None` covers both "no file" and "unparseable file" —
  /// callers must treat those identically and consult canonical storage.
  pub fn read(&self, dbname: &str) -> Option<WikiSnapshot> {
    let raw = std::fs::read_to_string(self.path(dbname)).ok()?;
    match serde_json::from_str(&raw) {
      Ok(snapshot) => Some(snapshot),
      Err(err) => {
        tracing::warn!(dbname, %err, "discarding unreadable cache snapshot");
        None
      }
    }
  }

  /// Rebuild the snapshot file from a current record.
  pub fn write(&self, record: &WikiRecord) -> Result<()> {
    if !Path::new(&self.dir).exists() {
      std::fs::create_dir_all(&self.dir)?;
    }
    let snapshot = WikiSnapshot::from_record(record);
    let json = serde_json::to_string(&snapshot)
      .map_err(acre_core::Error::Serialization)?;
    std::fs::write(self.path(&record.dbname), json)?;
    Ok(())
  }

  /// Drop the snapshot file; the next read falls back to canonical storage.
  pub fn invalidate(&self, dbname: &str) {
    match std::fs::remove_file(self.path(dbname)) {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => {
        tracing::warn!(dbname, err = %e, "failed to drop cache snapshot");
      }
    }
  }

  /// Read-through: cache hit, or load from canonical storage and rebuild.
  /// `None` means the wiki does not exist at all.
  pub async fn snapshot_or_load<S: FarmStore>(
    &self,
    store: &S,
    dbname: &str,
  ) -> Result<Option<WikiSnapshot>> {
    if let Some(snapshot) = self.read(dbname) {
      return Ok(Some(snapshot));
    }

    let record = match store.get_wiki(dbname).await.map_err(Error::store)? {
      Some(record) => record,
      None => return Ok(None),
    };
    self.write(&record)?;
    Ok(Some(WikiSnapshot::from_record(&record)))
  }
}
