//! [`SqliteProvisioner`] — tenant provisioning where every wiki's isolated
//! storage domain is its own SQLite file under a data directory.
//!
//! Every operation is safe to replay: the job queue is at-least-once, so each
//! step treats "already done" as success.

use std::path::{Path, PathBuf};

use thiserror::Error;

use acre_core::store::Provisioner;

/// Baseline schema for a freshly created tenant wiki.
const TENANT_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS site_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    groups   TEXT NOT NULL DEFAULT ''
);
";

#[derive(Debug, Error)]
pub enum ProvisionError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("tenant database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),
}

/// Creates and configures per-tenant SQLite databases.
#[derive(Clone)]
pub struct SqliteProvisioner {
  data_dir: PathBuf,
}

impl SqliteProvisioner {
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self { data_dir: data_dir.into() }
  }

  /// Path of a tenant wiki's database file.
  pub fn tenant_path(&self, dbname: &str) -> PathBuf {
    self.data_dir.join(format!("{dbname}.db"))
  }

  async fn tenant_conn(
    &self,
    dbname: &str,
  ) -> Result<tokio_rusqlite::Connection, ProvisionError> {
    Ok(tokio_rusqlite::Connection::open(self.tenant_path(dbname)).await?)
  }
}

impl Provisioner for SqliteProvisioner {
  type Error = ProvisionError;

  async fn create_database(
    &self,
    dbname: &str,
    _cluster: &str,
  ) -> Result<(), ProvisionError> {
    // Clusters map to subdirectories in larger deployments; a single data
    // directory is enough here. Opening the connection creates the file.
    if !Path::new(&self.data_dir).exists() {
      std::fs::create_dir_all(&self.data_dir)?;
    }
    self.tenant_conn(dbname).await?;
    Ok(())
  }

  async fn populate_schema(&self, dbname: &str) -> Result<(), ProvisionError> {
    let conn = self.tenant_conn(dbname).await?;
    conn
      .call(|conn| {
        conn.execute_batch(TENANT_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn grant_founder(
    &self,
    dbname: &str,
    username: &str,
  ) -> Result<(), ProvisionError> {
    let conn = self.tenant_conn(dbname).await?;
    let username = username.to_owned();
    conn
      .call(move |conn| {
        // Replays leave an existing founder untouched.
        conn.execute(
          "INSERT INTO users (username, groups)
           VALUES (?1, 'sysop,bureaucrat')
           ON CONFLICT (username) DO NOTHING",
          rusqlite::params![username],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn set_container_access(
    &self,
    dbname: &str,
    private: bool,
  ) -> Result<(), ProvisionError> {
    let conn = self.tenant_conn(dbname).await?;
    let value = if private { "1" } else { "0" };
    conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO site_meta (key, value) VALUES ('private', ?1)
           ON CONFLICT (key) DO UPDATE SET value = excluded.value",
          rusqlite::params![value],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
