//! [`SqliteStore`] — the SQLite implementation of [`FarmStore`].

use std::path::Path;

use chrono::{Duration, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use acre_core::{
  request::{HistoryEntry, NewRequest, RequestComment, WikiRequestRecord},
  store::{FarmStore, JobPayload, JobRow, NewComment, NewHistoryEntry},
  wiki::{LifecycleState, NewWiki, WikiRecord},
};

use crate::{
  encode::{
    encode_action, encode_dt, encode_extra, encode_payload, encode_status,
    encode_visibility, RawComment, RawHistory, RawJob, RawRequest, RawWiki,
    REQUEST_COLUMNS, WIKI_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

/// Jobs stuck in `running` longer than this are redelivered. Handlers must
/// therefore tolerate replays.
const STALE_JOB_SECS: i64 = 600;

// ─── Store ───────────────────────────────────────────────────────────────────

/// The farm's central storage domain, backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn is_constraint_violation(err: &tokio_rusqlite::Error) -> bool {
  matches!(
    err,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _))
      if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

/// Insert outbox rows inside an open transaction.
fn insert_jobs(
  tx: &rusqlite::Transaction<'_>,
  jobs: &[(String, String, String)],
) -> rusqlite::Result<()> {
  for (id, payload, at) in jobs {
    tx.execute(
      "INSERT INTO jobs (id, payload, enqueued_at) VALUES (?1, ?2, ?3)",
      rusqlite::params![id, payload, at],
    )?;
  }
  Ok(())
}

fn encode_jobs(jobs: &[JobPayload]) -> Result<Vec<(String, String, String)>> {
  let now = encode_dt(Utc::now());
  jobs
    .iter()
    .map(|p| {
      Ok((
        Uuid::new_v4().hyphenated().to_string(),
        encode_payload(p)?,
        now.clone(),
      ))
    })
    .collect()
}

// ─── FarmStore impl ──────────────────────────────────────────────────────────

impl FarmStore for SqliteStore {
  type Error = Error;

  // ── Wikis ─────────────────────────────────────────────────────────────────

  async fn insert_wiki(&self, input: NewWiki) -> Result<WikiRecord> {
    let record = WikiRecord {
      dbname:          input.dbname,
      sitename:        input.sitename,
      language:        input.language,
      category:        input.category,
      db_cluster:      input.db_cluster,
      server_url:      None,
      created_at:      Utc::now(),
      state:           LifecycleState::Active,
      private:         input.private,
      locked:          false,
      experimental:    false,
      inactive_exempt: None,
      extra:           Default::default(),
    };

    let dbname     = record.dbname.clone();
    let sitename   = record.sitename.clone();
    let language   = record.language.clone();
    let category   = record.category.clone();
    let db_cluster = record.db_cluster.clone();
    let created_at = encode_dt(record.created_at);
    let private    = record.private;
    let extra      = encode_extra(&record.extra)?;

    let inserted = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO wikis (
             dbname, sitename, language, category, db_cluster,
             created_at, state, private, extra
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8)",
          rusqlite::params![
            dbname, sitename, language, category, db_cluster, created_at,
            private, extra,
          ],
        )?;
        Ok(())
      })
      .await;

    match inserted {
      Ok(()) => Ok(record),
      Err(e) if is_constraint_violation(&e) => {
        Err(Error::WikiExists(record.dbname))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn get_wiki(&self, dbname: &str) -> Result<Option<WikiRecord>> {
    let dbname = dbname.to_owned();
    let sql = format!("SELECT {WIKI_COLUMNS} FROM wikis WHERE dbname = ?1");

    let raw: Option<RawWiki> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![dbname], |row| {
              RawWiki::from_row(row)
            })
            .optional()?,
        )
      })
      .await?;

    raw.map(RawWiki::into_record).transpose()
  }

  async fn list_wikis(&self) -> Result<Vec<WikiRecord>> {
    let sql = format!("SELECT {WIKI_COLUMNS} FROM wikis ORDER BY dbname");

    let raws: Vec<RawWiki> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| RawWiki::from_row(row))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawWiki::into_record).collect()
  }

  async fn update_wiki(
    &self,
    record: &WikiRecord,
    jobs: Vec<JobPayload>,
  ) -> Result<()> {
    let state = record.state.discriminant().to_owned();
    let state_since = match &record.state {
      LifecycleState::Active => None,
      LifecycleState::Closed { since }
      | LifecycleState::Inactive { since }
      | LifecycleState::Deleted { since } => Some(encode_dt(*since)),
    };

    let dbname        = record.dbname.clone();
    let sitename      = record.sitename.clone();
    let language      = record.language.clone();
    let category      = record.category.clone();
    let db_cluster    = record.db_cluster.clone();
    let server_url    = record.server_url.clone();
    let private       = record.private;
    let locked        = record.locked;
    let experimental  = record.experimental;
    let exempt        = record.inactive_exempt.is_some();
    let exempt_reason = record
      .inactive_exempt
      .as_ref()
      .and_then(|e| e.reason.clone());
    let extra         = encode_extra(&record.extra)?;
    let job_rows      = encode_jobs(&jobs)?;

    let updated: usize = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE wikis SET
             sitename = ?2, language = ?3, category = ?4, db_cluster = ?5,
             server_url = ?6, state = ?7, state_since = ?8, private = ?9,
             locked = ?10, experimental = ?11, inactive_exempt = ?12,
             inactive_exempt_reason = ?13, extra = ?14
           WHERE dbname = ?1",
          rusqlite::params![
            dbname, sitename, language, category, db_cluster, server_url,
            state, state_since, private, locked, experimental, exempt,
            exempt_reason, extra,
          ],
        )?;
        if updated > 0 {
          insert_jobs(&tx, &job_rows)?;
          tx.commit()?;
        }
        Ok(updated)
      })
      .await?;

    if updated == 0 {
      return Err(Error::WikiNotFound(record.dbname.clone()));
    }
    Ok(())
  }

  // ── Requests ──────────────────────────────────────────────────────────────

  async fn insert_request(
    &self,
    input: NewRequest,
  ) -> Result<WikiRequestRecord> {
    let created_at = Utc::now();
    let at_str     = encode_dt(created_at);

    let dbname    = input.dbname.clone();
    let sitename  = input.sitename.clone();
    let language  = input.language.clone();
    let category  = input.category.clone();
    let purpose   = input.purpose.clone();
    let reason    = input.reason.clone();
    let requester = input.requester.clone();
    let private   = input.private;
    let submitted =
      encode_action(&acre_core::request::HistoryAction::Submitted)?;

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO requests (
             dbname, sitename, language, category, purpose, reason,
             requester, status, visibility, private, created_at, extra
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 'public', ?8, ?9, '{}')",
          rusqlite::params![
            dbname, sitename, language, category, purpose, reason, requester,
            private, at_str,
          ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
          "INSERT INTO history (request_id, actor, action, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id, requester, submitted, at_str],
        )?;
        tx.commit()?;
        Ok(id)
      })
      .await;

    let id = match inserted {
      Ok(id) => id,
      Err(e) if is_constraint_violation(&e) => {
        return Err(Error::DuplicateRequest(input.dbname));
      }
      Err(e) => return Err(e.into()),
    };

    Ok(WikiRequestRecord {
      id,
      dbname: input.dbname,
      sitename: input.sitename,
      language: input.language,
      category: input.category,
      purpose: input.purpose,
      reason: input.reason,
      requester: input.requester,
      status: acre_core::request::RequestStatus::Pending,
      visibility: acre_core::request::Visibility::Public,
      locked: false,
      private: input.private,
      created_at,
      extra: Default::default(),
    })
  }

  async fn inflight_request(
    &self,
    dbname: &str,
  ) -> Result<Option<WikiRequestRecord>> {
    let dbname = dbname.to_owned();
    let sql = format!(
      "SELECT {REQUEST_COLUMNS} FROM requests
       WHERE dbname = ?1 AND status IN ('pending', 'onhold', 'moredetails')"
    );

    let raw: Option<RawRequest> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![dbname], |row| {
              RawRequest::from_row(row)
            })
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRequest::into_record).transpose()
  }

  async fn get_request(&self, id: i64) -> Result<Option<WikiRequestRecord>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1");

    let raw: Option<RawRequest> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id], |row| {
              RawRequest::from_row(row)
            })
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRequest::into_record).transpose()
  }

  async fn requests_by_requester(
    &self,
    requester: &str,
  ) -> Result<Vec<WikiRequestRecord>> {
    let requester = requester.to_owned();
    let sql = format!(
      "SELECT {REQUEST_COLUMNS} FROM requests
       WHERE requester = ?1 ORDER BY id DESC"
    );

    let raws: Vec<RawRequest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![requester], |row| {
            RawRequest::from_row(row)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRequest::into_record).collect()
  }

  async fn update_request(
    &self,
    record: &WikiRequestRecord,
    history: Option<NewHistoryEntry>,
    job: Option<JobPayload>,
  ) -> Result<()> {
    let id         = record.id;
    let status     = encode_status(record.status).to_owned();
    let visibility = encode_visibility(record.visibility).to_owned();
    let locked     = record.locked;
    let extra      = encode_extra(&record.extra)?;

    let history_row = history
      .map(|h| {
        Ok::<_, Error>((
          h.actor,
          encode_action(&h.action)?,
          h.reason,
          encode_dt(Utc::now()),
        ))
      })
      .transpose()?;

    let job_rows = match job {
      Some(p) => encode_jobs(std::slice::from_ref(&p))?,
      None => Vec::new(),
    };

    let updated: usize = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE requests SET
             status = ?2, visibility = ?3, locked = ?4, extra = ?5
           WHERE id = ?1",
          rusqlite::params![id, status, visibility, locked, extra],
        )?;
        if updated > 0 {
          if let Some((actor, action, reason, at)) = history_row {
            tx.execute(
              "INSERT INTO history (request_id, actor, action, reason, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)",
              rusqlite::params![id, actor, action, reason, at],
            )?;
          }
          insert_jobs(&tx, &job_rows)?;
          tx.commit()?;
        }
        Ok(updated)
      })
      .await?;

    if updated == 0 {
      return Err(Error::RequestNotFound(record.id));
    }
    Ok(())
  }

  // ── Comments & history ────────────────────────────────────────────────────

  async fn insert_comment(&self, input: NewComment) -> Result<RequestComment> {
    let created_at = Utc::now();
    let at_str     = encode_dt(created_at);
    let request_id = input.request_id;
    let author     = input.author.clone();
    let body       = input.body.clone();
    let visibility = encode_visibility(input.visibility).to_owned();

    let id: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO comments (request_id, author, body, visibility, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![request_id, author, body, visibility, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(RequestComment {
      id,
      request_id: input.request_id,
      author: input.author,
      body: input.body,
      visibility: input.visibility,
      created_at,
    })
  }

  async fn comments(&self, request_id: i64) -> Result<Vec<RequestComment>> {
    let raws: Vec<RawComment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, request_id, author, body, visibility, created_at
           FROM comments WHERE request_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![request_id], |row| {
            Ok(RawComment {
              id:         row.get(0)?,
              request_id: row.get(1)?,
              author:     row.get(2)?,
              body:       row.get(3)?,
              visibility: row.get(4)?,
              created_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawComment::into_comment).collect()
  }

  async fn history(&self, request_id: i64) -> Result<Vec<HistoryEntry>> {
    let raws: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, request_id, actor, action, reason, created_at
           FROM history WHERE request_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![request_id], |row| {
            Ok(RawHistory {
              id:         row.get(0)?,
              request_id: row.get(1)?,
              actor:      row.get(2)?,
              action:     row.get(3)?,
              reason:     row.get(4)?,
              created_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistory::into_entry).collect()
  }

  // ── Job outbox ────────────────────────────────────────────────────────────

  async fn claim_job(&self) -> Result<Option<JobRow>> {
    let now        = Utc::now();
    let now_str    = encode_dt(now);
    let stale_str  = encode_dt(now - Duration::seconds(STALE_JOB_SECS));

    let raw: Option<RawJob> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let candidate: Option<(String, String, String, i64)> = tx
          .query_row(
            "SELECT id, payload, enqueued_at, attempts FROM jobs
             WHERE status = 'queued'
                OR (status = 'running' AND claimed_at < ?1)
             ORDER BY enqueued_at, rowid LIMIT 1",
            rusqlite::params![stale_str],
            |row| {
              Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            },
          )
          .optional()?;

        let raw = match candidate {
          Some((id, payload, enqueued_at, attempts)) => {
            tx.execute(
              "UPDATE jobs SET status = 'running', claimed_at = ?2,
                 attempts = attempts + 1
               WHERE id = ?1",
              rusqlite::params![id, now_str],
            )?;
            Some(RawJob { id, payload, enqueued_at, attempts: attempts + 1 })
          }
          None => None,
        };

        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawJob::into_row).transpose()
  }

  async fn finish_job(&self, id: Uuid) -> Result<()> {
    let id_str = id.hyphenated().to_string();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE jobs SET status = 'done' WHERE id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
