//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Structured fields (history
//! actions, job payloads, extra maps) are stored as compact JSON. Enum fields
//! are stored as their lowercase discriminant strings.

use acre_core::{
  request::{
    HistoryAction, HistoryEntry, RequestComment, RequestStatus, Visibility,
    WikiRequestRecord,
  },
  store::{JobPayload, JobRow},
  wiki::{ExtraMap, InactiveExemption, LifecycleState, WikiRecord},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── RequestStatus ───────────────────────────────────────────────────────────

pub fn encode_status(s: RequestStatus) -> &'static str {
  match s {
    RequestStatus::Pending => "pending",
    RequestStatus::Approved => "approved",
    RequestStatus::Declined => "declined",
    RequestStatus::OnHold => "onhold",
    RequestStatus::MoreDetails => "moredetails",
  }
}

pub fn decode_status(s: &str) -> Result<RequestStatus> {
  match s {
    "pending" => Ok(RequestStatus::Pending),
    "approved" => Ok(RequestStatus::Approved),
    "declined" => Ok(RequestStatus::Declined),
    "onhold" => Ok(RequestStatus::OnHold),
    "moredetails" => Ok(RequestStatus::MoreDetails),
    other => Err(Error::Decode(format!("unknown request status: {other:?}"))),
  }
}

// ─── Visibility ──────────────────────────────────────────────────────────────

pub fn encode_visibility(v: Visibility) -> &'static str {
  match v {
    Visibility::Public => "public",
    Visibility::Restricted => "restricted",
    Visibility::Suppressed => "suppressed",
  }
}

pub fn decode_visibility(s: &str) -> Result<Visibility> {
  match s {
    "public" => Ok(Visibility::Public),
    "restricted" => Ok(Visibility::Restricted),
    "suppressed" => Ok(Visibility::Suppressed),
    other => Err(Error::Decode(format!("unknown visibility: {other:?}"))),
  }
}

// ─── JSON-encoded columns ────────────────────────────────────────────────────

pub fn encode_extra(extra: &ExtraMap) -> Result<String> {
  Ok(serde_json::to_string(extra)?)
}

pub fn decode_extra(s: &str) -> Result<ExtraMap> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_action(action: &HistoryAction) -> Result<String> {
  Ok(serde_json::to_string(action)?)
}

pub fn decode_action(s: &str) -> Result<HistoryAction> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_payload(payload: &JobPayload) -> Result<String> {
  Ok(serde_json::to_string(payload)?)
}

pub fn decode_payload(s: &str) -> Result<JobPayload> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `wikis` row.
pub struct RawWiki {
  pub dbname:                 String,
  pub sitename:               String,
  pub language:               String,
  pub category:               String,
  pub db_cluster:             String,
  pub server_url:             Option<String>,
  pub created_at:             String,
  pub state:                  String,
  pub state_since:            Option<String>,
  pub private:                bool,
  pub locked:                 bool,
  pub experimental:           bool,
  pub inactive_exempt:        bool,
  pub inactive_exempt_reason: Option<String>,
  pub extra:                  String,
}

/// Column list matching [`RawWiki`] field order; shared by every wiki query.
pub const WIKI_COLUMNS: &str = "dbname, sitename, language, category, \
   db_cluster, server_url, created_at, state, state_since, private, locked, \
   experimental, inactive_exempt, inactive_exempt_reason, extra";

impl RawWiki {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      dbname:                 row.get(0)?,
      sitename:               row.get(1)?,
      language:               row.get(2)?,
      category:               row.get(3)?,
      db_cluster:             row.get(4)?,
      server_url:             row.get(5)?,
      created_at:             row.get(6)?,
      state:                  row.get(7)?,
      state_since:            row.get(8)?,
      private:                row.get(9)?,
      locked:                 row.get(10)?,
      experimental:           row.get(11)?,
      inactive_exempt:        row.get(12)?,
      inactive_exempt_reason: row.get(13)?,
      extra:                  row.get(14)?,
    })
  }

  pub fn into_record(self) -> Result<WikiRecord> {
    let state_since = self.state_since.as_deref().map(decode_dt).transpose()?;
    let state = LifecycleState::from_parts(&self.state, state_since)
      .ok_or_else(|| {
        Error::Decode(format!("unknown lifecycle state: {:?}", self.state))
      })?;

    let inactive_exempt = self.inactive_exempt.then(|| InactiveExemption {
      reason: self.inactive_exempt_reason,
    });

    Ok(WikiRecord {
      dbname: self.dbname,
      sitename: self.sitename,
      language: self.language,
      category: self.category,
      db_cluster: self.db_cluster,
      server_url: self.server_url,
      created_at: decode_dt(&self.created_at)?,
      state,
      private: self.private,
      locked: self.locked,
      experimental: self.experimental,
      inactive_exempt,
      extra: decode_extra(&self.extra)?,
    })
  }
}

/// Raw values read directly from a `requests` row.
pub struct RawRequest {
  pub id:         i64,
  pub dbname:     String,
  pub sitename:   String,
  pub language:   String,
  pub category:   String,
  pub purpose:    Option<String>,
  pub reason:     String,
  pub requester:  String,
  pub status:     String,
  pub visibility: String,
  pub locked:     bool,
  pub private:    bool,
  pub created_at: String,
  pub extra:      String,
}

/// Column list matching [`RawRequest`] field order.
pub const REQUEST_COLUMNS: &str = "id, dbname, sitename, language, category, \
   purpose, reason, requester, status, visibility, locked, private, \
   created_at, extra";

impl RawRequest {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      dbname:     row.get(1)?,
      sitename:   row.get(2)?,
      language:   row.get(3)?,
      category:   row.get(4)?,
      purpose:    row.get(5)?,
      reason:     row.get(6)?,
      requester:  row.get(7)?,
      status:     row.get(8)?,
      visibility: row.get(9)?,
      locked:     row.get(10)?,
      private:    row.get(11)?,
      created_at: row.get(12)?,
      extra:      row.get(13)?,
    })
  }

  pub fn into_record(self) -> Result<WikiRequestRecord> {
    Ok(WikiRequestRecord {
      id:         self.id,
      dbname:     self.dbname,
      sitename:   self.sitename,
      language:   self.language,
      category:   self.category,
      purpose:    self.purpose,
      reason:     self.reason,
      requester:  self.requester,
      status:     decode_status(&self.status)?,
      visibility: decode_visibility(&self.visibility)?,
      locked:     self.locked,
      private:    self.private,
      created_at: decode_dt(&self.created_at)?,
      extra:      decode_extra(&self.extra)?,
    })
  }
}

/// Raw values read directly from a `comments` row.
pub struct RawComment {
  pub id:         i64,
  pub request_id: i64,
  pub author:     String,
  pub body:       String,
  pub visibility: String,
  pub created_at: String,
}

impl RawComment {
  pub fn into_comment(self) -> Result<RequestComment> {
    Ok(RequestComment {
      id:         self.id,
      request_id: self.request_id,
      author:     self.author,
      body:       self.body,
      visibility: decode_visibility(&self.visibility)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `history` row.
pub struct RawHistory {
  pub id:         i64,
  pub request_id: i64,
  pub actor:      String,
  pub action:     String,
  pub reason:     Option<String>,
  pub created_at: String,
}

impl RawHistory {
  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      id:         self.id,
      request_id: self.request_id,
      actor:      self.actor,
      action:     decode_action(&self.action)?,
      reason:     self.reason,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `jobs` row.
pub struct RawJob {
  pub id:          String,
  pub payload:     String,
  pub enqueued_at: String,
  pub attempts:    i64,
}

impl RawJob {
  pub fn into_row(self) -> Result<JobRow> {
    Ok(JobRow {
      id:          Uuid::parse_str(&self.id)?,
      payload:     decode_payload(&self.payload)?,
      enqueued_at: decode_dt(&self.enqueued_at)?,
      attempts:    self.attempts,
    })
  }
}
