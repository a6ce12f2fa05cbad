//! SQL schema for the central acre store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per tenant wiki. Rows are never deleted; 'deleted' is a
-- lifecycle state.
CREATE TABLE IF NOT EXISTS wikis (
    dbname                 TEXT PRIMARY KEY,
    sitename               TEXT NOT NULL,
    language               TEXT NOT NULL,
    category               TEXT NOT NULL,
    db_cluster             TEXT NOT NULL,
    server_url             TEXT,
    created_at             TEXT NOT NULL,    -- ISO 8601 UTC; store-assigned
    state                  TEXT NOT NULL DEFAULT 'active',
    state_since            TEXT,             -- NULL iff state = 'active'
    private                INTEGER NOT NULL DEFAULT 0,
    locked                 INTEGER NOT NULL DEFAULT 0,
    experimental           INTEGER NOT NULL DEFAULT 0,
    inactive_exempt        INTEGER NOT NULL DEFAULT 0,
    inactive_exempt_reason TEXT,
    extra                  TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS requests (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    dbname     TEXT NOT NULL,
    sitename   TEXT NOT NULL,
    language   TEXT NOT NULL,
    category   TEXT NOT NULL,
    purpose    TEXT,
    reason     TEXT NOT NULL,
    requester  TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'pending',
    visibility TEXT NOT NULL DEFAULT 'public',
    locked     INTEGER NOT NULL DEFAULT 0,
    private    INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    extra      TEXT NOT NULL DEFAULT '{}'
);

-- At most one open request per target name. The index, not an application
-- pre-check, is what closes the submit race.
CREATE UNIQUE INDEX IF NOT EXISTS requests_inflight_idx
    ON requests(dbname)
    WHERE status IN ('pending', 'onhold', 'moredetails');

CREATE TABLE IF NOT EXISTS comments (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id INTEGER NOT NULL REFERENCES requests(id),
    author     TEXT NOT NULL,
    body       TEXT NOT NULL,
    visibility TEXT NOT NULL DEFAULT 'public',
    created_at TEXT NOT NULL
);

-- Append-only status log. No UPDATE or DELETE is ever issued here.
CREATE TABLE IF NOT EXISTS history (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id INTEGER NOT NULL REFERENCES requests(id),
    actor      TEXT NOT NULL,
    action     TEXT NOT NULL,    -- JSON-encoded HistoryAction
    reason     TEXT,
    created_at TEXT NOT NULL
);

-- Job outbox. Rows are inserted in the same transaction as the change that
-- needs them and claimed by the background runner.
CREATE TABLE IF NOT EXISTS jobs (
    id          TEXT PRIMARY KEY,
    payload     TEXT NOT NULL,   -- JSON-encoded JobPayload
    status      TEXT NOT NULL DEFAULT 'queued',
    enqueued_at TEXT NOT NULL,
    claimed_at  TEXT,
    attempts    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS requests_requester_idx ON requests(requester);
CREATE INDEX IF NOT EXISTS comments_request_idx   ON comments(request_id);
CREATE INDEX IF NOT EXISTS history_request_idx    ON history(request_id);
CREATE INDEX IF NOT EXISTS jobs_status_idx        ON jobs(status, enqueued_at);

PRAGMA user_version = 1;
";
