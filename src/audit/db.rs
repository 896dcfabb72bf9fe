//! SQLite-backed audit store.
//!
//! Three tables: `user` (provisioned out-of-band, read only here), `key`
//! (one row per fingerprint, replaced on every login) and `log` (append-only
//! audit trail, one row per state-changing invocation).

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::debug;

use super::StoreError;
use super::models::{KeyRecord, LogEntry, NewLogEntry, NewUser};

/// How long a statement waits for a concurrent invocation's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS user (
        id          INTEGER PRIMARY KEY NOT NULL,
        username    TEXT NOT NULL,
        firstname   TEXT,
        lastname    TEXT,
        email       TEXT,
        pw          TEXT
    );

    CREATE TABLE IF NOT EXISTS key (
        fingerprint CHARACTER(48) PRIMARY KEY NOT NULL,
        userid      INTEGER NOT NULL REFERENCES user,
        type        TEXT,
        base64      TEXT NOT NULL,
        comment     TEXT,
        last_login  INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS log (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp       INTEGER NOT NULL,
        login_timestamp INTEGER NOT NULL,
        userid          INTEGER NOT NULL REFERENCES user,
        ip              TEXT,
        key             CHARACTER(48) NOT NULL REFERENCES key,
        mode            INTEGER NOT NULL CHECK (mode BETWEEN 1 AND 5),
        msg             TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_user_username ON user(username);
"#;

pub struct AuditStore {
    conn: Connection,
}

impl AuditStore {
    /// Open (or create) the store at `path` and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create the tables if absent. Safe to call on every invocation.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        debug!("audit schema ready");
        Ok(())
    }

    pub fn user_id(&self, username: &str) -> Result<Option<i64>, StoreError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM user WHERE username = ?1 ORDER BY id LIMIT 1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Provision a user, returning its id.
    pub fn insert_user(&self, user: &NewUser) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO user (id, username, firstname, lastname, email, pw)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.username,
                user.firstname,
                user.lastname,
                user.email,
                user.password_hash,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Replace the row for `key.fingerprint` with `key`, outside a batch.
    #[cfg(test)]
    pub fn upsert_key(&self, key: &KeyRecord) -> Result<(), StoreError> {
        upsert_key(&self.conn, key)
    }

    /// Append an audit row outside a batch, returning its id.
    #[cfg(test)]
    pub fn insert_log(&self, entry: &NewLogEntry) -> Result<i64, StoreError> {
        insert_log(&self.conn, entry)
    }

    pub fn key(&self, fingerprint: &str) -> Result<Option<KeyRecord>, StoreError> {
        let key = self
            .conn
            .query_row(
                "SELECT fingerprint, userid, type, base64, comment, last_login
                 FROM key WHERE fingerprint = ?1",
                params![fingerprint],
                row_to_key,
            )
            .optional()?;
        Ok(key)
    }

    /// The whole audit trail, oldest first.
    pub fn log_entries(&self) -> Result<Vec<LogEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, login_timestamp, userid, ip, key, mode, msg
             FROM log ORDER BY id",
        )?;

        let rows = stmt.query_map([], row_to_log_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Start a write batch. Takes the database write lock immediately so
    /// concurrent invocations queue up here rather than failing mid-way.
    pub fn begin(&mut self) -> Result<AuditBatch<'_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(AuditBatch { tx })
    }
}

/// Key upsert and log insert applied as one transaction.
///
/// Dropping the batch without [`AuditBatch::commit`] rolls both back.
pub struct AuditBatch<'a> {
    tx: Transaction<'a>,
}

impl AuditBatch<'_> {
    pub fn upsert_key(&self, key: &KeyRecord) -> Result<(), StoreError> {
        upsert_key(&self.tx, key)
    }

    pub fn insert_log(&self, entry: &NewLogEntry) -> Result<i64, StoreError> {
        insert_log(&self.tx, entry)
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }
}

fn upsert_key(conn: &Connection, key: &KeyRecord) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO key (fingerprint, userid, type, base64, comment, last_login)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(fingerprint) DO UPDATE SET
            userid = excluded.userid,
            type = excluded.type,
            base64 = excluded.base64,
            comment = excluded.comment,
            last_login = excluded.last_login",
        params![
            key.fingerprint,
            key.owner,
            key.key_type,
            key.blob,
            key.comment,
            key.last_login.timestamp(),
        ],
    )?;
    debug!(fingerprint = %key.fingerprint, owner = key.owner, "key upserted");
    Ok(())
}

fn insert_log(conn: &Connection, entry: &NewLogEntry) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO log (timestamp, login_timestamp, userid, ip, key, mode, msg)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.invocation_time.timestamp(),
            entry.login_time.timestamp(),
            entry.owner,
            entry.source_ip,
            entry.fingerprint,
            entry.mode.code(),
            entry.message,
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, owner = entry.owner, mode = %entry.mode, "audit row appended");
    Ok(id)
}

fn timestamp(idx: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyRecord> {
    let last_login: i64 = row.get(5)?;
    Ok(KeyRecord {
        fingerprint: row.get(0)?,
        owner: row.get(1)?,
        key_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        blob: row.get(3)?,
        comment: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        last_login: timestamp(5, last_login)?,
    })
}

fn row_to_log_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogEntry> {
    let invocation_time: i64 = row.get(1)?;
    let login_time: i64 = row.get(2)?;
    Ok(LogEntry {
        id: row.get(0)?,
        invocation_time: timestamp(1, invocation_time)?,
        login_time: timestamp(2, login_time)?,
        owner: row.get(3)?,
        source_ip: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        fingerprint: row.get(5)?,
        mode_code: row.get(6)?,
        message: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
