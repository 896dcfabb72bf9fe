//! Rows of the audit store.

use chrono::{DateTime, Utc};

use crate::command::Mode;

/// Input for provisioning a user. Users are normally provisioned
/// out-of-band; this tool only reads them.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Explicit id; `None` lets the store assign one.
    pub id: Option<i64>,
    pub username: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl NewUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_id(id: i64, username: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            ..Self::new(username)
        }
    }
}

/// The most recent proof of possession of a public key.
///
/// Keyed by the legacy colon-hex fingerprint; replaced wholesale on every
/// login so `last_login` and `comment` always describe the latest use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub fingerprint: String,
    pub owner: i64,
    pub key_type: String,
    pub blob: String,
    pub comment: String,
    pub last_login: DateTime<Utc>,
}

/// An audit row about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub invocation_time: DateTime<Utc>,
    pub login_time: DateTime<Utc>,
    pub owner: i64,
    pub source_ip: String,
    pub fingerprint: String,
    pub mode: Mode,
    pub message: String,
}

/// An appended audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    pub invocation_time: DateTime<Utc>,
    pub login_time: DateTime<Utc>,
    pub owner: i64,
    pub source_ip: String,
    pub fingerprint: String,
    /// Raw mode code; rows written by older tools may hold codes outside [`Mode`].
    pub mode_code: i64,
    pub message: String,
}

impl LogEntry {
    pub fn mode(&self) -> Option<Mode> {
        Mode::from_code(self.mode_code)
    }
}
