//! Map a key comment to a known user.
//!
//! The login name in the log is the shared service account; who is really
//! behind the key is recorded in its comment, `user@host` by convention.

use crate::audit::AuditStore;
use crate::error::{AcsError, Result};

/// A user identified by the key they logged in with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
}

/// Text before the first `@`, or the whole comment if there is none.
pub fn username_from_comment(comment: &str) -> &str {
    comment
        .split_once('@')
        .map_or(comment, |(user, _host)| user)
}

pub fn resolve(comment: &str, store: &AuditStore) -> Result<Identity> {
    let username = username_from_comment(comment);
    let user_id = store
        .user_id(username)?
        .ok_or_else(|| AcsError::UnknownUser(username.to_string()))?;

    Ok(Identity {
        user_id,
        username: username.to_string(),
    })
}
