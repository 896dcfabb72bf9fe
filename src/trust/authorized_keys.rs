//! Look a fingerprint up in `authorized_keys`.
//!
//! The file is the only authority on which keys exist: the log tells us the
//! fingerprint, but the key and its comment come from here.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use ssh_key::PublicKey;
use tracing::{debug, warn};

use super::fingerprint;
use crate::error::{AcsError, Result};

/// An `authorized_keys` entry that matched a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    pub key_type: String,
    /// Base64 key blob.
    pub blob: String,
    pub comment: String,
    /// Legacy colon-hex fingerprint, used as the key's identity in the store.
    pub fingerprint: String,
}

#[derive(Debug, Clone)]
pub struct AuthorizedKeys {
    path: PathBuf,
}

impl AuthorizedKeys {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// First entry whose key hashes to `fingerprint`.
    pub fn find(&self, fingerprint: &str) -> Result<AuthorizedKey> {
        let file = File::open(&self.path).map_err(|e| AcsError::read(&self.path, e))?;
        let reader = BufReader::new(file);

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| AcsError::read(&self.path, e))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let key = match parse_entry(line) {
                Ok(key) => key,
                Err(e) => {
                    warn!(line = idx + 1, error = %e, "unparsable authorized_keys entry");
                    continue;
                }
            };
            let raw = match key.to_bytes() {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(line = idx + 1, error = %e, "unencodable key in authorized_keys");
                    continue;
                }
            };

            if fingerprint::matches(&key, &raw, fingerprint) {
                debug!(line = idx + 1, comment = key.comment(), "authorized key matched");
                return Ok(AuthorizedKey {
                    key_type: key.algorithm().as_str().to_string(),
                    blob: fingerprint::encode_blob(&raw),
                    comment: key.comment().to_string(),
                    fingerprint: fingerprint::legacy_fingerprint(&raw),
                });
            }
        }

        Err(AcsError::KeyNotFound {
            fingerprint: fingerprint.to_string(),
        })
    }
}

/// Parse `[options] <type> <base64> [comment]`.
fn parse_entry(line: &str) -> ssh_key::Result<PublicKey> {
    match PublicKey::from_openssh(line) {
        Ok(key) => Ok(key),
        Err(e) => match skip_options(line) {
            Some(rest) => PublicKey::from_openssh(rest),
            None => Err(e),
        },
    }
}

/// The text after a leading options field such as
/// `command="/usr/bin/acs-keyholder -v",no-pty`. Whitespace inside double
/// quotes belongs to the options.
fn skip_options(line: &str) -> Option<&str> {
    let mut quoted = false;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                let rest = line[idx..].trim_start();
                return (!rest.is_empty()).then_some(rest);
            }
            _ => {}
        }
    }
    None
}
