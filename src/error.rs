//! Error kinds for a keyholder invocation.
//!
//! Every stage of the trust chain fails with one of these. None of them are
//! retried: the invocation aborts and the binary exits non-zero.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::audit::StoreError;
use crate::command::CommandError;

#[derive(Debug, Error)]
pub enum AcsError {
    #[error("parent ssh daemon not found")]
    NoSshAncestor,

    #[error("could not find login of sshd[{pid}] in {}", path.display())]
    LoginNotFound { pid: u32, path: PathBuf },

    #[error("could not find fingerprint {fingerprint} in authorized keys")]
    KeyNotFound { fingerprint: String },

    #[error("user '{0}' not in database")]
    UnknownUser(String),

    #[error(transparent)]
    InvalidCommand(#[from] CommandError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("could not write state file {}: {source}", path.display())]
    StateWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl AcsError {
    pub(crate) fn state_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StateWrite {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AcsError>;
