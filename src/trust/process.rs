//! Locate the `sshd` process this invocation descends from.
//!
//! A forced command always runs below the `sshd` session that authenticated
//! it. Walking `/proc/<pid>/status` upwards from our own pid is the only
//! evidence we get that the invocation really came from an SSH login.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{AcsError, Result};

/// The bits of `/proc/<pid>/status` the walk needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProcessStatus {
    pub name: String,
    pub ppid: u32,
}

/// Walks the process tree rooted at a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcessAncestry {
    proc_root: PathBuf,
    daemon_name: String,
    start_pid: u32,
    privileged: bool,
}

impl ProcessAncestry {
    /// Walk from the current process, using the effective uid to decide
    /// which `sshd` process logged the login.
    pub fn current(proc_root: impl Into<PathBuf>, daemon_name: impl Into<String>) -> Self {
        Self {
            proc_root: proc_root.into(),
            daemon_name: daemon_name.into(),
            start_pid: std::process::id(),
            privileged: running_as_root(),
        }
    }

    pub fn with_start(mut self, pid: u32, privileged: bool) -> Self {
        self.start_pid = pid;
        self.privileged = privileged;
        self
    }

    /// Pid of the `sshd` process whose login line we need to find.
    ///
    /// Unprivileged, the nearest `sshd` ancestor is the per-session child;
    /// the line was written by its parent, the privileged monitor. Running as
    /// root there is no privilege separation hop, so the match itself is used.
    pub fn resolve(&self) -> Result<u32> {
        let mut pid = self.start_pid;

        while pid > 1 {
            let Some(status) = self.status(pid) else {
                debug!(pid, "process status unreadable, stopping walk");
                break;
            };

            if status.name == self.daemon_name {
                let target = if self.privileged {
                    pid
                } else {
                    status.ppid
                };
                debug!(sshd = pid, target, "found ssh daemon ancestor");
                return Ok(target);
            }

            pid = status.ppid;
        }

        Err(AcsError::NoSshAncestor)
    }

    fn status(&self, pid: u32) -> Option<ProcessStatus> {
        let path = self.proc_root.join(pid.to_string()).join("status");
        fs::read_to_string(&path)
            .ok()
            .and_then(|content| parse_status(&content))
    }
}

/// Parse the `Name:` and `PPid:` fields of a procfs status file.
fn parse_status(content: &str) -> Option<ProcessStatus> {
    let mut name = None;
    let mut ppid = None;

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("Name:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("PPid:") {
            ppid = value.trim().parse().ok();
        }
        if name.is_some() && ppid.is_some() {
            break;
        }
    }

    Some(ProcessStatus {
        name: name?,
        ppid: ppid?,
    })
}

#[cfg(unix)]
fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}
