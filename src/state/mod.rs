//! Space state projected into a directory of one-line text files.
//!
//! An external forwarder watches the directory and republishes changes on
//! the message bus. Every write goes to a hidden `.<name>.tmp` sibling first
//! and is renamed over the target, so the forwarder never reads a torn file.

mod lock;

pub use lock::{StateLock, StateLockGuard};

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{Command, Door, Mode};
use crate::error::{AcsError, Result};
use crate::trust::Identity;

pub const KEYHOLDER_ID: &str = "keyholder-id";
pub const KEYHOLDER_NAME: &str = "keyholder-name";
pub const STATUS: &str = "status";
pub const STATUS_NEXT: &str = "status-next";
pub const MESSAGE: &str = "message";
pub const OPEN_DOOR: &str = "open-door";

/// Contents of the state directory, newline-stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceState {
    pub keyholder_id: String,
    pub keyholder_name: String,
    pub status: String,
    pub status_next: String,
    pub message: String,
    /// Door named by a pending open request the forwarder has not consumed yet.
    pub open_door: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist yet.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| AcsError::state_write(&self.root, e))
    }

    /// Write the effect of `command` to staged files without touching the
    /// visible state. Nothing is visible until [`StagedState::publish`].
    pub fn stage(&self, command: &Command, keyholder: &Identity) -> Result<StagedState> {
        let mut staged = StagedState::default();
        match command {
            Command::SetStatus { mode, message } => {
                self.stage_keyholder(&mut staged, keyholder, message)?;
                staged.push(self.stage_file(STATUS_NEXT, "")?);
                staged.push(self.stage_file(STATUS, mode.as_str())?);
            }
            Command::SetNextStatus { mode, message } => {
                self.stage_keyholder(&mut staged, keyholder, message)?;
                staged.push(self.stage_file(STATUS_NEXT, mode.as_str())?);
            }
            Command::OpenDoor { door } => {
                staged.push(self.stage_file(OPEN_DOOR, door.as_str())?);
            }
        }
        Ok(staged)
    }

    pub fn set_status(&self, keyholder: &Identity, mode: Mode, message: &str) -> Result<()> {
        let command = Command::SetStatus {
            mode,
            message: message.to_string(),
        };
        self.stage(&command, keyholder)?.publish()
    }

    pub fn set_next_status(&self, keyholder: &Identity, mode: Mode, message: &str) -> Result<()> {
        let command = Command::SetNextStatus {
            mode,
            message: message.to_string(),
        };
        self.stage(&command, keyholder)?.publish()
    }

    pub fn open_door(&self, keyholder: &Identity, door: Door) -> Result<()> {
        self.stage(&Command::OpenDoor { door }, keyholder)?.publish()
    }

    pub fn read(&self) -> Result<SpaceState> {
        Ok(SpaceState {
            keyholder_id: self.read_field(KEYHOLDER_ID)?.unwrap_or_default(),
            keyholder_name: self.read_field(KEYHOLDER_NAME)?.unwrap_or_default(),
            status: self.read_field(STATUS)?.unwrap_or_default(),
            status_next: self.read_field(STATUS_NEXT)?.unwrap_or_default(),
            message: self.read_field(MESSAGE)?.unwrap_or_default(),
            open_door: self.read_field(OPEN_DOOR)?,
        })
    }

    fn stage_keyholder(
        &self,
        staged: &mut StagedState,
        keyholder: &Identity,
        message: &str,
    ) -> Result<()> {
        staged.push(self.stage_file(KEYHOLDER_ID, &keyholder.user_id.to_string())?);
        staged.push(self.stage_file(KEYHOLDER_NAME, &keyholder.username)?);
        staged.push(self.stage_file(MESSAGE, message)?);
        Ok(())
    }

    fn stage_file(&self, name: &str, line: &str) -> Result<StagedFile> {
        let target = self.root.join(name);
        let staged = self.root.join(format!(".{name}.tmp"));
        fs::write(&staged, format!("{line}\n")).map_err(|e| AcsError::state_write(&staged, e))?;
        Ok(StagedFile { staged, target })
    }

    fn read_field(&self, name: &str) -> Result<Option<String>> {
        let path = self.root.join(name);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AcsError::read(path, e)),
        }
    }
}

#[derive(Debug)]
struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
}

/// State files written but not yet visible.
///
/// Dropping without [`StagedState::publish`] removes the staged files.
#[derive(Debug, Default)]
pub struct StagedState {
    files: VecDeque<StagedFile>,
}

impl StagedState {
    fn push(&mut self, file: StagedFile) {
        self.files.push_back(file);
    }

    /// Rename every staged file over its target, in staging order.
    ///
    /// Stops at the first failure. Files renamed before it stay published;
    /// the failed and remaining staged files are removed.
    pub fn publish(mut self) -> Result<()> {
        while let Some(file) = self.files.pop_front() {
            if let Err(e) = fs::rename(&file.staged, &file.target) {
                let _ = fs::remove_file(&file.staged);
                return Err(AcsError::state_write(file.target, e));
            }
            debug!(file = %file.target.display(), "state published");
        }
        Ok(())
    }
}

impl Drop for StagedState {
    fn drop(&mut self) {
        for file in &self.files {
            let _ = fs::remove_file(&file.staged);
        }
    }
}
