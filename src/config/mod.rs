//! TOML configuration.
//!
//! Every key has a default matching a stock Debian deployment, so the tool
//! runs without a config file at all.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AcsError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/access-control-system.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SshConfig {
    /// Process name of the SSH daemon, both in `/proc` and in the auth log.
    #[serde(default = "default_daemon_name")]
    pub daemon_name: String,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    #[serde(default = "default_authorized_keys")]
    pub authorized_keys: PathBuf,

    /// Root of the process table; only changed for tests or containers.
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_daemon_name() -> String {
    "sshd".to_string()
}
fn default_log_file() -> PathBuf {
    PathBuf::from("/var/log/auth.log")
}
fn default_authorized_keys() -> PathBuf {
    PathBuf::from("/home/keyholder/.ssh/authorized_keys")
}
fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}
fn default_database() -> PathBuf {
    PathBuf::from("/var/lib/access-control-system/acs.sqlite")
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("/run/access-control-system")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            daemon_name: default_daemon_name(),
            log_file: default_log_file(),
            authorized_keys: default_authorized_keys(),
            proc_root: default_proc_root(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(AcsError::read(path, e)),
        };

        let config = Self::from_toml(&content)
            .map_err(|e| AcsError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse a config document and expand `~` and `$VAR` in its paths.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| AcsError::Config(e.to_string()))?;
        config.expand_paths()?;
        Ok(config)
    }

    fn expand_paths(&mut self) -> Result<()> {
        for path in [
            &mut self.ssh.log_file,
            &mut self.ssh.authorized_keys,
            &mut self.ssh.proc_root,
            &mut self.store.database,
            &mut self.state.dir,
        ] {
            *path = expand_path(path)?;
        }
        Ok(())
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .map_err(|e| AcsError::Config(format!("cannot expand {raw}: {e}")))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
