//! One keyholder invocation, from command line to published state.
//!
//! ```text
//! parse ─▶ sshd pid ─▶ login event ─▶ authorized key ─▶ lock ─▶ identity
//!                                                                   │
//!   publish state ◀── commit ◀── stage state ◀── log row ◀── key row ◀┘
//! ```
//!
//! Nothing is written until the key is proven: a rejected caller leaves no
//! lock file and no state directory behind. Everything before `commit` is
//! undone on failure: the store transaction rolls back and staged state files
//! are removed. The lock sits next to the database, outside the watched state
//! directory, and is held from identity lookup to publish.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::audit::{AuditStore, KeyRecord, NewLogEntry};
use crate::command::{self, Command};
use crate::config::Config;
use crate::error::Result;
use crate::state::{StateDir, StateLock};
use crate::trust::{
    AuthLog, AuthorizedKeys, Identity, LoginEventSource, ProcessAncestry, resolve_identity,
};

/// Context threaded through every stage of an invocation.
pub struct Invocation<L> {
    ancestry: ProcessAncestry,
    logins: L,
    authorized_keys: AuthorizedKeys,
    database: PathBuf,
    state: StateDir,
}

impl Invocation<AuthLog> {
    /// Wire every stage to the host resources named in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ProcessAncestry::current(&config.ssh.proc_root, &config.ssh.daemon_name),
            AuthLog::new(&config.ssh.log_file, &config.ssh.daemon_name),
            AuthorizedKeys::new(&config.ssh.authorized_keys),
            config.store.database.clone(),
            StateDir::new(&config.state.dir),
        )
    }
}

impl<L: LoginEventSource> Invocation<L> {
    pub fn new(
        ancestry: ProcessAncestry,
        logins: L,
        authorized_keys: AuthorizedKeys,
        database: PathBuf,
        state: StateDir,
    ) -> Self {
        Self {
            ancestry,
            logins,
            authorized_keys,
            database,
            state,
        }
    }

    /// Parse `line` and run it. A parse error has no side effects.
    pub fn run_line(&self, line: &str) -> Result<Outcome> {
        let command = command::parse(line)?;
        self.run(command)
    }

    pub fn run(&self, command: Command) -> Result<Outcome> {
        let pid = self.ancestry.resolve()?;
        let login = self.logins.lookup(pid)?;
        debug!(
            pid,
            fingerprint = %login.fingerprint,
            source_ip = %login.source_ip,
            "login found"
        );

        let key = self.authorized_keys.find(&login.fingerprint)?;

        let _lock = StateLock::new(lock_path(&self.database)).acquire()?;
        let mut store = AuditStore::open(&self.database)?;
        let identity = resolve_identity(&key.comment, &store)?;
        info!(
            user = %identity.username,
            id = identity.user_id,
            source_ip = %login.source_ip,
            "keyholder identified"
        );

        let now = Utc::now();
        let login_time: DateTime<Utc> = login.login_time.with_timezone(&Utc);

        let batch = store.begin()?;
        batch.upsert_key(&KeyRecord {
            fingerprint: key.fingerprint.clone(),
            owner: identity.user_id,
            key_type: key.key_type.clone(),
            blob: key.blob.clone(),
            comment: key.comment.clone(),
            last_login: login_time,
        })?;

        let log_id = match command.logged_mode() {
            Some(mode) => Some(batch.insert_log(&NewLogEntry {
                invocation_time: now,
                login_time,
                owner: identity.user_id,
                source_ip: login.source_ip.clone(),
                fingerprint: key.fingerprint.clone(),
                mode,
                message: command.message().to_string(),
            })?),
            None => None,
        };

        self.state.ensure()?;
        let staged = self.state.stage(&command, &identity)?;
        batch.commit()?;
        staged.publish()?;

        info!(command = %command, user = %identity.username, "applied");
        Ok(Outcome {
            keyholder: identity,
            command,
            log_id,
        })
    }
}

/// `<database>.lock`, beside the store it guards.
fn lock_path(database: &Path) -> PathBuf {
    let mut path = OsString::from(database.as_os_str());
    path.push(".lock");
    PathBuf::from(path)
}

/// What an invocation did, printed to stdout on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub keyholder: Identity,
    pub command: Command,
    /// Audit row id; `None` for commands that are not logged.
    pub log_id: Option<i64>,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.command {
            Command::OpenDoor { door } => writeln!(f, "open door: {door}"),
            Command::SetStatus { mode, message } | Command::SetNextStatus { mode, message } => {
                let label = match self.command {
                    Command::SetStatus { .. } => "Status:     ",
                    _ => "Next-Status:",
                };
                writeln!(
                    f,
                    "Keyholder:   {} ({})",
                    self.keyholder.username, self.keyholder.user_id
                )?;
                writeln!(f, "{label} {mode} ({})", mode.code())?;
                writeln!(f, "Message:     {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NewUser;
    use crate::command::{Door, Mode};
    use crate::error::AcsError;
    use crate::state::SpaceState;
    use crate::trust::{
        LoginEvent, MockLoginEventSource, fake_blob, fake_fingerprint, fake_process,
    };
    use chrono::{Local, TimeZone};
    use std::fs;

    const LOG_LINE: &str = "Jan 05 10:00:00 host sshd[1234]: Accepted publickey for svc from 10.0.0.5 port 22 ssh2: RSA";

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
        fingerprint: String,
    }

    impl Fixture {
        /// init(1) -> sshd(1234) -> sshd(1300) -> bash(1301) -> acs(1302),
        /// alice (id 7) and bob (id 9) provisioned. The auth log names the
        /// key of seed 1; alice's authorized key uses `authorized_seed`.
        fn new(authorized_seed: u8) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path().to_path_buf();

            let proc_root = root.join("proc");
            fake_process(&proc_root, 1, "systemd", 0);
            fake_process(&proc_root, 1234, "sshd", 1);
            fake_process(&proc_root, 1300, "sshd", 1234);
            fake_process(&proc_root, 1301, "bash", 1300);
            fake_process(&proc_root, 1302, "acs-keyholder", 1301);

            let fingerprint = fake_fingerprint(1);
            fs::write(
                root.join("auth.log"),
                format!(
                    "Jan 05 09:59:58 host sshd[1234]: Connection from 10.0.0.5 port 22\n\
                     {LOG_LINE} {fingerprint}\n\
                     Jan 05 10:00:01 host sshd[999]: Accepted publickey for svc from 10.9.9.9 port 22 ssh2: RSA {fingerprint}\n"
                ),
            )
            .unwrap();

            fs::write(
                root.join("authorized_keys"),
                format!(
                    "# keyholders\nssh-ed25519 {} bob@desk\ncommand=\"/usr/bin/acs-keyholder\",no-pty ssh-ed25519 {} alice@laptop\n",
                    fake_blob(9),
                    fake_blob(authorized_seed)
                ),
            )
            .unwrap();

            let store = AuditStore::open(&root.join("acs.sqlite")).unwrap();
            store.insert_user(&NewUser::with_id(7, "alice")).unwrap();
            store.insert_user(&NewUser::with_id(9, "bob")).unwrap();

            Self {
                _tmp: tmp,
                root,
                fingerprint,
            }
        }

        fn invocation(&self) -> Invocation<AuthLog> {
            let now = Local.with_ymd_and_hms(2026, 1, 5, 10, 0, 5).unwrap();
            Invocation::new(
                ProcessAncestry::current(self.root.join("proc"), "sshd").with_start(1302, false),
                AuthLog::new(self.root.join("auth.log"), "sshd").at(now),
                AuthorizedKeys::new(self.root.join("authorized_keys")),
                self.root.join("acs.sqlite"),
                StateDir::new(self.root.join("state")),
            )
        }

        fn store(&self) -> AuditStore {
            AuditStore::open(&self.root.join("acs.sqlite")).unwrap()
        }

        fn state(&self) -> SpaceState {
            StateDir::new(self.root.join("state")).read().unwrap()
        }
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn set_status_end_to_end() {
        let fx = Fixture::new(1);
        let outcome = fx
            .invocation()
            .run_line("set-status keyholder \"on site\"")
            .unwrap();

        assert_eq!(outcome.keyholder.user_id, 7);
        assert_eq!(outcome.keyholder.username, "alice");
        assert!(outcome.log_id.is_some());

        let store = fx.store();
        let key = store.key(&fx.fingerprint).unwrap().unwrap();
        assert_eq!(key.owner, 7);
        assert_eq!(key.comment, "alice@laptop");
        assert_eq!(key.key_type, "ssh-ed25519");
        assert_eq!(
            key.last_login,
            Local
                .with_ymd_and_hms(2026, 1, 5, 10, 0, 0)
                .unwrap()
                .with_timezone(&Utc)
        );

        let log = store.log_entries().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].owner, 7);
        assert_eq!(log[0].mode(), Some(Mode::Keyholder));
        assert_eq!(log[0].source_ip, "10.0.0.5");
        assert_eq!(log[0].fingerprint, fx.fingerprint);
        assert_eq!(log[0].message, "on site");

        let state = fx.state();
        assert_eq!(state.keyholder_id, "7");
        assert_eq!(state.keyholder_name, "alice");
        assert_eq!(state.status, "keyholder");
        assert_eq!(state.message, "on site");
        assert_eq!(state.status_next, "");
    }

    #[test]
    fn set_next_status_logs_next_mode() {
        let fx = Fixture::new(1);
        fx.invocation().run_line("set-next-status none bye").unwrap();

        let log = fx.store().log_entries().unwrap();
        assert_eq!(log[0].mode(), Some(Mode::None));

        let state = fx.state();
        assert_eq!(state.status_next, "none");
        assert_eq!(state.status, "");
    }

    #[test]
    fn open_door_records_key_without_log_row() {
        let fx = Fixture::new(1);
        let outcome = fx.invocation().run_line("open-door main").unwrap();
        assert_eq!(outcome.log_id, None);

        let store = fx.store();
        assert!(store.key(&fx.fingerprint).unwrap().is_some());
        assert!(store.log_entries().unwrap().is_empty());

        let state = fx.state();
        assert_eq!(state.open_door.as_deref(), Some("main"));
        assert_eq!(state.status, "");
    }

    #[test]
    fn unknown_key_has_no_side_effects() {
        let fx = Fixture::new(2);
        let err = fx
            .invocation()
            .run_line("set-status keyholder \"on site\"")
            .unwrap_err();
        assert!(matches!(err, AcsError::KeyNotFound { .. }));

        let store = fx.store();
        assert!(store.key(&fx.fingerprint).unwrap().is_none());
        assert!(store.log_entries().unwrap().is_empty());
        assert!(!fx.root.join("state").exists());
        assert!(!fx.root.join("acs.sqlite.lock").exists());
    }

    #[test]
    fn lock_file_lives_beside_the_database() {
        let fx = Fixture::new(1);
        fx.invocation().run_line("set-status open").unwrap();

        assert!(fx.root.join("acs.sqlite.lock").exists());
        assert!(file_names(&fx.root.join("state")).iter().all(|n| !n.starts_with('.')));
    }

    #[test]
    fn staging_failure_rolls_back_the_store() {
        let fx = Fixture::new(1);
        let state = fx.root.join("state");
        fs::create_dir_all(state.join(".status.tmp")).unwrap();

        let err = fx
            .invocation()
            .run_line("set-status keyholder \"on site\"")
            .unwrap_err();
        assert!(matches!(err, AcsError::StateWrite { .. }));

        let store = fx.store();
        assert!(store.key(&fx.fingerprint).unwrap().is_none());
        assert!(store.log_entries().unwrap().is_empty());
        assert_eq!(file_names(&state), vec![".status.tmp"]);
    }

    #[test]
    fn publish_failure_after_commit_keeps_the_audit_trail() {
        let fx = Fixture::new(1);
        let state = fx.root.join("state");
        fs::create_dir_all(state.join("status-next")).unwrap();

        let err = fx
            .invocation()
            .run_line("set-status keyholder \"on site\"")
            .unwrap_err();
        assert!(matches!(err, AcsError::StateWrite { .. }));

        let store = fx.store();
        assert!(store.key(&fx.fingerprint).unwrap().is_some());
        let log = store.log_entries().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].mode(), Some(Mode::Keyholder));

        let names = file_names(&state);
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
        assert!(!names.contains(&"status".to_string()));
    }

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            lock_path(Path::new("/var/lib/acs/acs.sqlite")),
            PathBuf::from("/var/lib/acs/acs.sqlite.lock")
        );
    }

    #[test]
    fn invalid_door_has_no_side_effects() {
        let fx = Fixture::new(1);
        let err = fx.invocation().run_line("open-door spaceship").unwrap_err();
        assert!(matches!(err, AcsError::InvalidCommand(_)));

        assert!(!fx.root.join("state").exists());
        assert!(fx.store().key(&fx.fingerprint).unwrap().is_none());
    }

    #[test]
    fn missing_ssh_ancestor_is_rejected() {
        let fx = Fixture::new(1);
        let invocation = Invocation::new(
            ProcessAncestry::current(fx.root.join("proc"), "sshd").with_start(1, false),
            AuthLog::new(fx.root.join("auth.log"), "sshd"),
            AuthorizedKeys::new(fx.root.join("authorized_keys")),
            fx.root.join("acs.sqlite"),
            StateDir::new(fx.root.join("state")),
        );

        let err = invocation.run_line("open-door glass").unwrap_err();
        assert!(matches!(err, AcsError::NoSshAncestor));
    }

    #[test]
    fn mocked_login_source_drives_identity() {
        let fx = Fixture::new(1);
        let fingerprint = fx.fingerprint.clone();

        let mut logins = MockLoginEventSource::new();
        logins
            .expect_lookup()
            .withf(|pid| *pid == 1234)
            .times(1)
            .returning(move |_| {
                Ok(LoginEvent {
                    login_time: Local.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap(),
                    user: "svc".to_string(),
                    source_ip: "2001:db8::1".to_string(),
                    key_type: "RSA".to_string(),
                    fingerprint: fingerprint.clone(),
                })
            });

        let invocation = Invocation::new(
            ProcessAncestry::current(fx.root.join("proc"), "sshd").with_start(1302, false),
            logins,
            AuthorizedKeys::new(fx.root.join("authorized_keys")),
            fx.root.join("acs.sqlite"),
            StateDir::new(fx.root.join("state")),
        );

        invocation
            .run(Command::SetStatus {
                mode: Mode::OpenPlus,
                message: "party".to_string(),
            })
            .unwrap();

        let log = fx.store().log_entries().unwrap();
        assert_eq!(log[0].source_ip, "2001:db8::1");
        assert_eq!(log[0].mode(), Some(Mode::OpenPlus));
    }

    #[test]
    fn unknown_user_is_rejected() {
        let fx = Fixture::new(1);
        fs::write(
            fx.root.join("authorized_keys"),
            format!("ssh-ed25519 {} mallory@evil\n", fake_blob(1)),
        )
        .unwrap();

        let err = fx.invocation().run_line("set-status open").unwrap_err();
        assert!(matches!(err, AcsError::UnknownUser(name) if name == "mallory"));
        assert!(fx.store().log_entries().unwrap().is_empty());
    }

    #[test]
    fn summary_lines() {
        let keyholder = Identity {
            user_id: 7,
            username: "alice".to_string(),
        };
        let status = Outcome {
            keyholder: keyholder.clone(),
            command: Command::SetStatus {
                mode: Mode::Open,
                message: "hi".to_string(),
            },
            log_id: Some(1),
        };
        assert_eq!(
            status.to_string(),
            "Keyholder:   alice (7)\nStatus:      open (4)\nMessage:     hi\n"
        );

        let next = Outcome {
            command: Command::SetNextStatus {
                mode: Mode::None,
                message: String::new(),
            },
            ..status.clone()
        };
        assert!(next.to_string().contains("Next-Status: none (1)\n"));

        let door = Outcome {
            keyholder,
            command: Command::OpenDoor { door: Door::Glass },
            log_id: None,
        };
        assert_eq!(door.to_string(), "open door: glass\n");
    }
}
