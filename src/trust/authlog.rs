//! Correlate an `sshd` pid with its "Accepted publickey" log line.
//!
//! Syslog lines look like
//!
//! ```text
//! Jan  5 10:00:00 host sshd[1234]: Accepted publickey for svc from 10.0.0.5 port 22 ssh2: RSA aa:bb:...:ff
//! ```
//!
//! The line carries no year, so the current one is assumed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{AcsError, Result};

/// `<month> <day> <h>:<m>:<s> <host> <process>[<pid>]: <message>`
static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Z][a-z]{2}) ([ 0-3][0-9]) ([0-9]{2}):([0-9]{2}):([0-9]{2}) (\S+) ([A-Za-z0-9_.-]+)\[([0-9]+)\]: (.*)$",
    )
    .expect("static regex")
});

/// `Accepted publickey for <user> from <ip> port <port> ssh2: <keytype> <fingerprint>`
static ACCEPTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^Accepted publickey for ([-_.a-zA-Z0-9]+) from ([0-9A-Fa-f.:]+) port [0-9]+ ssh2: ([A-Z0-9-]+) ((?:[0-9a-f]{2}:){15}[0-9a-f]{2}|SHA256:[A-Za-z0-9+/]+)$",
    )
    .expect("static regex")
});

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A successful public key login as recorded by `sshd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginEvent {
    pub login_time: DateTime<Local>,
    pub user: String,
    pub source_ip: String,
    pub key_type: String,
    pub fingerprint: String,
}

/// Something that can tell which key authenticated a given `sshd` pid.
#[cfg_attr(test, mockall::automock)]
pub trait LoginEventSource {
    /// The last accepted public key login logged by `pid`.
    fn lookup(&self, pid: u32) -> Result<LoginEvent>;
}

/// Text authentication log, scanned line by line.
#[derive(Debug, Clone)]
pub struct AuthLog {
    path: PathBuf,
    daemon_name: String,
    now: DateTime<Local>,
}

impl AuthLog {
    pub fn new(path: impl Into<PathBuf>, daemon_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            daemon_name: daemon_name.into(),
            now: Local::now(),
        }
    }

    /// Pin the reference time used for year inference.
    pub fn at(mut self, now: DateTime<Local>) -> Self {
        self.now = now;
        self
    }

    fn parse_line(&self, line: &str, pid: u32) -> Option<LoginEvent> {
        let caps = LINE_RE.captures(line)?;
        if &caps[7] != self.daemon_name || caps[8].parse::<u32>().ok()? != pid {
            return None;
        }

        let accepted = ACCEPTED_RE.captures(&caps[9])?;

        let Some(login_time) = self.timestamp(&caps[1], &caps[2], &caps[3], &caps[4], &caps[5])
        else {
            warn!(line, "unparsable timestamp in auth log");
            return None;
        };

        Some(LoginEvent {
            login_time,
            user: accepted[1].to_string(),
            source_ip: accepted[2].to_string(),
            key_type: accepted[3].to_string(),
            fingerprint: accepted[4].to_string(),
        })
    }

    fn timestamp(
        &self,
        month: &str,
        day: &str,
        hour: &str,
        minute: &str,
        second: &str,
    ) -> Option<DateTime<Local>> {
        let month = MONTHS.iter().position(|m| *m == month)? as u32 + 1;
        let day: u32 = day.trim().parse().ok()?;
        let (hour, minute, second): (u32, u32, u32) =
            (hour.parse().ok()?, minute.parse().ok()?, second.parse().ok()?);

        let at_year = |year: i32| {
            NaiveDate::from_ymd_opt(year, month, day)?
                .and_hms_opt(hour, minute, second)
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        };

        let year = self.now.year();
        match at_year(year) {
            // A December login read in early January belongs to last year.
            Some(ts) if ts > self.now + Duration::days(1) => at_year(year - 1),
            other => other,
        }
    }
}

impl LoginEventSource for AuthLog {
    fn lookup(&self, pid: u32) -> Result<LoginEvent> {
        let file = File::open(&self.path).map_err(|e| AcsError::read(&self.path, e))?;
        let mut reader = BufReader::new(file);

        // Other programs log arbitrary bytes here; a line that is not UTF-8
        // must not stop the scan.
        let mut found = None;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| AcsError::read(&self.path, e))?;
            if read == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(event) = self.parse_line(line, pid) {
                debug!(pid, fingerprint = %event.fingerprint, "matching login line");
                found = Some(event);
            }
        }

        found.ok_or_else(|| AcsError::LoginNotFound {
            pid,
            path: self.path.clone(),
        })
    }
}
