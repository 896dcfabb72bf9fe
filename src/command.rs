//! Keyholder command grammar.
//!
//! ```text
//! set-status      <mode> [message...]
//! set-next-status <mode> [message...]
//! open-door       <door>
//! ```
//!
//! Modes and doors are closed sets; anything outside them is rejected here,
//! before any identity check or write happens.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Space occupancy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    None,
    Keyholder,
    Member,
    Open,
    OpenPlus,
}

/// A door that can be buzzed open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Door {
    Main,
    Glass,
}

/// A parsed keyholder command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetStatus { mode: Mode, message: String },
    SetNextStatus { mode: Mode, message: String },
    OpenDoor { door: Door },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("invalid command: {0:?}\nSupported commands:\n{usage}", usage = usage())]
    UnknownCommand(String),

    #[error("invalid mode: {0:?}\nPossible modes:\n{help}", help = Mode::help())]
    InvalidMode(String),

    #[error("invalid door: {0:?}\nPossible door values:\n{help}", help = Door::help())]
    InvalidDoor(String),
}

/// One entry of a closed keyword set.
struct Keyword<T> {
    name: &'static str,
    value: T,
    description: &'static str,
}

impl<T> Keyword<T> {
    fn help_line(&self) -> String {
        format!("\t{:<10}- {}", self.name, self.description)
    }
}

const MODES: &[Keyword<Mode>] = &[
    Keyword {
        name: "none",
        value: Mode::None,
        description: "space is closed, nobody must be inside",
    },
    Keyword {
        name: "keyholder",
        value: Mode::Keyholder,
        description: "space is closed, keyholder is inside",
    },
    Keyword {
        name: "member",
        value: Mode::Member,
        description: "space is open, but only for members",
    },
    Keyword {
        name: "open",
        value: Mode::Open,
        description: "space is open, guests may ring the bell",
    },
    Keyword {
        name: "open+",
        value: Mode::OpenPlus,
        description: "space is open, everyone can open the door",
    },
];

const DOORS: &[Keyword<Door>] = &[
    Keyword {
        name: "main",
        value: Door::Main,
        description: "main door to space",
    },
    Keyword {
        name: "glass",
        value: Door::Glass,
        description: "glass door to corridor",
    },
];

const SET_STATUS: &str = "set-status";
const SET_NEXT_STATUS: &str = "set-next-status";
const OPEN_DOOR: &str = "open-door";

/// Usage text listing every supported command.
pub fn usage() -> String {
    [
        format!(" {SET_STATUS} <status> [msg]"),
        format!(" {SET_NEXT_STATUS} <status> [msg]"),
        format!(" {OPEN_DOOR} <door>"),
    ]
    .join("\n")
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::None => "none",
            Mode::Keyholder => "keyholder",
            Mode::Member => "member",
            Mode::Open => "open",
            Mode::OpenPlus => "open+",
        }
    }

    /// Numeric code stored in the audit log.
    pub fn code(self) -> i64 {
        match self {
            Mode::None => 1,
            Mode::Keyholder => 2,
            Mode::Member => 3,
            Mode::Open => 4,
            Mode::OpenPlus => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        MODES.iter().map(|k| k.value).find(|m| m.code() == code)
    }

    fn help() -> String {
        MODES
            .iter()
            .map(Keyword::help_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Door {
    pub fn as_str(self) -> &'static str {
        match self {
            Door::Main => "main",
            Door::Glass => "glass",
        }
    }

    fn help() -> String {
        DOORS
            .iter()
            .map(Keyword::help_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Door {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetStatus { mode, message } | Command::SetNextStatus { mode, message } => {
                write!(f, "{} {mode}", self.keyword())?;
                if !message.is_empty() {
                    write!(f, " {message}")?;
                }
                Ok(())
            }
            Command::OpenDoor { door } => write!(f, "{} {door}", self.keyword()),
        }
    }
}

impl FromStr for Mode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MODES
            .iter()
            .find(|k| k.name == s)
            .map(|k| k.value)
            .ok_or_else(|| CommandError::InvalidMode(s.to_string()))
    }
}

impl FromStr for Door {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DOORS
            .iter()
            .find(|k| k.name == s)
            .map(|k| k.value)
            .ok_or_else(|| CommandError::InvalidDoor(s.to_string()))
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl Command {
    /// Mode recorded in the audit log, if this command changes the space state.
    pub fn logged_mode(&self) -> Option<Mode> {
        match self {
            Command::SetStatus { mode, .. } | Command::SetNextStatus { mode, .. } => Some(*mode),
            Command::OpenDoor { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Command::SetStatus { message, .. } | Command::SetNextStatus { message, .. } => message,
            Command::OpenDoor { .. } => "",
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Command::SetStatus { .. } => SET_STATUS,
            Command::SetNextStatus { .. } => SET_NEXT_STATUS,
            Command::OpenDoor { .. } => OPEN_DOOR,
        }
    }
}

/// Parse a single command line.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim_start();
    let (keyword, rest) = match line.find(char::is_whitespace) {
        Some(idx) => (&line[..idx], line[idx..].trim_start()),
        None => (line, ""),
    };

    match keyword {
        SET_STATUS => {
            let (mode, message) = parse_status_args(rest)?;
            Ok(Command::SetStatus { mode, message })
        }
        SET_NEXT_STATUS => {
            let (mode, message) = parse_status_args(rest)?;
            Ok(Command::SetNextStatus { mode, message })
        }
        OPEN_DOOR => Ok(Command::OpenDoor {
            door: rest.trim_end().parse()?,
        }),
        _ => Err(CommandError::UnknownCommand(line.trim_end().to_string())),
    }
}

fn parse_status_args(args: &str) -> Result<(Mode, String), CommandError> {
    let (mode, message) = match args.find(char::is_whitespace) {
        Some(idx) => (&args[..idx], &args[idx..]),
        None => (args, ""),
    };
    Ok((mode.parse()?, unquote(message.trim()).to_string()))
}

/// Strip one pair of matching surrounding quotes.
fn unquote(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2
            && let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote))
        {
            return inner;
        }
    }
    s
}
