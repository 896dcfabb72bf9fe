//! Interactive prompt, for debugging a deployment by hand.

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use acs_keyholder::command::CommandError;
use acs_keyholder::error::AcsError;

pub const PROMPT: &str = "acs> ";

/// Prompt until a non-blank line is entered.
pub fn read_command() -> Result<String> {
    let mut rl = DefaultEditor::new()?;
    next_command(|prompt| rl.readline(prompt))
}

fn next_command(
    mut readline: impl FnMut(&str) -> std::result::Result<String, ReadlineError>,
) -> Result<String> {
    loop {
        match readline(PROMPT) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => return Ok(line),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                return Err(AcsError::from(CommandError::UnknownCommand(String::new())).into());
            }
            Err(err) => return Err(err.into()),
        }
    }
}
