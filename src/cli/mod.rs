pub mod shell;

use std::path::PathBuf;

use acs_keyholder::config::DEFAULT_CONFIG_PATH;
use clap::Parser;

#[derive(Parser)]
#[command(name = "acs-keyholder")]
#[command(
    author,
    version,
    about = "Keyholder interface of the access control system",
    long_about = "Identifies the SSH key behind the current session, records the \
                  invocation in the audit store and publishes the requested space \
                  state.\n\nRun as the forced command of the keyholder account. \
                  Without a command, prompts for one."
)]
pub struct Cli {
    /// Command line as passed by a login shell (`sshd` runs `<shell> -c "<cmd>"`)
    #[arg(short = 'c', value_name = "COMMAND", conflicts_with = "words")]
    pub command: Option<String>,

    /// Command given as separate words, e.g. `set-status open back at 9`
    #[arg(value_name = "WORDS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub words: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to config file. Never taken from the environment, which `sshd`
    /// may let the client set.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl Cli {
    /// The command to run, or `None` to prompt for one.
    pub fn command_line(&self) -> Option<String> {
        if let Some(command) = &self.command {
            return Some(command.clone());
        }
        if self.words.is_empty() {
            None
        } else {
            Some(self.words.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("acs-keyholder").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dash_c_takes_whole_command() {
        let cli = parse(&["-c", "set-status open \"see you\""]);
        assert_eq!(
            cli.command_line().as_deref(),
            Some("set-status open \"see you\"")
        );
    }

    #[test]
    fn positional_words_are_joined() {
        let cli = parse(&["set-status", "member", "back", "at", "9"]);
        assert_eq!(
            cli.command_line().as_deref(),
            Some("set-status member back at 9")
        );
    }

    #[test]
    fn single_pretokenized_argument() {
        let cli = parse(&["open-door main"]);
        assert_eq!(cli.command_line().as_deref(), Some("open-door main"));
    }

    #[test]
    fn no_command_means_prompt() {
        let cli = parse(&["--verbose"]);
        assert!(cli.verbose);
        assert_eq!(cli.command_line(), None);
    }

    #[test]
    fn config_path_ignores_environment() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("ACS_CONFIG", "/tmp/attacker.toml") };
        let cli = parse(&["-c", "open-door main"]);
        unsafe { std::env::remove_var("ACS_CONFIG") };

        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(
            parse(&["--config", "/etc/acs.toml"]).config,
            PathBuf::from("/etc/acs.toml")
        );
    }

    #[test]
    fn dash_c_conflicts_with_words() {
        let result = Cli::try_parse_from(["acs-keyholder", "-c", "open-door main", "extra"]);
        assert!(result.is_err());
    }
}
