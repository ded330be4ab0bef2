// src/exec/command.rs

//! Classification of rule command strings.
//!
//! Each string in a rule's `commands` list is classified exactly once, at
//! configuration load time, into either an internal control command
//! (`:name[!] [args...]`) or an external shell command line.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static INTERNAL_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(:[a-z]+!?)(?:\s+(\S+))*\s*$").expect("internal command regex is valid")
});

/// A classified command from a rule's command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `:name[!] args...`; `name` is stored without the leading `:` and the
    /// trailing `!`.
    Internal {
        name: String,
        args: Vec<String>,
        /// Set by the `!` suffix: do not wait for the action to finish.
        fire_and_forget: bool,
    },
    /// Anything else, run through the platform shell.
    External(String),
}

impl Command {
    pub fn classify(line: &str) -> Self {
        if !INTERNAL_COMMAND.is_match(line) {
            return Command::External(line.to_string());
        }

        let mut tokens = line.split_whitespace();
        let head = tokens.next().unwrap_or_default();
        let head = head.trim_start_matches(':');
        let (name, fire_and_forget) = match head.strip_suffix('!') {
            Some(name) => (name, true),
            None => (head, false),
        };

        Command::Internal {
            name: name.to_string(),
            args: tokens.map(str::to_string).collect(),
            fire_and_forget,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Command::Internal { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Internal {
                name,
                args,
                fire_and_forget,
            } => {
                write!(f, ":{name}")?;
                if *fire_and_forget {
                    f.write_str("!")?;
                }
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            Command::External(line) => f.write_str(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_commands_are_recognised() {
        assert_eq!(
            Command::classify(":reload"),
            Command::Internal {
                name: "reload".into(),
                args: vec![],
                fire_and_forget: false
            }
        );
        assert_eq!(
            Command::classify("  :event! :build  "),
            Command::Internal {
                name: "event".into(),
                args: vec![":build".into()],
                fire_and_forget: true
            }
        );
        assert_eq!(
            Command::classify(":sleep 250"),
            Command::Internal {
                name: "sleep".into(),
                args: vec!["250".into()],
                fire_and_forget: false
            }
        );
    }

    #[test]
    fn everything_else_is_external() {
        for line in ["go build", ":Upper", ": reload", "echo :reload", ":re-load", ":reload!!"] {
            assert_eq!(Command::classify(line), Command::External(line.to_string()));
        }
    }

    #[test]
    fn display_round_trips_the_canonical_form() {
        assert_eq!(Command::classify(":event!   :a").to_string(), ":event! :a");
        assert_eq!(Command::classify("make all").to_string(), "make all");
    }
}
