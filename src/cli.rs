//! CLI argument parsing
//!
//! Hand-rolled over `std::env::args`: every subcommand takes at most a
//! few flags, and `run` must pass everything after the command name
//! through untouched.

use std::env;

use anyhow::{bail, Result};

use crate::config::Overrides;

pub const USAGE: &str = "\
oscbell - desktop notifications for OSC 9 / OSC 777 terminal escapes

USAGE:
    oscbell [run] [FLAGS] [--] [COMMAND [ARGS...]]
    oscbell watch [--name NAME] [--pane TARGET]
    oscbell focus <URI>
    oscbell enable|disable|reload <INSTANCE>
    oscbell init-config
    oscbell help

RUN FLAGS:
    --no-external      don't send desktop notifications
    --no-in-app        don't draw the in-terminal banner
    --show-progress    also notify on OSC 9;4 progress reports

COMMAND defaults to $SHELL, then /bin/sh.
Logs go to /tmp/oscbell-<instance>.log (filter with OSCBELL_LOG).";

/// Subcommand to run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run a program in a PTY and watch its output
    Run { program: String, args: Vec<String> },
    /// Watch output piped in on stdin (tmux pipe-pane)
    Watch {
        name: Option<String>,
        pane: Option<String>,
    },
    /// Activate a focus deep link
    Focus { uri: String },
    Enable { instance: String },
    Disable { instance: String },
    Reload { instance: String },
    /// Write the current settings to the config file
    InitConfig,
    Help,
}

/// Parsed command-line arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Args {
    pub command: Command,
    /// Flag overrides, applied on top of the environment
    pub overrides: Overrides,
}

pub fn parse_args() -> Result<Args> {
    parse_args_from(env::args().skip(1)) // Skip the binary name
}

fn default_program() -> String {
    env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

pub fn parse_args_from(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut iter = args.into_iter().peekable();
    let mut overrides = Overrides::default();

    let command = match iter.peek().map(String::as_str) {
        Some("help" | "--help" | "-h") => Command::Help,
        Some("init-config") => Command::InitConfig,
        Some("focus") => {
            iter.next();
            let Some(uri) = iter.next() else {
                bail!("focus needs a link, e.g. oscbell://<instance>/focus?tid=<token>");
            };
            Command::Focus { uri }
        }
        Some(verb @ ("enable" | "disable" | "reload")) => {
            let verb = verb.to_string();
            iter.next();
            let Some(instance) = iter.next() else {
                bail!("{} needs an instance id", verb);
            };
            match verb.as_str() {
                "enable" => Command::Enable { instance },
                "disable" => Command::Disable { instance },
                _ => Command::Reload { instance },
            }
        }
        Some("watch") => {
            iter.next();
            let mut name = None;
            let mut pane = None;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--name" | "-n" => name = iter.next(),
                    "--pane" | "-p" => pane = iter.next(),
                    other => bail!("Unknown watch option: {}", other),
                }
            }
            Command::Watch { name, pane }
        }
        _ => {
            if iter.peek().map(String::as_str) == Some("run") {
                iter.next(); // consume "run"
            }
            let mut rest = Vec::new();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--no-external" => overrides.external = Some(false),
                    "--no-in-app" => overrides.in_app = Some(false),
                    "--show-progress" => overrides.show_progress = Some(true),
                    "--" => {
                        rest.extend(iter.by_ref());
                        break;
                    }
                    _ => {
                        // First non-flag starts the command; the rest is its own
                        rest.push(arg);
                        rest.extend(iter.by_ref());
                        break;
                    }
                }
            }
            let mut rest = rest.into_iter();
            let program = rest.next().unwrap_or_else(default_program);
            Command::Run {
                program,
                args: rest.collect(),
            }
        }
    };

    Ok(Args { command, overrides })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        parse_args_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_run_with_flags_and_command() {
        let args = parse(&["--no-in-app", "--show-progress", "make", "-j4", "--no-external"]).unwrap();
        assert_eq!(
            args.command,
            Command::Run {
                program: "make".to_string(),
                args: vec!["-j4".to_string(), "--no-external".to_string()],
            }
        );
        assert_eq!(args.overrides.in_app, Some(false));
        assert_eq!(args.overrides.show_progress, Some(true));
        assert_eq!(args.overrides.external, None);
    }

    #[test]
    fn test_explicit_run_and_separator() {
        let args = parse(&["run", "--no-external", "--", "--weird-name", "x"]).unwrap();
        assert_eq!(
            args.command,
            Command::Run {
                program: "--weird-name".to_string(),
                args: vec!["x".to_string()],
            }
        );
        assert_eq!(args.overrides.external, Some(false));
    }

    #[test]
    fn test_run_defaults_to_a_shell() {
        let args = parse(&[]).unwrap();
        let Command::Run { program, args } = args.command else {
            panic!("expected run");
        };
        assert!(!program.is_empty());
        assert!(args.is_empty());
    }

    #[test]
    fn test_watch() {
        let args = parse(&["watch", "--pane", "%3", "--name", "build"]).unwrap();
        assert_eq!(
            args.command,
            Command::Watch {
                name: Some("build".to_string()),
                pane: Some("%3".to_string()),
            }
        );
        assert!(parse(&["watch", "--bogus"]).is_err());
    }

    #[test]
    fn test_control_commands() {
        assert_eq!(
            parse(&["disable", "ab12"]).unwrap().command,
            Command::Disable {
                instance: "ab12".to_string()
            }
        );
        assert_eq!(
            parse(&["reload", "ab12"]).unwrap().command,
            Command::Reload {
                instance: "ab12".to_string()
            }
        );
        assert!(parse(&["enable"]).is_err());
        assert!(parse(&["focus"]).is_err());
        assert_eq!(parse(&["-h"]).unwrap().command, Command::Help);
        assert_eq!(parse(&["init-config"]).unwrap().command, Command::InitConfig);
    }
}
