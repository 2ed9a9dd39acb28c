//! The `%` command table.
//!
//! Parsing turns a directive's parts into a typed [`Command`]; carrying it
//! out is the session's job.

use crate::error::DirectiveError;

/// Markdown shown by `%help`.
pub const HELP: &str = include_str!("help.md");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Program arguments for runs. `entry` is set for `%%` / `%main`,
    /// which also open the entry point.
    Args { args: Vec<String>, entry: bool },
    /// Set a variable, or show it when no value is given.
    Env { name: String, value: Option<String> },
    /// Change the working directory, or show it.
    Cd(Option<String>),
    AutoGet(bool),
    List,
    Remove(Vec<String>),
    /// Forget all declarations and start a new `go.mod`; with
    /// `manifest_only` only the latter.
    Reset { manifest_only: bool },
    /// Track paths, or list tracked paths when none are given.
    Track(Vec<String>),
    Untrack(Vec<String>),
    GoWorkFix,
    Help,
}

type ParseFn = fn(&str, &[String]) -> Result<Command, DirectiveError>;

pub struct CommandSpec {
    pub names: &'static [&'static str],
    pub usage: &'static str,
    pub summary: &'static str,
    parse: ParseFn,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        names: &["%", "main"],
        usage: "%% [ARGS...]",
        summary: "start the body of main(); ARGS become program arguments",
        parse: |_, args| {
            Ok(Command::Args {
                args: args.to_vec(),
                entry: true,
            })
        },
    },
    CommandSpec {
        names: &["args"],
        usage: "%args [ARGS...]",
        summary: "set program arguments for later runs",
        parse: |_, args| {
            Ok(Command::Args {
                args: args.to_vec(),
                entry: false,
            })
        },
    },
    CommandSpec {
        names: &["env"],
        usage: "%env NAME [VALUE]",
        summary: "set or show an environment variable",
        parse: parse_env,
    },
    CommandSpec {
        names: &["cd"],
        usage: "%cd [DIR]",
        summary: "change or show the working directory",
        parse: |name, args| match args {
            [] => Ok(Command::Cd(None)),
            [dir] => Ok(Command::Cd(Some(dir.clone()))),
            _ => Err(DirectiveError::usage(name, "takes at most one directory")),
        },
    },
    CommandSpec {
        names: &["autoget"],
        usage: "%autoget",
        summary: "fetch missing modules before each build",
        parse: |name, args| no_args(name, args, Command::AutoGet(true)),
    },
    CommandSpec {
        names: &["noautoget"],
        usage: "%noautoget",
        summary: "stop fetching modules automatically",
        parse: |name, args| no_args(name, args, Command::AutoGet(false)),
    },
    CommandSpec {
        names: &["ls", "list"],
        usage: "%ls",
        summary: "list memorized declarations",
        parse: |name, args| no_args(name, args, Command::List),
    },
    CommandSpec {
        names: &["rm", "remove"],
        usage: "%rm NAME...",
        summary: "forget memorized declarations",
        parse: |name, args| {
            if args.is_empty() {
                return Err(DirectiveError::usage(name, "expected at least one name"));
            }
            Ok(Command::Remove(args.to_vec()))
        },
    },
    CommandSpec {
        names: &["reset"],
        usage: "%reset [go.mod]",
        summary: "forget everything, or only reset go.mod",
        parse: |name, args| match args {
            [] => Ok(Command::Reset {
                manifest_only: false,
            }),
            [only] if only == "go.mod" => Ok(Command::Reset {
                manifest_only: true,
            }),
            _ => Err(DirectiveError::usage(
                name,
                "only takes the optional parameter \"go.mod\"",
            )),
        },
    },
    CommandSpec {
        names: &["track"],
        usage: "%track [PATH...]",
        summary: "track files or directories for editor support",
        parse: |_, args| Ok(Command::Track(args.to_vec())),
    },
    CommandSpec {
        names: &["untrack"],
        usage: "%untrack PATH...",
        summary: "stop tracking; a trailing `...` untracks everything below",
        parse: |name, args| {
            if args.is_empty() {
                return Err(DirectiveError::usage(name, "expected at least one path"));
            }
            Ok(Command::Untrack(args.to_vec()))
        },
    },
    CommandSpec {
        names: &["goworkfix"],
        usage: "%goworkfix",
        summary: "add go.mod replace rules for modules used in go.work",
        parse: |name, args| no_args(name, args, Command::GoWorkFix),
    },
    CommandSpec {
        names: &["help"],
        usage: "%help",
        summary: "show this help",
        parse: |_, _| Ok(Command::Help),
    },
];

fn no_args(name: &str, args: &[String], command: Command) -> Result<Command, DirectiveError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(DirectiveError::usage(name, "takes no arguments"))
    }
}

fn parse_env(name: &str, args: &[String]) -> Result<Command, DirectiveError> {
    let (var, value) = match args {
        [single] => match single.split_once('=') {
            Some((var, value)) => (var.to_string(), Some(value.to_string())),
            None => (single.clone(), None),
        },
        [var, value] => (var.clone(), Some(value.clone())),
        _ => return Err(DirectiveError::usage(name, "expected NAME [VALUE]")),
    };
    if var.is_empty() || var.contains(['=', '\0']) {
        return Err(DirectiveError::usage(name, format!("invalid variable name {var:?}")));
    }
    Ok(Command::Env { name: var, value })
}

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.names.contains(&name))
}

/// Parse directive parts (command name first, sigil already removed).
pub fn parse(parts: &[String]) -> Result<Command, DirectiveError> {
    let Some((name, args)) = parts.split_first() else {
        return Err(DirectiveError::usage("", "empty directive"));
    };
    match lookup(name) {
        Some(spec) => (spec.parse)(name, args),
        None => Err(DirectiveError::Unknown(name.clone())),
    }
}

/// One line per command, for terminals.
pub fn summary_table() -> String {
    let width = COMMANDS.iter().map(|c| c.usage.len()).max().unwrap_or(0);
    COMMANDS
        .iter()
        .map(|c| format!("  {:<width$}  {}\n", c.usage, c.summary))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellgo_synth::split_cmd;

    fn parse_str(s: &str) -> Result<Command, DirectiveError> {
        parse(&split_cmd(s))
    }

    #[test]
    fn entry_marker_carries_args() {
        assert_eq!(
            parse_str("% --name \"a b\"").unwrap(),
            Command::Args {
                args: vec!["--name".into(), "a b".into()],
                entry: true
            }
        );
        assert_eq!(
            parse_str("args").unwrap(),
            Command::Args {
                args: vec![],
                entry: false
            }
        );
    }

    #[test]
    fn env_forms() {
        assert_eq!(
            parse_str("env FOO bar").unwrap(),
            Command::Env {
                name: "FOO".into(),
                value: Some("bar".into())
            }
        );
        assert_eq!(
            parse_str("env FOO=bar=baz").unwrap(),
            Command::Env {
                name: "FOO".into(),
                value: Some("bar=baz".into())
            }
        );
        assert_eq!(
            parse_str("env FOO").unwrap(),
            Command::Env {
                name: "FOO".into(),
                value: None
            }
        );
        assert!(matches!(parse_str("env"), Err(DirectiveError::Usage { .. })));
        assert!(parse_str("env A B C").is_err());
    }

    #[test]
    fn reset_variants() {
        assert_eq!(
            parse_str("reset").unwrap(),
            Command::Reset {
                manifest_only: false
            }
        );
        assert_eq!(
            parse_str("reset go.mod").unwrap(),
            Command::Reset {
                manifest_only: true
            }
        );
        assert!(parse_str("reset go.sum").is_err());
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(parse_str("list").unwrap(), Command::List);
        assert_eq!(parse_str("ls").unwrap(), Command::List);
        assert_eq!(
            parse_str("remove a Kg.Gain").unwrap(),
            Command::Remove(vec!["a".into(), "Kg.Gain".into()])
        );
        assert_eq!(parse_str("main").unwrap(), parse_str("%").unwrap());
    }

    #[test]
    fn usage_errors() {
        assert!(parse_str("rm").is_err());
        assert!(parse_str("untrack").is_err());
        assert!(parse_str("cd a b").is_err());
        assert!(parse_str("autoget now").is_err());
    }

    #[test]
    fn unknown_is_reported_by_name() {
        match parse_str("frobnicate x") {
            Err(DirectiveError::Unknown(name)) => assert_eq!(name, "frobnicate"),
            other => panic!("expected unknown directive, got {other:?}"),
        }
    }

    #[test]
    fn help_mentions_every_command() {
        for spec in COMMANDS {
            for name in spec.names {
                let needle = format!("%{name}");
                assert!(HELP.contains(&needle), "help.md does not mention {needle}");
            }
        }
        assert!(summary_table().contains("%goworkfix"));
    }
}
