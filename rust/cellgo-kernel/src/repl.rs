//! Interactive front end: every submitted input is a cell.

use std::fs;
use std::path::{Path, PathBuf};

use rustyline::error::ReadlineError;
use rustyline::history::{History, SearchDirection};
use rustyline::DefaultEditor;

use crate::colors::{bold, paint, Color};
use crate::config::KernelConfig;
use crate::directives::summary_table;
use crate::error::{error_chain, KernelError};
use crate::exec::CancelToken;
use crate::session::{ExecOutcome, Session};
use crate::sink::StdioSink;

const REPL_HISTORY_PATH_ENV: &str = "CELLGO_REPL_HISTORY_PATH";

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Quit,
    Help,
    Render,
    History,
}

#[derive(Debug, PartialEq, Eq)]
enum ParsedCommand {
    NotACommand,
    UnknownCommand,
    Command(ReplCommand),
}

fn parse_repl_command(line: &str) -> ParsedCommand {
    let trimmed = line.trim();
    if !trimmed.starts_with(':') {
        return ParsedCommand::NotACommand;
    }
    match trimmed {
        ":quit" | ":q" => ParsedCommand::Command(ReplCommand::Quit),
        ":help" | ":h" => ParsedCommand::Command(ReplCommand::Help),
        ":render" => ParsedCommand::Command(ReplCommand::Render),
        ":history" => ParsedCommand::Command(ReplCommand::History),
        _ => ParsedCommand::UnknownCommand,
    }
}

pub fn run_repl(config: KernelConfig) -> Result<(), KernelError> {
    let mut session = Session::new(config)?;
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(err) = ctrlc::set_handler(move || cancel.cancel()) {
            tracing::warn!(error = %err, "cannot install Ctrl-C handler");
        }
    }

    eprintln!("{}", bold(&paint(Color::Cyan, "cellgo")));
    eprintln!(
        "{}\n",
        paint(
            Color::Gray,
            "Enter Go declarations or statements after %%. :help for commands, :quit to exit."
        )
    );

    let mut rl = DefaultEditor::new()?;
    let history_path = get_history_path();
    if let Some(path) = history_path.as_deref().filter(|p| p.exists()) {
        if let Err(err) = rl.load_history(path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to load history");
        }
    }

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            format!("{} ", paint(Color::Green, "cellgo>"))
        } else {
            format!("{}    ", paint(Color::Gray, "..."))
        };

        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                if buffer.is_empty() {
                    eprintln!("{}", paint(Color::Gray, "(Ctrl-D to exit)"));
                }
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };

        if buffer.is_empty() {
            match parse_repl_command(&line) {
                ParsedCommand::NotACommand => {}
                ParsedCommand::UnknownCommand => {
                    eprintln!("{} unknown command, try :help", paint(Color::Red, "error:"));
                    continue;
                }
                ParsedCommand::Command(ReplCommand::Quit) => break,
                ParsedCommand::Command(ReplCommand::Help) => {
                    print_help();
                    continue;
                }
                ParsedCommand::Command(ReplCommand::Render) => {
                    match session.last_document() {
                        Some(text) => print!("{text}"),
                        None => eprintln!("{}", paint(Color::Gray, "nothing assembled yet")),
                    }
                    continue;
                }
                ParsedCommand::Command(ReplCommand::History) => {
                    let history = rl.history();
                    for idx in 0..history.len() {
                        if let Ok(Some(result)) = history.get(idx, SearchDirection::Forward) {
                            println!(
                                "{:4} {}",
                                paint(Color::Gray, &(idx + 1).to_string()),
                                result.entry
                            );
                        }
                    }
                    continue;
                }
            }
            if line.trim().is_empty() {
                continue;
            }
        }

        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);
        if needs_more_input(&buffer) {
            continue;
        }

        let cell = std::mem::take(&mut buffer);
        if let Err(err) = rl.add_history_entry(cell.as_str()) {
            tracing::debug!(error = %err, "history entry not added");
        }
        cancel.reset();
        match session.execute(&cell, &mut StdioSink, &cancel) {
            Ok(ExecOutcome::Memorized) => {
                eprintln!("{}", paint(Color::Gray, "memorized"));
            }
            Ok(ExecOutcome::Cancelled) => {
                eprintln!("{}", paint(Color::Yellow, "cancelled"));
            }
            Ok(_) => {}
            Err(err) => eprintln!("{} {}", paint(Color::Red, "error:"), error_chain(&err)),
        }
    }

    if let Some(path) = &history_path {
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::warn!(dir = %parent.display(), error = %err, "cannot create history directory");
            }
        }
        if let Err(err) = rl.save_history(path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to save history");
        }
    }
    Ok(())
}

fn print_help() {
    println!("{}", bold("REPL commands"));
    println!("  :help, :h     show this help");
    println!("  :render       print the last generated main.go");
    println!("  :history      show input history");
    println!("  :quit, :q     exit (or Ctrl-D)");
    println!();
    println!("{}", bold("Directives"));
    print!("{}", summary_table());
    println!();
    println!("Lines starting with ! run in the shell; Ctrl-C stops a running cell.");
}

/// Whether the input so far leaves a brace, bracket or parenthesis open, a
/// raw string unterminated, or ends with a `\` continuation.
fn needs_more_input(input: &str) -> bool {
    if input.trim_end_matches([' ', '\t']).ends_with('\\') {
        return true;
    }

    let mut depth: i32 = 0;
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '`' => {
                if !chars.by_ref().any(|c| c == '`') {
                    return true;
                }
            }
            '"' | '\'' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '\n' => break,
                        c if c == ch => break,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    depth > 0
}

/// Resolve the path to the history file.
///
/// `CELLGO_REPL_HISTORY_PATH` may be absolute, `~/...`, or relative to the
/// home directory. Without it, `~/.cellgo/repl_history`.
fn resolve_history_path(home: Option<&Path>, override_path: Option<&str>) -> Option<PathBuf> {
    let home_path = || home.map(Path::to_path_buf);

    if let Some(raw) = override_path
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        if raw == "~" {
            return home_path();
        }
        if let Some(rest) = raw.strip_prefix("~/") {
            return Some(home_path()?.join(rest));
        }
        let configured = PathBuf::from(raw);
        if configured.is_relative() {
            return Some(home_path()?.join(configured));
        }
        return Some(configured);
    }

    Some(home_path()?.join(".cellgo").join("repl_history"))
}

fn get_history_path() -> Option<PathBuf> {
    let home = dirs::home_dir();
    let override_path = std::env::var(REPL_HISTORY_PATH_ENV).ok();
    resolve_history_path(home.as_deref(), override_path.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_more_input_braces() {
        assert!(needs_more_input("func f() {"));
        assert!(needs_more_input("x := []int{1,\n2"));
        assert!(!needs_more_input("func f() {}"));
        assert!(!needs_more_input("fmt.Println(\"{\")"));
        assert!(!needs_more_input("r := '{'"));
        assert!(!needs_more_input("x := 1 // {"));
    }

    #[test]
    fn test_needs_more_input_continuations() {
        assert!(needs_more_input("%env GOPROXY \\"));
        assert!(needs_more_input("s := `line one"));
        assert!(!needs_more_input("s := `one\ntwo`"));
    }

    #[test]
    fn test_parse_repl_command() {
        assert_eq!(
            parse_repl_command(":q"),
            ParsedCommand::Command(ReplCommand::Quit)
        );
        assert_eq!(
            parse_repl_command("  :render "),
            ParsedCommand::Command(ReplCommand::Render)
        );
        assert_eq!(parse_repl_command(":nope"), ParsedCommand::UnknownCommand);
        assert_eq!(parse_repl_command("%ls"), ParsedCommand::NotACommand);
    }

    #[test]
    fn test_resolve_history_path() {
        let home = Path::new("/home/tester");

        assert_eq!(
            resolve_history_path(Some(home), None),
            Some(PathBuf::from("/home/tester/.cellgo/repl_history"))
        );
        assert_eq!(
            resolve_history_path(Some(home), Some("repl/history.log")),
            Some(PathBuf::from("/home/tester/repl/history.log"))
        );
        assert_eq!(
            resolve_history_path(Some(home), Some("~/logs/repl.log")),
            Some(PathBuf::from("/home/tester/logs/repl.log"))
        );
        assert_eq!(
            resolve_history_path(Some(home), Some("/tmp/repl.log")),
            Some(PathBuf::from("/tmp/repl.log"))
        );
        assert_eq!(resolve_history_path(None, Some("relative.log")), None);
    }
}
