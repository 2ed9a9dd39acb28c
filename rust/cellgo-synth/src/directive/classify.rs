//! Line classification: which cell lines are directives, which are shell
//! commands and which are left for the program.

use std::collections::BTreeSet;

use super::lexer::split_cmd;

/// Prefix of configuration directives (`%env`, `%cd`, `%%`, ...).
pub const CONFIG_SIGIL: char = '%';
/// Prefix of shell escapes (`!ls -l`).
pub const SHELL_SIGIL: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Config,
    Shell,
}

/// Classification of a single cell line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Program source.
    Body,
    /// Part of a `%` directive.
    Directive,
    /// Part of a `!` shell command.
    Shell,
    /// A sigil with nothing after it: consumed, but nothing to execute.
    Ignored,
}

/// A directive extracted from one or more consecutive lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Joined text after the sigil, with leading spaces removed.
    pub text: String,
    /// Cell line indices the directive was built from.
    pub lines: Vec<usize>,
}

impl Directive {
    /// Arguments of the directive, first one being the command name.
    pub fn parts(&self) -> Vec<String> {
        split_cmd(&self.text)
    }

    /// First line of the directive in the cell.
    pub fn line(&self) -> usize {
        self.lines.first().copied().unwrap_or_default()
    }

    /// Whether this directive opens the program's entry point (`%%`, `%main`).
    pub fn is_entry_marker(&self) -> bool {
        self.kind == DirectiveKind::Config
            && matches!(self.parts().first().map(String::as_str), Some("%" | "main"))
    }
}

/// Result of classifying a whole cell.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub classes: Vec<LineClass>,
    pub directives: Vec<Directive>,
}

impl Classification {
    /// Lines consumed by directives, shell commands or empty sigils.
    pub fn consumed(&self) -> BTreeSet<usize> {
        self.classes
            .iter()
            .enumerate()
            .filter(|(_, class)| **class != LineClass::Body)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Line of the first entry-point marker, if any.
    pub fn entry_marker(&self) -> Option<usize> {
        self.directives
            .iter()
            .find(|d| d.is_entry_marker())
            .map(Directive::line)
    }

    pub fn has_body(&self, lines: &[String]) -> bool {
        self.classes
            .iter()
            .zip(lines)
            .any(|(class, line)| *class == LineClass::Body && !line.trim().is_empty())
    }
}

/// Join `lines[from..]` while the accumulated text ends with a backslash.
///
/// Each trailing backslash is replaced by a single space. Every line that
/// took part, including `from`, is added to `used`.
pub fn join_line<S: AsRef<str>>(lines: &[S], from: usize, used: &mut BTreeSet<usize>) -> String {
    let mut cmd = String::new();
    for (idx, line) in lines.iter().enumerate().skip(from) {
        cmd.push_str(line.as_ref());
        used.insert(idx);
        if !cmd.ends_with('\\') {
            break;
        }
        cmd.pop();
        cmd.push(' ');
    }
    cmd
}

/// Whether a raw cell line is an entry-point marker.
///
/// Used when a caller hands the assembler a pre-filtered cell and no
/// [`Classification`] is available.
pub fn is_entry_marker(line: &str) -> bool {
    let Some(rest) = line.strip_prefix(CONFIG_SIGIL) else {
        return false;
    };
    let rest = rest.trim_start_matches(' ');
    let command = rest.split([' ', '\t']).next().unwrap_or("");
    command == "%" || command == "main"
}

fn sigil_kind(line: &str) -> Option<DirectiveKind> {
    if line.len() <= 1 {
        return None;
    }
    match line.chars().next() {
        Some(CONFIG_SIGIL) => Some(DirectiveKind::Config),
        Some(SHELL_SIGIL) => Some(DirectiveKind::Shell),
        _ => None,
    }
}

/// Classify every line of a cell and collect its directives in order.
pub fn classify<S: AsRef<str>>(lines: &[S]) -> Classification {
    let mut classes = vec![LineClass::Body; lines.len()];
    let mut directives = Vec::new();
    let mut used = BTreeSet::new();

    let mut line_num = 0;
    while line_num < lines.len() {
        if used.contains(&line_num) {
            line_num += 1;
            continue;
        }
        let Some(kind) = sigil_kind(lines[line_num].as_ref()) else {
            line_num += 1;
            continue;
        };

        let mut consumed = BTreeSet::new();
        let joined = join_line(lines, line_num, &mut consumed);
        // Drop the sigil, then the spaces separating it from the command.
        let text = joined[1..].trim_start_matches(' ').to_string();

        let class = match (kind, text.is_empty()) {
            (_, true) => LineClass::Ignored,
            (DirectiveKind::Config, false) => LineClass::Directive,
            (DirectiveKind::Shell, false) => LineClass::Shell,
        };
        for &idx in &consumed {
            classes[idx] = class;
        }
        if !text.is_empty() {
            directives.push(Directive {
                kind,
                text,
                lines: consumed.iter().copied().collect(),
            });
        }
        used.extend(consumed);
        line_num += 1;
    }

    Classification {
        classes,
        directives,
    }
}
