//! Compiler and runtime diagnostics, remapped from the generated document
//! back to the cell the user typed.

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::assemble::Assembly;
use crate::cell::Cell;
use crate::columns::{from_byte_col, ColumnUnit};
use crate::linemap::{LineMap, LineOrigin};
use crate::CellId;

static UNUSED_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"[^"]+" imported (?:as \S+ )?and not used"#).unwrap());

static UNDEFINED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^undefined: (\w+)").unwrap());

/// Severity level for diagnostics. The Go compiler only reports errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
}

/// Where a diagnostic points. Lines are 0-based, columns 1-based as
/// reported by the compiler (bytes until [`translate_columns`] runs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Cell {
        cell: CellId,
        line: usize,
        col: Option<usize>,
    },
    /// A line with no cell origin: boilerplate or a memorized declaration.
    Generated { line: usize, col: Option<usize> },
}

impl Location {
    pub fn col(&self) -> Option<usize> {
        match self {
            Location::Cell { col, .. } | Location::Generated { col, .. } => *col,
        }
    }

    fn set_col(&mut self, value: usize) {
        match self {
            Location::Cell { col, .. } | Location::Generated { col, .. } => *col = Some(value),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (prefix, line, col) = match self {
            Location::Cell { cell, line, col } => (format!("cell[{cell}]"), line, col),
            Location::Generated { line, col } => ("<generated>".to_string(), line, col),
        };
        match col {
            Some(col) => write!(f, "{prefix}:{}:{col}", line + 1),
            None => write!(f, "{prefix}:{}", line + 1),
        }
    }
}

/// A diagnostic with source context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<Location>,
    pub source_line: Option<String>,
    pub underline: Option<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            location: None,
            source_line: None,
            underline: None,
            suggestions: Vec::new(),
        }
    }

    /// Whether this is the compiler complaining about an unused import.
    pub fn is_unused_import(&self) -> bool {
        UNUSED_IMPORT.is_match(&self.message)
    }

    /// Render with ANSI colors for terminal
    pub fn render_ansi(&self) -> String {
        let mut out = String::new();

        let severity_label = match self.severity {
            Severity::Error => red("error"),
        };
        out.push_str(&format!("{}: {}\n", severity_label, bold(&self.message)));

        if let Some(location) = &self.location {
            out.push_str(&format!("  {} {}\n", cyan("-->"), location));
        }

        if let (Some(location), Some(line_text), Some(underline)) =
            (&self.location, &self.source_line, &self.underline)
        {
            let line_num = gutter_line(location);
            out.push_str(&format!("   {}\n", cyan("|")));
            out.push_str(&format!("{:>3} {} {}\n", cyan(&line_num), cyan("|"), line_text));
            out.push_str(&format!("   {} {}\n", cyan("|"), red(underline)));
        }

        if !self.suggestions.is_empty() {
            out.push_str(&format!("   {}\n", cyan("|")));
            for suggestion in &self.suggestions {
                out.push_str(&format!("   {} {}: {}\n", cyan("="), cyan("help"), suggestion));
            }
        }

        out
    }

    /// Render without colors (for logs, tests)
    pub fn render_plain(&self) -> String {
        let mut out = String::new();

        let severity_label = match self.severity {
            Severity::Error => "error",
        };
        out.push_str(&format!("{}: {}\n", severity_label, self.message));

        if let Some(location) = &self.location {
            out.push_str(&format!("  --> {}\n", location));
        }

        if let (Some(location), Some(line_text), Some(underline)) =
            (&self.location, &self.source_line, &self.underline)
        {
            out.push_str("   |\n");
            out.push_str(&format!("{:>3} | {}\n", gutter_line(location), line_text));
            out.push_str(&format!("   | {}\n", underline));
        }

        if !self.suggestions.is_empty() {
            out.push_str("   |\n");
            for suggestion in &self.suggestions {
                out.push_str(&format!("   = help: {}\n", suggestion));
            }
        }

        out
    }
}

fn gutter_line(location: &Location) -> String {
    match location {
        Location::Cell { line, .. } | Location::Generated { line, .. } => (line + 1).to_string(),
    }
}

// ANSI color helpers
fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}

fn cyan(s: &str) -> String {
    format!("\x1b[36m{}\x1b[0m", s)
}

fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}

/// Caret under the character starting at 1-based byte column `col`.
fn make_underline(line: &str, col: usize) -> String {
    let chars_before = from_byte_col(line, col.saturating_sub(1), ColumnUnit::Char);
    format!("{}^", " ".repeat(chars_before))
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut row = vec![i; b.len() + 1];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            row[j] = (prev[j] + 1).min(row[j - 1] + 1).min(prev[j - 1] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

fn suggest_similar(name: &str, candidates: &[String], max_distance: usize) -> Vec<String> {
    let mut matches: Vec<(usize, &String)> = candidates
        .iter()
        .filter(|c| c.as_str() != name)
        .map(|c| (edit_distance(name, c), c))
        .filter(|(d, _)| *d <= max_distance)
        .collect();
    matches.sort_by_key(|(d, _)| *d);
    matches.into_iter().map(|(_, s)| s.clone()).take(3).collect()
}

/// Everything needed to rewrite output that refers to one generated file.
pub struct RemapContext<'a> {
    cell_id: CellId,
    map: &'a LineMap,
    cell_lines: &'a [String],
    doc_lines: &'a [String],
    file_name: String,
    pattern: Regex,
    known_names: Vec<String>,
}

/// `file_name:LINE[:COL]` at a path boundary. Without `dir` only the bare
/// or `./`-relative name matches; with it, also any path ending in
/// `dir/file_name`. Group 1 is the boundary, 3 the line, 4 the column.
fn location_pattern(file_name: &str, dir: Option<&str>) -> Regex {
    let prefix = match dir {
        Some(dir) => format!(r"(?:[^\s:]*/)?{}/|\./", regex::escape(dir)),
        None => r"\./".to_string(),
    };
    Regex::new(&format!(
        r"(?m)(^|[\s(])({prefix})?{}:(\d+)(?::(\d+))?",
        regex::escape(file_name)
    ))
    .expect("escaped names form a valid pattern")
}

impl<'a> RemapContext<'a> {
    /// `file_name` is the base name of the generated file, e.g. `main.go`.
    pub fn new(cell: &'a Cell, assembly: &'a Assembly, file_name: &str) -> Self {
        Self {
            cell_id: cell.id,
            map: &assembly.map,
            cell_lines: &cell.lines,
            doc_lines: &assembly.lines,
            file_name: file_name.to_string(),
            pattern: location_pattern(file_name, None),
            known_names: Vec::new(),
        }
    }

    /// Also accept references through the package directory the document
    /// was built in, e.g. `run-1f2e/main.go` or an absolute path to it.
    pub fn in_dir(mut self, dir: &str) -> Self {
        self.pattern = location_pattern(&self.file_name, Some(dir));
        self
    }

    /// Names offered as "did you mean" suggestions for undefined identifiers.
    pub fn with_known_names(mut self, names: Vec<String>) -> Self {
        self.known_names = names;
        self
    }

    /// Location of a 1-based document line.
    pub fn locate(&self, doc_line: usize, col: Option<usize>) -> Location {
        let line = doc_line.saturating_sub(1);
        match self.map.origin(line) {
            LineOrigin::Cell(cell_line) => Location::Cell {
                cell: self.cell_id,
                line: cell_line,
                col,
            },
            LineOrigin::Synthetic => Location::Generated { line, col },
        }
    }

    fn source_line(&self, location: &Location) -> Option<&'a str> {
        match location {
            Location::Cell { line, .. } => self.cell_lines.get(*line),
            Location::Generated { line, .. } => self.doc_lines.get(*line),
        }
        .map(String::as_str)
    }

    fn location_of(&self, caps: &Captures<'_>) -> Option<Location> {
        let line = caps.get(3)?.as_str().parse().ok()?;
        let col = caps.get(4).and_then(|c| c.as_str().parse().ok());
        Some(self.locate(line, col))
    }

    /// Rewrite every reference to the generated file in `text`.
    pub fn remap_text(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| match self.location_of(caps) {
                Some(location) => format!("{}{location}", &caps[1]),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Parse compiler output into diagnostics.
    ///
    /// `# package` headers are dropped, indented lines continue the previous
    /// diagnostic, and anything else without a location becomes a
    /// location-less diagnostic.
    pub fn diagnostics(&self, output: &str) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        for raw in output.lines() {
            if raw.trim().is_empty() || raw.starts_with('#') {
                continue;
            }
            let located = self
                .pattern
                .captures(raw)
                .filter(|caps| caps.get(0).is_some_and(|m| raw[..m.start()].trim().is_empty()));
            let Some(caps) = located else {
                match diagnostics.last_mut() {
                    Some(last) if raw.starts_with([' ', '\t']) => {
                        last.message.push('\n');
                        last.message.push_str(&self.remap_text(raw.trim_end()));
                    }
                    _ => diagnostics.push(Diagnostic::error(self.remap_text(raw.trim_end()))),
                }
                continue;
            };

            let end = caps.get(0).map_or(0, |m| m.end());
            let message = raw[end..].trim_start_matches(':').trim().to_string();
            let location = self.location_of(&caps);
            let source_line = location
                .as_ref()
                .and_then(|loc| self.source_line(loc))
                .map(str::to_string);
            let underline = match (&location, &source_line) {
                (Some(loc), Some(text)) => loc.col().map(|col| make_underline(text, col)),
                _ => None,
            };

            let mut diagnostic = Diagnostic {
                severity: Severity::Error,
                message,
                location,
                source_line,
                underline,
                suggestions: Vec::new(),
            };
            self.suggest(&mut diagnostic);
            diagnostics.push(diagnostic);
        }
        diagnostics
    }

    fn suggest(&self, diagnostic: &mut Diagnostic) {
        if let Some(caps) = UNDEFINED.captures(&diagnostic.message) {
            for name in suggest_similar(&caps[1], &self.known_names, 2) {
                diagnostic.suggestions.push(format!("did you mean `{name}`?"));
            }
        }
        if diagnostic.is_unused_import()
            && matches!(diagnostic.location, Some(Location::Generated { .. }))
        {
            diagnostic
                .suggestions
                .push("imported by an earlier cell; `%rm` forgets it".to_string());
        }
    }
}

/// Convert the byte columns of located diagnostics into `unit`. Must run at
/// most once per diagnostic.
pub fn translate_columns(diagnostics: &mut [Diagnostic], unit: ColumnUnit) {
    if unit == ColumnUnit::Byte {
        return;
    }
    for diagnostic in diagnostics {
        let (Some(location), Some(text)) = (diagnostic.location.as_mut(), &diagnostic.source_line)
        else {
            continue;
        };
        if let Some(col) = location.col() {
            location.set_col(from_byte_col(text, col.saturating_sub(1), unit) + 1);
        }
    }
}
