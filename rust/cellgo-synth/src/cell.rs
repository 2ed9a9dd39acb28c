//! A single cell: its lines, what the classifier took out of it, and the
//! declarations found in what is left.

use std::collections::BTreeSet;

use crate::decl::{scan, DeclKind, Declaration, ParsedDecl};
use crate::directive::{classify, is_entry_marker, Directive};
use crate::CellId;

#[derive(Debug, Clone)]
pub struct Cell {
    pub id: CellId,
    pub lines: Vec<String>,
    /// Lines taken by directives and shell commands.
    pub consumed: BTreeSet<usize>,
    /// Line of the `%%` / `%main` marker.
    pub entry: Option<usize>,
    pub directives: Vec<Directive>,
    /// Top-level declarations above the entry marker.
    pub decls: Vec<ParsedDecl>,
}

impl Cell {
    /// Classify and scan raw cell text.
    pub fn new(id: CellId, text: &str) -> Self {
        let lines = split_lines(text);
        let classification = classify(&lines);
        let consumed = classification.consumed();
        let entry = classification.entry_marker();
        let decls = scan_body(&lines, &consumed, entry);
        Self {
            id,
            lines,
            consumed,
            entry,
            directives: classification.directives,
            decls,
        }
    }

    /// Build a cell whose directive lines were already identified elsewhere.
    /// The entry marker is looked up among the consumed lines.
    pub fn from_parts(id: CellId, lines: Vec<String>, consumed: BTreeSet<usize>) -> Self {
        let entry = consumed
            .iter()
            .copied()
            .find(|&idx| lines.get(idx).is_some_and(|line| is_entry_marker(line)));
        let decls = scan_body(&lines, &consumed, entry);
        Self {
            id,
            lines,
            consumed,
            entry,
            directives: Vec::new(),
            decls,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether anything besides directives and blank lines is left.
    pub fn has_body(&self) -> bool {
        self.lines
            .iter()
            .enumerate()
            .any(|(idx, line)| !self.consumed.contains(&idx) && !line.trim().is_empty())
            || self.entry.is_some()
    }

    /// Whether the cell defines its own `func main`.
    pub fn defines_main(&self) -> bool {
        self.decls.iter().any(|d| d.entry_point)
    }

    pub fn has_entry_point(&self) -> bool {
        self.entry.is_some() || self.defines_main()
    }

    pub fn imports(&self) -> impl Iterator<Item = &ParsedDecl> {
        self.decls.iter().filter(|d| d.kind == DeclKind::Import)
    }

    /// Everything the cell contributes to the declaration store.
    pub fn declarations(&self) -> Vec<Declaration> {
        self.decls
            .iter()
            .flat_map(|d| &d.entries)
            .map(|e| Declaration::new(e.key.clone(), e.names.clone(), e.source.clone(), self.id))
            .collect()
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

fn scan_body(lines: &[String], consumed: &BTreeSet<usize>, entry: Option<usize>) -> Vec<ParsedDecl> {
    let end = entry.unwrap_or(lines.len()).min(lines.len());
    let masked: Vec<&str> = lines[..end]
        .iter()
        .enumerate()
        .map(|(idx, line)| if consumed.contains(&idx) { "" } else { line.as_str() })
        .collect();
    scan(&masked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::DeclKey;

    #[test]
    fn declarations_only_above_marker() {
        let cell = Cell::new(3, "func f() {}\n%%\nvar x = 1\nf()");
        assert_eq!(cell.entry, Some(1));
        let decls = cell.declarations();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].key, DeclKey::Func("f".into()));
        assert_eq!(decls[0].origin, 3);
    }

    #[test]
    fn directives_do_not_leak_into_declarations() {
        let cell = Cell::new(1, "!echo \\\nvar y = 2\nvar x = 1");
        assert_eq!(cell.consumed, BTreeSet::from([0, 1]));
        let keys: Vec<DeclKey> = cell.declarations().into_iter().map(|d| d.key).collect();
        assert_eq!(keys, vec![DeclKey::Var("x".into())]);
    }

    #[test]
    fn body_detection() {
        assert!(!Cell::new(1, "%env A 1\n\n").has_body());
        assert!(Cell::new(1, "%%").has_body());
        assert!(Cell::new(1, "type T int").has_body());
    }

    #[test]
    fn from_parts_finds_marker() {
        let lines: Vec<String> = ["import \"fmt\"", "%main", "fmt.Println(1)"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let cell = Cell::from_parts(2, lines, BTreeSet::from([1]));
        assert_eq!(cell.entry, Some(1));
        assert!(cell.has_entry_point());
        assert_eq!(cell.imports().count(), 1);
    }

    #[test]
    fn own_main_is_an_entry_point() {
        let cell = Cell::new(1, "func main() {\n}");
        assert!(cell.defines_main());
        assert!(cell.declarations().is_empty());
    }

    #[test]
    fn crlf_is_stripped() {
        let cell = Cell::new(1, "var a = 1\r\nvar b = 2\r\n");
        assert_eq!(cell.lines, vec!["var a = 1", "var b = 2", ""]);
        assert_eq!(cell.declarations().len(), 2);
    }
}
