//! Renders the generated `main.go` for a cell.
//!
//! Layout of the document:
//!
//! ```text
//! package main                         synthetic
//! import cellgoflag "flag"             synthetic
//! <imports of the current cell>        mapped
//! <imports from earlier cells>         synthetic
//! <definitions from earlier cells>     synthetic
//! <the current cell, line for line>    mapped, except placeholders
//! <entry-point epilogue>               synthetic
//! var _ = cellgoflag.Parse             synthetic
//! ```
//!
//! Directive and shell lines of the cell become blank placeholders, and the
//! entry marker becomes the opening of `func main`, so every cell line keeps
//! a stand-in. With nothing memorized the document therefore has exactly
//! [`FIXED_OVERHEAD`] more lines than the cell.

use std::collections::BTreeSet;

use crate::cell::Cell;
use crate::columns::Cursor;
use crate::decl::{DeclKey, DeclStore, Declaration};
use crate::linemap::{LineMap, LineOrigin};
use crate::CellId;

/// Lines added around a cell when the store holds nothing else.
pub const FIXED_OVERHEAD: usize = 4;

/// Alias under which the generated program imports `flag`. Chosen so it
/// cannot collide with a user import.
pub const FLAG_ALIAS: &str = "cellgoflag";

const PACKAGE_LINE: &str = "package main";

fn flag_import() -> String {
    format!("import {FLAG_ALIAS} \"flag\"")
}

fn entry_open() -> String {
    format!("func main() {{ {FLAG_ALIAS}.Parse()")
}

fn empty_main() -> String {
    format!("func main() {{ {FLAG_ALIAS}.Parse() }}")
}

fn flag_use() -> String {
    format!("var _ = {FLAG_ALIAS}.Parse")
}

/// A generated document and everything needed to map back from it.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub lines: Vec<String>,
    pub map: LineMap,
    /// Requested cursor, in document coordinates.
    pub cursor: Option<Cursor>,
    /// Whether running the program executes cell code.
    pub has_entry_point: bool,
}

impl Assembly {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Document text with a trailing newline.
    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    /// Memorized imports present in the document, by the line they occupy.
    pub fn synthetic_imports<'s>(&self, store: &'s DeclStore) -> Vec<(usize, &'s DeclKey)> {
        let mut found = Vec::new();
        for decl in store.imports() {
            let line = (0..self.lines.len()).find(|&idx| {
                self.map.origin(idx) == LineOrigin::Synthetic && self.lines[idx] == decl.source
            });
            if let Some(line) = line {
                found.push((line, &decl.key));
            }
        }
        found
    }
}

/// Renders documents from a declaration store.
///
/// The store is expected to already contain the current cell's own
/// declarations (see [`Cell::declarations`]); those are recognised by their
/// origin and rendered in place rather than from the store.
pub struct Assembler<'a> {
    store: &'a DeclStore,
    cell_id: CellId,
    skipped_imports: BTreeSet<String>,
}

impl<'a> Assembler<'a> {
    pub fn new(store: &'a DeclStore, cell_id: CellId) -> Self {
        Self {
            store,
            cell_id,
            skipped_imports: BTreeSet::new(),
        }
    }

    /// Leave these memorized imports out of the document.
    pub fn without_imports<'k>(mut self, keys: impl IntoIterator<Item = &'k DeclKey>) -> Self {
        self.skipped_imports
            .extend(keys.into_iter().map(DeclKey::label));
        self
    }

    fn memorized(&self, decl: &Declaration) -> bool {
        decl.origin != self.cell_id
    }

    pub fn assemble(&self, cell: &Cell, cursor: Option<Cursor>) -> Assembly {
        let mut lines = Vec::with_capacity(cell.len() + FIXED_OVERHEAD);
        let mut map = LineMap::with_cell_lines(cell.len());
        let mut emit = |lines: &mut Vec<String>, text: String, origin: LineOrigin| {
            lines.push(text);
            map.push(origin)
        };

        emit(&mut lines, PACKAGE_LINE.to_string(), LineOrigin::Synthetic);
        emit(&mut lines, flag_import(), LineOrigin::Synthetic);

        let mut placed = Vec::with_capacity(cell.len());
        let mut hoisted = BTreeSet::new();
        for import in cell.imports() {
            for idx in import.lines.clone() {
                let doc_line = if cell.consumed.contains(&idx) {
                    emit(&mut lines, String::new(), LineOrigin::Synthetic)
                } else {
                    emit(&mut lines, cell.lines[idx].clone(), LineOrigin::Cell(idx))
                };
                hoisted.insert(idx);
                placed.push((idx, doc_line));
            }
        }

        let mut memorized = 0;
        for decl in self.store.imports().filter(|d| self.memorized(d)) {
            if self.skipped_imports.contains(&decl.key.label()) {
                continue;
            }
            memorized += 1;
            emit(&mut lines, decl.source.clone(), LineOrigin::Synthetic);
        }
        for decl in self.store.definitions().filter(|d| self.memorized(d)) {
            memorized += 1;
            let mut any = false;
            for text in decl.source.lines() {
                any = true;
                emit(&mut lines, text.to_string(), LineOrigin::Synthetic);
            }
            if !any {
                emit(&mut lines, String::new(), LineOrigin::Synthetic);
            }
        }

        for (idx, text) in cell.lines.iter().enumerate() {
            if hoisted.contains(&idx) {
                continue;
            }
            let doc_line = if Some(idx) == cell.entry {
                emit(&mut lines, entry_open(), LineOrigin::Synthetic)
            } else if cell.consumed.contains(&idx) {
                emit(&mut lines, String::new(), LineOrigin::Synthetic)
            } else {
                emit(&mut lines, text.clone(), LineOrigin::Cell(idx))
            };
            placed.push((idx, doc_line));
        }

        let closing = if cell.entry.is_some() {
            "}".to_string()
        } else if cell.defines_main() {
            String::new()
        } else {
            empty_main()
        };
        emit(&mut lines, closing, LineOrigin::Synthetic);
        emit(&mut lines, flag_use(), LineOrigin::Synthetic);

        for (cell_line, doc_line) in placed {
            map.place(cell_line, doc_line);
        }

        let cursor = cursor.and_then(|c| {
            let doc_line = map.doc_line(c.line)?;
            let col = match map.origin(doc_line) {
                LineOrigin::Cell(_) => c.col,
                LineOrigin::Synthetic => 0,
            };
            Some(Cursor::new(doc_line, col))
        });

        tracing::debug!(
            cell = self.cell_id,
            lines = lines.len(),
            memorized,
            "assembled document"
        );

        Assembly {
            lines,
            map,
            cursor,
            has_entry_point: cell.has_entry_point(),
        }
    }
}
