//! Cellgo synthesis engine
//!
//! Turns notebook cells into one evolving Go program. A cell is classified
//! into directive, shell and body lines, its top-level declarations are
//! merged into a [`DeclStore`](decl::DeclStore), and the [`Assembler`]
//! renders a `main.go` together with a [`LineMap`] that ties every generated
//! line back to the cell line it came from (or to nothing at all).

pub mod assemble;
pub mod cell;
pub mod columns;
pub mod decl;
pub mod diagnostics;
pub mod directive;
pub mod linemap;

pub use assemble::{Assembler, Assembly, FIXED_OVERHEAD};
pub use cell::Cell;
pub use columns::{ColumnUnit, Cursor};
pub use decl::{DeclKey, DeclKind, DeclStore, Declaration};
pub use diagnostics::{Diagnostic, Location, RemapContext, Severity};
pub use directive::{classify, join_line, split_cmd, Classification, Directive, DirectiveKind};
pub use linemap::{LineMap, LineOrigin};

/// Execution count of a cell within a session. Starts at 1.
pub type CellId = u64;
