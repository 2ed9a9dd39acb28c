//! Top-level declarations: scanning them out of a cell and remembering them
//! across cells.

mod lexer;
pub mod scanner;
pub mod store;

pub use scanner::{scan, DeclEntry, ParsedDecl};
pub use store::{DeclKey, DeclKind, DeclStore, Declaration};
