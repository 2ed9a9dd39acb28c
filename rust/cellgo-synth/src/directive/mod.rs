//! Directive sub-language: `%` configuration lines and `!` shell lines.

mod classify;
mod lexer;

pub use classify::{
    classify, is_entry_marker, join_line, Classification, Directive, DirectiveKind, LineClass,
    CONFIG_SIGIL, SHELL_SIGIL,
};
pub use lexer::split_cmd;
