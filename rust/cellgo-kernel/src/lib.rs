//! Execution side of cellgo: sessions that build and run Go cells, the
//! `%` directive table, and the terminal front ends.

pub mod colors;
pub mod config;
pub mod directives;
pub mod error;
pub mod exec;
pub mod gotool;
pub mod notebook;
pub mod observer;
pub mod repl;
pub mod session;
pub mod sink;
pub mod workspace;

pub use config::KernelConfig;
pub use error::{error_chain, ConfigError, DirectiveError, KernelError};
pub use exec::{CancelToken, ExitStatus};
pub use observer::{NoopObserver, WorkspaceObserver};
pub use session::{DocumentView, ExecOutcome, Session, DIR_VAR, TMP_DIR_VAR};
pub use sink::{BufferSink, OutputSink, StdioSink};
