//! Error types for the kernel.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// System-level failures. Build and runtime failures of user programs are
/// not errors; they are reported through [`ExecOutcome`](crate::ExecOutcome).
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("cannot create workspace in {}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot run `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("terminal error")]
    Terminal(#[from] rustyline::error::ReadlineError),
}

impl KernelError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| KernelError::Io { path, source }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid toml in '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A `%` directive that could not be carried out. Reported to the user,
/// never fatal to the request.
#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("%{command}: {message}")]
    Usage { command: String, message: String },
    #[error("%{command} failed")]
    Failed {
        command: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("unknown directive %{0}, try %help")]
    Unknown(String),
}

impl DirectiveError {
    pub(crate) fn usage(command: &str, message: impl Into<String>) -> Self {
        DirectiveError::Usage {
            command: command.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn failed(
        command: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        DirectiveError::Failed {
            command: command.to_string(),
            source: source.into(),
        }
    }
}

/// Format an error with its full cause chain:
///
/// ```text
/// <message>
///   caused by: <cause 1>
///   caused by: <cause 2>
/// ```
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }
    out
}
