//! Configuration file parsing for `cellgo.toml`.
//!
//! Searches current directory then ancestors, falling back to
//! `~/.config/cellgo/cellgo.toml` if no project-level file is found.

use std::path::{Path, PathBuf};

use cellgo_synth::ColumnUnit;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "cellgo.toml";

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct KernelConfig {
    #[serde(default)]
    pub go: GoSection,
    #[serde(default)]
    pub shell: ShellSection,
    #[serde(default)]
    pub kernel: KernelSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GoSection {
    /// Go toolchain binary, looked up on `PATH` when not absolute.
    pub binary: String,
    /// Value of the `go` directive in the session's `go.mod`.
    pub version: String,
    /// Extra flags passed to `go build`.
    pub build_flags: Vec<String>,
}

impl Default for GoSection {
    fn default() -> Self {
        Self {
            binary: "go".to_string(),
            version: "1.22".to_string(),
            build_flags: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ShellSection {
    pub program: String,
    pub flag: String,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            program: "/bin/bash".to_string(),
            flag: "-c".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelSection {
    /// Run `go mod tidy` before each build.
    pub auto_get: bool,
    /// Column unit used by cursors and reported diagnostics.
    pub column_unit: ColumnUnit,
    /// Parent of the per-session Go module directory. Defaults to the
    /// system temporary directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            auto_get: true,
            column_unit: ColumnUnit::default(),
            temp_root: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogSection {
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "cellgo=info".to_string(),
        }
    }
}

impl KernelConfig {
    /// Load config from `cellgo.toml`, searching current dir then parents.
    /// Returns `Default` when no file is found; a file that exists but does
    /// not parse is logged and ignored.
    pub fn load() -> Self {
        match Self::find_and_load() {
            Some(Ok((path, cfg))) => {
                tracing::debug!(path = %path.display(), "loaded config");
                cfg
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "ignoring config file");
                Self::default()
            }
            None => Self::default(),
        }
    }

    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn find_and_load() -> Option<Result<(PathBuf, Self), ConfigError>> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Some(Self::load_from(&config_path).map(|cfg| (config_path, cfg)));
            }
            if !dir.pop() {
                break;
            }
        }
        // Try global config
        let global = dirs::home_dir()?
            .join(".config")
            .join("cellgo")
            .join(CONFIG_FILE);
        if global.exists() {
            return Some(Self::load_from(&global).map(|cfg| (global, cfg)));
        }
        None
    }

    /// Parse a TOML string directly (useful for testing and embedding).
    pub fn from_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Directory under which session workspaces are created.
    pub fn temp_root(&self) -> PathBuf {
        self.kernel
            .temp_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Generate a default `cellgo.toml` template.
    pub fn default_template() -> &'static str {
        r#"# Cellgo Configuration

[go]
binary = "go"
# `go` directive written to each session's go.mod
version = "1.22"
# build_flags = ["-race"]

[shell]
program = "/bin/bash"
flag = "-c"

[kernel]
# Run `go mod tidy` before each build
auto_get = true
# Column unit for cursors and diagnostics: byte | char | utf16
column_unit = "utf16"
# temp_root = "/tmp"

[log]
filter = "cellgo=info"
"#
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
