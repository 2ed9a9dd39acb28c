//! Invocations of the `go` command.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use crate::config::GoSection;
use crate::error::KernelError;
use crate::exec::{run_captured, run_captured_cancellable, CancelToken, Captured};

#[derive(Debug, Clone)]
pub struct GoTool {
    binary: String,
    build_flags: Vec<String>,
}

impl GoTool {
    pub fn new(config: &GoSection) -> Self {
        Self {
            binary: config.binary.clone(),
            build_flags: config.build_flags.clone(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self, module_dir: &Path, env: &BTreeMap<String, String>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(module_dir).envs(env);
        cmd
    }

    /// `go build -o <output> <package>` inside the module. `None` when
    /// cancelled.
    pub fn build(
        &self,
        module_dir: &Path,
        package: &str,
        output: &Path,
        env: &BTreeMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<Option<Captured>, KernelError> {
        let mut cmd = self.command(module_dir, env);
        cmd.arg("build")
            .args(&self.build_flags)
            .arg("-o")
            .arg(output)
            .arg(package);
        tracing::debug!(?cmd, "go build");
        run_captured_cancellable(&mut cmd, cancel)
    }

    /// `go mod tidy`, fetching whatever the document imports. `None` when
    /// cancelled.
    pub fn mod_tidy(
        &self,
        module_dir: &Path,
        env: &BTreeMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<Option<Captured>, KernelError> {
        let mut cmd = self.command(module_dir, env);
        cmd.args(["mod", "tidy"]);
        tracing::debug!(?cmd, "go mod tidy");
        run_captured_cancellable(&mut cmd, cancel)
    }

    /// `go version`, or `None` when the toolchain cannot be run.
    pub fn version(&self) -> Option<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("version");
        match run_captured(&mut cmd) {
            Ok(out) if out.success => Some(out.stdout.trim().to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_has_no_version() {
        let tool = GoTool::new(&GoSection {
            binary: "/nonexistent/go".to_string(),
            ..GoSection::default()
        });
        assert_eq!(tool.version(), None);
        assert_eq!(tool.binary(), "/nonexistent/go");
    }
}
