//! The session's Go module directory.
//!
//! Every session owns a fresh module under the temp root. Builds happen in
//! throwaway `run-<id>` packages inside it, so dependencies fetched once stay
//! available to later cells.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::error::KernelError;

pub const GO_MOD: &str = "go.mod";
pub const GO_SUM: &str = "go.sum";
pub const GO_WORK: &str = "go.work";
/// Name of the generated document, both in the module root (for editors)
/// and in each scratch package.
pub const DOCUMENT: &str = "main.go";

static REPLACE_LOCAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:replace\s+)?\S+(?:\s+\S+)?\s+=>\s+(\.{1,2}/\S*|/\S*)\s*$").unwrap()
});

static MODULE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*module\s+(\S+)").unwrap());

pub struct Workspace {
    id: String,
    dir: PathBuf,
    go_version: String,
}

impl Workspace {
    /// Create `<temp_root>/cellgo_<id>` with a fresh `go.mod`.
    pub fn create(temp_root: &Path, go_version: &str) -> Result<Self, KernelError> {
        let id = Uuid::new_v4().simple().to_string();
        let dir = temp_root.join(format!("cellgo_{id}"));
        fs::create_dir_all(&dir).map_err(|source| KernelError::Workspace {
            path: dir.clone(),
            source,
        })?;
        let workspace = Self {
            id,
            dir,
            go_version: go_version.to_string(),
        };
        workspace.write_manifest()?;
        tracing::info!(dir = %workspace.dir.display(), "created workspace");
        Ok(workspace)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn module_name(&self) -> String {
        format!("cellgo_{}", self.id)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(GO_MOD)
    }

    fn write_manifest(&self) -> Result<(), KernelError> {
        let path = self.manifest_path();
        let text = format!("module {}\n\ngo {}\n", self.module_name(), self.go_version);
        fs::write(&path, text).map_err(KernelError::io(path))
    }

    /// Start over with an empty `go.mod` and no `go.sum`.
    pub fn reset_manifest(&self) -> Result<(), KernelError> {
        let sum = self.dir.join(GO_SUM);
        if sum.exists() {
            fs::remove_file(&sum).map_err(KernelError::io(sum))?;
        }
        self.write_manifest()
    }

    /// Write the document to the module root, where editors and language
    /// servers look for it.
    pub fn write_document(&self, text: &str) -> Result<PathBuf, KernelError> {
        let path = self.dir.join(DOCUMENT);
        fs::write(&path, text).map_err(KernelError::io(path.clone()))?;
        Ok(path)
    }

    /// A fresh package directory for one build, removed on drop.
    pub fn scratch(&self) -> Result<Scratch, KernelError> {
        let name = format!("run-{}", Uuid::new_v4().simple());
        let dir = self.dir.join(&name);
        fs::create_dir(&dir).map_err(KernelError::io(dir.clone()))?;
        Ok(Scratch { name, dir })
    }

    /// Directories that `go.mod` replaces modules with.
    pub fn local_replacements(&self) -> Result<Vec<PathBuf>, KernelError> {
        let path = self.manifest_path();
        let text = fs::read_to_string(&path).map_err(KernelError::io(path))?;
        Ok(parse_local_replacements(&text)
            .into_iter()
            .map(|target| {
                let target = PathBuf::from(target);
                if target.is_relative() {
                    self.dir.join(target)
                } else {
                    target
                }
            })
            .collect())
    }

    /// Add a `replace` to `go.mod` for every module listed in `go.work`.
    ///
    /// `go mod tidy` ignores workspaces; this lets modules that are only
    /// `use`d from `go.work` resolve. Returns the replacements added.
    pub fn go_work_fix(&self) -> Result<Vec<(String, PathBuf)>, KernelError> {
        let work_path = self.dir.join(GO_WORK);
        let work = fs::read_to_string(&work_path).map_err(KernelError::io(work_path))?;
        let manifest_path = self.manifest_path();
        let mut manifest =
            fs::read_to_string(&manifest_path).map_err(KernelError::io(manifest_path.clone()))?;

        let mut added = Vec::new();
        for used in parse_go_work_uses(&work) {
            let dir = if Path::new(&used).is_relative() {
                self.dir.join(&used)
            } else {
                PathBuf::from(&used)
            };
            let module_file = dir.join(GO_MOD);
            let Ok(module_text) = fs::read_to_string(&module_file) else {
                tracing::warn!(path = %module_file.display(), "go.work entry has no go.mod");
                continue;
            };
            let Some(module) = module_text
                .lines()
                .find_map(|line| MODULE_LINE.captures(line).map(|c| c[1].to_string()))
            else {
                continue;
            };
            if module == self.module_name() || has_replace(&manifest, &module) {
                continue;
            }
            if !manifest.ends_with('\n') {
                manifest.push('\n');
            }
            manifest.push_str(&format!("replace {} => {}\n", module, dir.display()));
            added.push((module, dir));
        }

        fs::write(&manifest_path, manifest).map_err(KernelError::io(manifest_path))?;
        Ok(added)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %err, "failed to remove workspace");
        }
    }
}

/// Per-build package directory inside the workspace.
pub struct Scratch {
    name: String,
    dir: PathBuf,
}

impl Scratch {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory name under the module root, e.g. `run-1f2e...`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package path relative to the module root, as `go build` wants it.
    pub fn package(&self) -> String {
        format!("./{}", self.name)
    }

    pub fn document_path(&self) -> PathBuf {
        self.dir.join(DOCUMENT)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.dir.join(if cfg!(windows) { "cell.exe" } else { "cell" })
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %err, "failed to remove scratch dir");
        }
    }
}

/// Local targets of `replace` directives, both single-line and inside a
/// `replace ( ... )` block.
fn parse_local_replacements(go_mod: &str) -> Vec<String> {
    let mut targets = Vec::new();
    let mut in_block = false;
    for line in go_mod.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("replace (") || trimmed == "replace(" {
            in_block = true;
            continue;
        }
        if in_block && trimmed == ")" {
            in_block = false;
            continue;
        }
        if !in_block && !trimmed.starts_with("replace ") {
            continue;
        }
        if let Some(caps) = REPLACE_LOCAL.captures(trimmed) {
            targets.push(caps[1].to_string());
        }
    }
    targets
}

/// Directories from `use` directives, single-line or grouped.
fn parse_go_work_uses(go_work: &str) -> Vec<String> {
    let mut uses = Vec::new();
    let mut in_block = false;
    for line in go_work.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if line.starts_with("use (") || line == "use(" {
            in_block = true;
            continue;
        }
        if in_block {
            if line == ")" {
                in_block = false;
            } else if !line.is_empty() {
                uses.push(line.trim_matches('"').to_string());
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("use ") {
            uses.push(rest.trim().trim_matches('"').to_string());
        }
    }
    uses
}

fn has_replace(go_mod: &str, module: &str) -> bool {
    go_mod.lines().any(|line| {
        let line = line.trim();
        let line = line.strip_prefix("replace ").unwrap_or(line);
        line.split_whitespace().next() == Some(module) && line.contains("=>")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_replacements() {
        let go_mod = "module x\n\ngo 1.22\n\nreplace example.com/a => ../a\nreplace example.com/b v1.0.0 => example.com/c v1.1.0\nreplace (\n\texample.com/d => /abs/d\n\texample.com/e v0.1.0 => ./e\n)\n";
        assert_eq!(parse_local_replacements(go_mod), vec!["../a", "/abs/d", "./e"]);
    }

    #[test]
    fn parses_go_work_uses() {
        let go_work = "go 1.22\n\nuse ./local // comment\nuse (\n\t../other\n\t\"/abs/path\"\n)\n";
        assert_eq!(parse_go_work_uses(go_work), vec!["./local", "../other", "/abs/path"]);
    }

    #[test]
    fn detects_existing_replace() {
        let go_mod = "module x\nreplace example.com/a => ../a\n";
        assert!(has_replace(go_mod, "example.com/a"));
        assert!(!has_replace(go_mod, "example.com/b"));
    }

    #[test]
    fn workspace_lifecycle() {
        let root = std::env::temp_dir();
        let dir;
        {
            let ws = Workspace::create(&root, "1.22").unwrap();
            dir = ws.dir().to_path_buf();
            let manifest = fs::read_to_string(ws.manifest_path()).unwrap();
            assert_eq!(manifest, format!("module {}\n\ngo 1.22\n", ws.module_name()));

            let scratch_dir;
            {
                let scratch = ws.scratch().unwrap();
                scratch_dir = scratch.dir().to_path_buf();
                assert!(scratch_dir.is_dir());
                assert!(scratch.package().starts_with("./run-"));
            }
            assert!(!scratch_dir.exists());

            fs::write(ws.manifest_path(), "module changed\n").unwrap();
            fs::write(ws.dir().join(GO_SUM), "").unwrap();
            ws.reset_manifest().unwrap();
            assert!(fs::read_to_string(ws.manifest_path()).unwrap().contains("cellgo_"));
            assert!(!ws.dir().join(GO_SUM).exists());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn go_work_fix_adds_replacements() {
        let ws = Workspace::create(&std::env::temp_dir(), "1.22").unwrap();
        let lib = ws.dir().join("lib");
        fs::create_dir(&lib).unwrap();
        fs::write(lib.join(GO_MOD), "module example.com/lib\n\ngo 1.22\n").unwrap();
        fs::write(ws.dir().join(GO_WORK), "go 1.22\n\nuse (\n\t.\n\t./lib\n)\n").unwrap();

        let added = ws.go_work_fix().unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].0, "example.com/lib");

        // A second run adds nothing.
        assert!(ws.go_work_fix().unwrap().is_empty());
        let replacements = ws.local_replacements().unwrap();
        assert_eq!(replacements, vec![lib]);
    }
}
